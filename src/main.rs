fn main() -> anyhow::Result<()> {
    diary_tui::cli::run()
}
