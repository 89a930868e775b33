pub mod app;
pub mod attachment;
pub mod cli;
pub mod config;
pub mod diary;
pub mod error;
pub mod journaling;
pub mod notify;
pub mod storage;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::{StoreError, StoreResult};
