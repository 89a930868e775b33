pub mod keys;
pub mod reconciler;
pub mod record;
pub mod selection;

pub use keys::{creation_time_of, is_managed, KeyGenerator};
pub use reconciler::{EditorBinding, HeadlessEditor, Reconciler, ReconcilerOptions, SaveOutcome};
pub use record::{EditorFields, ListEntry, Record, Thumbnail};
pub use selection::Selection;
