mod drafts;

pub use drafts::{DraftJournal, StashedDraft};
