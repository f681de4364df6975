pub mod journal;
pub mod notes;

pub use journal::ProcessJournal;
pub use notes::NoteLedger;
