//! Folds a document's declared status, its process journal and its notes into
//! one lifecycle state.
//!
//! The journal is authoritative once it holds any row for the document and
//! revision. Notes and the declared status only cover the gap between a user
//! action and the journal catching up. A declared resolution is a floor that
//! nothing older can reopen.

use crate::ledger::{NoteLedger, ProcessJournal};
use crate::models::{Document, LifecycleState, Note, ProcessTransition, StatusTag};

/// Substring the backend writes into search-tagged rows that are really
/// dispute events.
pub const DISPUTE_MARKER_TOKEN: &str = "tad";
/// Substring of a note announcing a new dispute episode.
pub const DISPUTE_NOTE_MARKER: &str = "dispute started";

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Compatibility branch for dispute rows persisted under the search tag.
/// Once every dispute carries the explicit tag this can go.
fn is_search_tagged_dispute(transition: &ProcessTransition) -> bool {
    transition.tag == StatusTag::Searching && contains_ignore_case(&transition.description, DISPUTE_MARKER_TOKEN)
}

fn journal_disputed(transition: &ProcessTransition) -> bool {
    match transition.tag {
        StatusTag::Resolved => false,
        StatusTag::Disputed => true,
        StatusTag::Searching => is_search_tagged_dispute(transition),
    }
}

fn note_disputed(document: &Document, note: Option<&Note>) -> bool {
    let Some(note) = note else {
        return false;
    };
    if note.tag == Some(StatusTag::Resolved) {
        return false;
    }
    if contains_ignore_case(&note.text, DISPUTE_NOTE_MARKER) {
        // a stale optimistic note must not outlive a real resolution
        return !document.declared_resolved();
    }
    note.tag == Some(StatusTag::Disputed)
}

fn is_disputed(document: &Document, transition: Option<&ProcessTransition>, note: Option<&Note>) -> bool {
    match transition {
        Some(transition) => journal_disputed(transition),
        None => note_disputed(document, note),
    }
}

fn is_searching(document: &Document, transition: Option<&ProcessTransition>, note: Option<&Note>) -> bool {
    if document.declared_resolved() {
        return false;
    }
    if let Some(transition) = transition {
        return transition.tag == StatusTag::Searching;
    }
    match note.and_then(|note| note.tag) {
        Some(StatusTag::Resolved) => false,
        Some(StatusTag::Searching) => true,
        _ => document.declared_searching(),
    }
}

/// Pure reconciliation of one document against the two ledgers.
pub fn lifecycle_state(document: &Document, notes: &NoteLedger, journal: &ProcessJournal) -> LifecycleState {
    if document.declared_resolved() {
        return LifecycleState::Resolved;
    }

    let transition = journal.latest_transition(&document.document_number, Some(&document.revision));
    let note = notes.latest_note(&document.document_number);

    if is_disputed(document, transition, note) {
        return LifecycleState::Disputed;
    }
    if is_searching(document, transition, note) {
        return LifecycleState::Searching;
    }
    if transition.map(|transition| transition.tag) == Some(StatusTag::Resolved) {
        return LifecycleState::Resolved;
    }
    LifecycleState::Normal
}
