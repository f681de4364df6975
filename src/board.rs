//! Reconciled per-document views and the aggregates built on them.

use crate::deadline::classify_with;
use crate::feed::MappedFeed;
use crate::ledger::{NoteLedger, ProcessJournal};
use crate::models::{
    normalize_revision, revisions_match, same_document_number, Actor, BoardCounts, BoardSummary, DeadlineStatus,
    Document, DocumentView, GlobalParams, LifecycleState, Page, SnapshotSource,
};
use crate::reconciler::lifecycle_state;
use chrono::{DateTime, Days, NaiveDate, Utc};
use std::collections::BTreeSet;

pub const OTHER_PAYMENT_LABEL: &str = "OUTROS";
const KNOWN_PAYMENT_TYPES: [&str; 4] = ["CIF", "FOB", "FATURAR_REMETENTE", "FATURAR_DEST"];

/// Maps a raw payment type to its aggregate bucket.
pub fn payment_bucket(raw: &str) -> String {
    let folded = raw.trim().to_uppercase().replace(' ', "_");
    if KNOWN_PAYMENT_TYPES.contains(&folded.as_str()) {
        folded
    } else {
        OTHER_PAYMENT_LABEL.to_string()
    }
}

/// Everything one refresh produced, replaced as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardState {
    pub documents: Vec<Document>,
    pub notes: NoteLedger,
    pub journal: ProcessJournal,
    pub params: GlobalParams,
    pub generation: u64,
    pub source: SnapshotSource,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl BoardState {
    pub fn empty(today: NaiveDate) -> Self {
        Self {
            documents: Vec::new(),
            notes: NoteLedger::default(),
            journal: ProcessJournal::default(),
            params: GlobalParams {
                reference_today: today,
                reference_tomorrow: today.checked_add_days(Days::new(1)).unwrap_or(today),
                tolerance_days: 0,
            },
            generation: 0,
            source: SnapshotSource::Empty,
            refreshed_at: None,
        }
    }

    pub fn from_mapped(
        mapped: MappedFeed,
        generation: u64,
        source: SnapshotSource,
        refreshed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            documents: mapped.documents,
            notes: NoteLedger::new(mapped.notes),
            journal: ProcessJournal::new(mapped.transitions),
            params: mapped.params,
            generation,
            source,
            refreshed_at: Some(refreshed_at),
        }
    }

    /// Exact revision first, then any row with the same number.
    pub fn find_document(&self, document_number: &str, revision: &str) -> Option<&Document> {
        let index = self.document_index(document_number, revision)?;
        self.documents.get(index)
    }

    pub fn find_document_mut(&mut self, document_number: &str, revision: &str) -> Option<&mut Document> {
        let index = self.document_index(document_number, revision)?;
        self.documents.get_mut(index)
    }

    fn document_index(&self, document_number: &str, revision: &str) -> Option<usize> {
        let same_number = |doc: &Document| same_document_number(&doc.document_number, document_number);
        self.documents
            .iter()
            .position(|doc| same_number(doc) && normalize_revision(&doc.revision) == normalize_revision(revision))
            .or_else(|| {
                self.documents
                    .iter()
                    .position(|doc| same_number(doc) && revisions_match(&doc.revision, revision))
            })
            .or_else(|| self.documents.iter().position(same_number))
    }

    pub fn lifecycle(&self, document: &Document) -> LifecycleState {
        lifecycle_state(document, &self.notes, &self.journal)
    }

    pub fn view(&self, document: &Document) -> DocumentView {
        DocumentView {
            document: document.clone(),
            deadline: classify_with(document.limit_date, &self.params),
            lifecycle: self.lifecycle(document),
            latest_note: self.notes.latest_note(&document.document_number).cloned(),
            note_count: self.notes.count_for(&document.document_number),
        }
    }

    pub fn views(&self) -> Vec<DocumentView> {
        self.documents.iter().map(|document| self.view(document)).collect()
    }

    pub fn page(&self, page: Page, actor: &Actor) -> Vec<DocumentView> {
        self.views()
            .into_iter()
            .filter(|view| on_page(view, page, actor))
            .collect()
    }

    pub fn counts(&self, actor: &Actor) -> BoardCounts {
        let mut counts = BoardCounts::default();
        for view in self.views() {
            if on_page(&view, Page::Pendencies, actor) {
                counts.pending += 1;
            } else if on_page(&view, Page::Critical, actor) {
                counts.critical += 1;
            }
            match view.lifecycle {
                LifecycleState::Searching => counts.searching += 1,
                LifecycleState::Disputed => counts.disputed += 1,
                _ => {}
            }
        }
        counts
    }

    /// Quantity and value totals over the actor's unit. An unrestricted actor
    /// may narrow the set to one unit.
    pub fn summary(&self, actor: &Actor, unit: Option<&str>) -> BoardSummary {
        let mut summary = BoardSummary::default();
        let selected = unit.map(str::trim).filter(|unit| !unit.is_empty());
        for view in self.views() {
            let destination = &view.document.destination_unit;
            if !actor.sees_unit(destination) {
                continue;
            }
            if let (None, Some(selected)) = (&actor.unit, selected) {
                if !selected.eq_ignore_ascii_case(destination.trim()) {
                    continue;
                }
            }
            let value = view.document.value;
            summary.total.add(value);
            summary
                .by_deadline
                .entry(view.deadline.label().to_string())
                .or_default()
                .add(value);
            summary
                .by_payment
                .entry(payment_bucket(&view.document.payment_type))
                .or_default()
                .add(value);
        }
        summary
    }

    /// Searching documents the actor has not annotated yet.
    pub fn attention(&self, actor: &Actor) -> Vec<DocumentView> {
        self.views()
            .into_iter()
            .filter(|view| view.lifecycle == LifecycleState::Searching)
            .filter(|view| !self.notes.authored_by(&view.document.document_number, &actor.username))
            .collect()
    }

    pub fn available_units(&self) -> Vec<String> {
        self.documents
            .iter()
            .map(|doc| doc.destination_unit.trim())
            .filter(|unit| !unit.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Active incidents are global; everything else follows the actor's unit.
pub fn visible_to(view: &DocumentView, actor: &Actor) -> bool {
    view.lifecycle.is_active_incident() || actor.sees_unit(&view.document.destination_unit)
}

fn on_page(view: &DocumentView, page: Page, actor: &Actor) -> bool {
    match page {
        Page::Searching => view.lifecycle == LifecycleState::Searching,
        Page::Disputed => view.lifecycle == LifecycleState::Disputed,
        Page::Pendencies | Page::Critical => {
            if view.lifecycle.is_active_incident() || !visible_to(view, actor) {
                return false;
            }
            (view.deadline == DeadlineStatus::Critical) == (page == Page::Critical)
        }
    }
}
