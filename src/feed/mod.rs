pub mod columns;

use crate::errors::AppResult;
use crate::models::{Document, GlobalParams, Note, ProcessTransition};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A raw grid of cells as published by the sheet. The first row of the three
/// record tabs is the header; the parameters tab has no header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSet {
    pub rows: Vec<Vec<String>>,
}

impl RowSet {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn from_strs(rows: &[&[&str]]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| (*cell).to_string()).collect())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The four tabs fetched together in one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub documents: RowSet,
    pub notes: RowSet,
    pub transitions: RowSet,
    pub parameters: RowSet,
}

/// Source of the tabular data. Transport and CSV decoding live behind it.
#[async_trait]
pub trait TabularFeed: Send + Sync {
    async fn fetch(&self) -> AppResult<FeedSnapshot>;
}

/// Typed ledgers and documents mapped out of one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedFeed {
    pub documents: Vec<Document>,
    pub notes: Vec<Note>,
    pub transitions: Vec<ProcessTransition>,
    pub params: GlobalParams,
    pub skipped_rows: usize,
}

/// Maps every tab. `fallback_today` is only used when the parameters tab has
/// no usable reference date.
pub fn map_snapshot(snapshot: &FeedSnapshot, fallback_today: NaiveDate, default_tolerance_days: u32) -> MappedFeed {
    let (documents, skipped_documents) = columns::map_documents(&snapshot.documents);
    let (notes, skipped_notes) = columns::map_notes(&snapshot.notes);
    let (transitions, skipped_transitions) = columns::map_transitions(&snapshot.transitions);
    let params = columns::map_params(&snapshot.parameters, fallback_today, default_tolerance_days);

    MappedFeed {
        documents,
        notes,
        transitions,
        params,
        skipped_rows: skipped_documents + skipped_notes + skipped_transitions,
    }
}
