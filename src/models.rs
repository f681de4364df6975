use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RESOLVED_LABELS: [&str; 2] = ["RESOLVIDO", "LOCALIZADA"];
pub const SEARCHING_LABEL: &str = "EM BUSCA";
pub const DISPUTED_LABELS: [&str; 3] = ["TAD", "EM TAD", "PROCESSO TAD"];

fn fold_label(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn is_resolved_label(raw: &str) -> bool {
    let folded = fold_label(raw);
    RESOLVED_LABELS.iter().any(|label| *label == folded)
}

pub fn is_searching_label(raw: &str) -> bool {
    fold_label(raw) == SEARCHING_LABEL
}

pub fn is_disputed_label(raw: &str) -> bool {
    let folded = fold_label(raw);
    DISPUTED_LABELS.iter().any(|label| *label == folded)
}

/// Lifecycle intent carried by notes and journal rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusTag {
    Searching,
    Disputed,
    Resolved,
}

impl StatusTag {
    /// Value written back to the sheet and to the declared status column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Searching => SEARCHING_LABEL,
            Self::Disputed => "TAD",
            Self::Resolved => "RESOLVIDO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if is_resolved_label(raw) {
            Some(Self::Resolved)
        } else if is_searching_label(raw) {
            Some(Self::Searching)
        } else if is_disputed_label(raw) {
            Some(Self::Disputed)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Normal,
    Searching,
    Disputed,
    Resolved,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Searching => "SEARCHING",
            Self::Disputed => "DISPUTED",
            Self::Resolved => "RESOLVED",
        }
    }

    /// Active incidents are visible to every unit.
    pub fn is_active_incident(self) -> bool {
        matches!(self, Self::Searching | Self::Disputed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadlineStatus {
    NoDeadline,
    Critical,
    Overdue,
    DueToday,
    DueTomorrow,
    OnTime,
}

impl DeadlineStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::NoDeadline => "SEM PRAZO",
            Self::Critical => "CRÍTICO",
            Self::Overdue => "FORA DO PRAZO",
            Self::DueToday => "PRIORIDADE",
            Self::DueTomorrow => "VENCE AMANHÃ",
            Self::OnTime => "NO PRAZO",
        }
    }
}

/// Strips leading zeros so that "06" and "6" compare equal. A revision made
/// only of zeros collapses to "0"; a blank revision stays blank.
pub fn normalize_revision(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return trimmed;
    }
    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() {
        "0"
    } else {
        stripped
    }
}

/// Blank on either side means the row is matched on document number alone.
pub fn revisions_match(left: &str, right: &str) -> bool {
    let left = normalize_revision(left);
    let right = normalize_revision(right);
    left.is_empty() || right.is_empty() || left == right
}

pub fn same_document_number(left: &str, right: &str) -> bool {
    left.trim() == right.trim()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentKey {
    pub number: String,
    pub revision: String,
}

impl DocumentKey {
    pub fn new(number: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            revision: revision.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub document_number: String,
    pub revision: String,
    pub code: String,
    pub issue_date: Option<NaiveDate>,
    pub deadline_days: Option<u32>,
    pub limit_date: Option<NaiveDate>,
    pub declared_status: String,
    pub origin_unit: String,
    pub destination_unit: String,
    pub counterpart: String,
    pub value: Decimal,
    pub delivery_tax: Option<Decimal>,
    pub volumes: Option<u32>,
    pub weight: Option<Decimal>,
    pub payment_type: String,
    pub justification: String,
}

impl Document {
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.document_number.clone(), self.revision.clone())
    }

    pub fn declared_resolved(&self) -> bool {
        is_resolved_label(&self.declared_status)
    }

    pub fn declared_searching(&self) -> bool {
        is_searching_label(&self.declared_status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub document_number: String,
    pub revision: String,
    pub timestamp: String,
    pub author: String,
    pub text: String,
    pub attachment: Option<String>,
    pub tag: Option<StatusTag>,
    #[serde(default)]
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTransition {
    pub id: String,
    pub document_number: String,
    pub revision: String,
    pub timestamp: String,
    pub actor: String,
    pub description: String,
    pub attachment: Option<String>,
    pub tag: StatusTag,
}

/// Business calendar supplied by the sheet, never by the device clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalParams {
    pub reference_today: NaiveDate,
    pub reference_tomorrow: NaiveDate,
    pub tolerance_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub username: String,
    pub unit: Option<String>,
}

impl Actor {
    pub fn unrestricted(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            unit: None,
        }
    }

    pub fn bound_to(username: impl Into<String>, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        Self {
            username: username.into(),
            unit: if unit.trim().is_empty() { None } else { Some(unit) },
        }
    }

    pub fn sees_unit(&self, destination_unit: &str) -> bool {
        match &self.unit {
            None => true,
            Some(unit) => unit.trim().eq_ignore_ascii_case(destination_unit.trim()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    pub document_number: String,
    pub revision: String,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub requested_tag: Option<StatusTag>,
}

impl NoteDraft {
    pub fn new(document_number: impl Into<String>, revision: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            document_number: document_number.into(),
            revision: revision.into(),
            text: text.into(),
            attachments: Vec::new(),
            requested_tag: None,
        }
    }

    pub fn with_tag(mut self, tag: StatusTag) -> Self {
        self.requested_tag = Some(tag);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub note_id: String,
    pub effective_tag: Option<StatusTag>,
    pub lifecycle: LifecycleState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotSource {
    Empty,
    Cached,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Pendencies,
    Critical,
    Searching,
    Disputed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub document: Document,
    pub deadline: DeadlineStatus,
    pub lifecycle: LifecycleState,
    pub latest_note: Option<Note>,
    pub note_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardCounts {
    pub pending: usize,
    pub critical: usize,
    pub searching: usize,
    pub disputed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub quantity: u64,
    pub value: Decimal,
}

impl Bucket {
    pub fn add(&mut self, value: Decimal) {
        self.quantity += 1;
        self.value += value;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub total: Bucket,
    pub by_deadline: BTreeMap<String, Bucket>,
    pub by_payment: BTreeMap<String, Bucket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub generation: u64,
    pub documents: usize,
    pub notes: usize,
    pub transitions: usize,
    pub skipped_rows: usize,
    pub refreshed_at: DateTime<Utc>,
}
