//! Write-back contract with the remote store.

use crate::errors::{AppError, AppResult};
use crate::models::{Attachment, StatusTag};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandAction {
    AddNote,
    StopAlarm,
    DeleteNote,
}

impl CommandAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddNote => "addNote",
            Self::StopAlarm => "stopAlarm",
            Self::DeleteNote => "deleteNote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CommandOutcome {
    Accepted,
    Rejected { reason: String },
}

impl CommandOutcome {
    /// Folds a rejection into the error channel.
    pub fn into_result(self) -> AppResult<()> {
        match self {
            Self::Accepted => Ok(()),
            Self::Rejected { reason } => Err(AppError::Rejected(reason)),
        }
    }
}

/// The remote write endpoint. Implementations report transport failures as
/// `AppError::Unreachable` when the request provably never left, and as
/// `AppError::Transport` when delivery is uncertain.
#[async_trait]
pub trait WriteCommand: Send + Sync {
    async fn execute(&self, action: CommandAction, payload: serde_json::Value) -> AppResult<CommandOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNotePayload {
    pub cte: String,
    pub serie: String,
    pub user: String,
    pub text: String,
    /// First attachment, kept for backends that read a single image.
    pub image: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub mark_in_search: bool,
}

impl AddNotePayload {
    pub fn new(cte: &str, serie: &str, user: &str, text: &str, attachments: &[Attachment], tag: Option<StatusTag>) -> Self {
        let images = attachments.iter().map(data_url).collect::<Vec<_>>();
        Self {
            cte: cte.trim().to_string(),
            serie: serie.trim().to_string(),
            user: user.to_string(),
            text: text.to_string(),
            image: images.first().cloned().unwrap_or_default(),
            images,
            status: tag.map(|tag| tag.as_str().to_string()),
            mark_in_search: tag == Some(StatusTag::Searching),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAlarmPayload {
    pub cte: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteNotePayload {
    pub id: String,
}

/// Encodes an attachment as a `data:` URL.
pub fn data_url(attachment: &Attachment) -> String {
    let content_type = if attachment.content_type.trim().is_empty() {
        "application/octet-stream"
    } else {
        attachment.content_type.trim()
    };
    format!("data:{content_type};base64,{}", STANDARD.encode(&attachment.bytes))
}

/// Wire body `{ "action": ..., "payload": ... }` for HTTP implementations.
pub fn envelope(action: CommandAction, payload: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "action": action.as_str(),
        "payload": payload,
    })
}
