//! Optimistic writes: ledgers change locally first, the remote store is told
//! second, and the next full refresh settles the truth.

use crate::command::{AddNotePayload, CommandAction, DeleteNotePayload, StopAlarmPayload};
use crate::dates::format_timestamp;
use crate::desk::PendencyDesk;
use crate::errors::{AppError, AppResult};
use crate::models::{LifecycleState, Note, NoteDraft, ProcessTransition, StatusTag, SubmitReceipt};
use chrono::Local;
use thiserror::Error;
use uuid::Uuid;

pub const SEARCH_STARTED_PREFIX: &str = "SEARCH STARTED: ";
pub const DISPUTE_STARTED_PREFIX: &str = "DISPUTE STARTED: ";
pub const DEFAULT_RESOLUTION_TEXT: &str = "Mercadoria marcada como LOCALIZADA/RESOLVIDA.";

/// A failed write. The draft always comes back so the user's text survives.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SubmitFailure {
    pub error: AppError,
    pub draft: NoteDraft,
    /// True when the speculative entries were taken back out.
    pub rolled_back: bool,
}

impl SubmitFailure {
    fn untouched(error: AppError, draft: NoteDraft) -> Self {
        Self {
            error,
            draft,
            rolled_back: false,
        }
    }
}

/// With no explicit request, a note keeps the document's active incident
/// going.
pub fn effective_tag(requested: Option<StatusTag>, current: LifecycleState) -> Option<StatusTag> {
    requested.or(match current {
        LifecycleState::Searching => Some(StatusTag::Searching),
        LifecycleState::Disputed => Some(StatusTag::Disputed),
        LifecycleState::Normal | LifecycleState::Resolved => None,
    })
}

/// Marks the first note of a new search or dispute episode.
pub fn episode_text(text: &str, tag: Option<StatusTag>, current: LifecycleState) -> String {
    match (tag, current) {
        (Some(StatusTag::Searching), state) if state != LifecycleState::Searching => {
            format!("{SEARCH_STARTED_PREFIX}{text}")
        }
        (Some(StatusTag::Disputed), state) if state != LifecycleState::Disputed => {
            format!("{DISPUTE_STARTED_PREFIX}{text}")
        }
        _ => text.to_string(),
    }
}

/// Journal description for a speculative row. The user's text stays on the
/// note; the journal only ever carries these fixed labels.
pub fn speculative_description(tag: StatusTag, current: LifecycleState) -> &'static str {
    match (tag, current) {
        (StatusTag::Searching, LifecycleState::Searching) => "SEARCH UPDATE",
        (StatusTag::Searching, _) => "SEARCH STARTED",
        (StatusTag::Disputed, LifecycleState::Disputed) => "DISPUTE UPDATE",
        (StatusTag::Disputed, _) => "DISPUTE STARTED",
        (StatusTag::Resolved, _) => "RESOLVED",
    }
}

pub fn validate_draft(draft: &NoteDraft, max_attachment_bytes: u64) -> AppResult<()> {
    if draft.document_number.trim().is_empty() {
        return Err(AppError::Validation("document number is required".to_string()));
    }
    if draft.text.trim().is_empty() && draft.attachments.is_empty() {
        return Err(AppError::Validation("note needs text or an attachment".to_string()));
    }
    if let Some(oversized) = draft
        .attachments
        .iter()
        .find(|attachment| attachment.bytes.len() as u64 > max_attachment_bytes)
    {
        return Err(AppError::Validation(format!(
            "attachment {} exceeds {} bytes",
            oversized.file_name, max_attachment_bytes
        )));
    }
    Ok(())
}

/// What a submit wrote locally, so it can be confirmed or taken back.
#[derive(Debug, Clone)]
struct Speculation {
    generation: u64,
    note_id: String,
    transition_id: Option<String>,
    previous_declared: Option<String>,
    document_number: String,
    revision: String,
    text: String,
    tag: Option<StatusTag>,
    lifecycle: LifecycleState,
}

impl PendencyDesk {
    /// Appends a pending note (and a speculative transition when tagged),
    /// then sends `addNote`.
    pub async fn submit_note(&self, draft: NoteDraft) -> Result<SubmitReceipt, SubmitFailure> {
        let speculation = match self.speculate(&draft) {
            Ok(speculation) => speculation,
            Err(error) => return Err(SubmitFailure::untouched(error, draft)),
        };
        if let Err(error) = self.send_add_note(&draft, &speculation).await {
            return Err(self.fail(error, draft, &speculation));
        }
        self.confirm(&speculation);
        self.schedule_refresh();
        Ok(receipt(&speculation))
    }

    /// Records a resolution. The document reads RESOLVED immediately.
    pub async fn resolve_document(
        &self,
        document_number: &str,
        revision: &str,
        text: Option<String>,
    ) -> Result<SubmitReceipt, SubmitFailure> {
        let text = text
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RESOLUTION_TEXT.to_string());
        let draft = NoteDraft::new(document_number, revision, text).with_tag(StatusTag::Resolved);
        let speculation = match self.speculate(&draft) {
            Ok(speculation) => speculation,
            Err(error) => return Err(SubmitFailure::untouched(error, draft)),
        };
        if let Err(error) = self.send_add_note(&draft, &speculation).await {
            return Err(self.fail(error, draft, &speculation));
        }
        self.confirm(&speculation);

        let payload = StopAlarmPayload {
            cte: speculation.document_number.trim().to_string(),
        };
        let stopped = match serde_json::to_value(payload) {
            Ok(payload) => self
                .commands
                .execute(CommandAction::StopAlarm, payload)
                .await
                .and_then(|outcome| outcome.into_result()),
            Err(error) => Err(error.into()),
        };
        if let Err(error) = stopped {
            tracing::warn!(
                document = %speculation.document_number,
                error = %error,
                "stopAlarm failed after resolution was recorded"
            );
        }

        self.schedule_refresh();
        Ok(receipt(&speculation))
    }

    /// Removes a note locally and remotely. The entry is put back if the
    /// remote delete fails for any reason.
    pub async fn delete_note(&self, note_id: &str) -> AppResult<()> {
        let (generation, position, removed) = {
            let mut state = self.write_state()?;
            let (position, removed) = state
                .notes
                .remove(note_id)
                .ok_or_else(|| AppError::NotFound(format!("note {note_id}")))?;
            (state.generation, position, removed)
        };

        let payload = serde_json::to_value(DeleteNotePayload {
            id: note_id.to_string(),
        })?;
        let result = self
            .commands
            .execute(CommandAction::DeleteNote, payload)
            .await
            .and_then(|outcome| outcome.into_result());

        match result {
            Ok(()) => {
                tracing::info!(note_id, "note deleted");
                self.schedule_refresh();
                Ok(())
            }
            Err(error) => {
                tracing::warn!(note_id, error = %error, "note delete failed; restoring entry");
                let mut state = self.write_state()?;
                if state.generation == generation && state.notes.get(note_id).is_none() {
                    state.notes.restore(position, removed);
                }
                Err(error)
            }
        }
    }

    fn speculate(&self, draft: &NoteDraft) -> AppResult<Speculation> {
        let settings = self.settings()?;
        validate_draft(draft, settings.max_attachment_bytes)?;

        let mut state = self.write_state()?;
        let document = state
            .find_document(&draft.document_number, &draft.revision)
            .ok_or_else(|| {
                AppError::NotFound(format!("document {}/{}", draft.document_number, draft.revision))
            })?;
        let document_number = document.document_number.clone();
        let revision = document.revision.clone();
        let current = state.lifecycle(document);

        let tag = effective_tag(draft.requested_tag, current);
        let text = episode_text(&draft.text, tag, current);
        let note_id = format!("temp-{}", Uuid::new_v4());
        let timestamp = format_timestamp(Local::now().naive_local());

        state.notes.add_note(Note {
            id: note_id.clone(),
            document_number: document_number.clone(),
            revision: revision.clone(),
            timestamp: timestamp.clone(),
            author: self.actor.username.clone(),
            text: text.clone(),
            attachment: draft.attachments.first().map(|attachment| attachment.file_name.clone()),
            tag,
            pending: true,
        });

        let mut transition_id = None;
        let mut previous_declared = None;
        if let Some(tag) = tag {
            let id = format!("{note_id}-process");
            state.journal.append(ProcessTransition {
                id: id.clone(),
                document_number: document_number.clone(),
                revision: revision.clone(),
                timestamp,
                actor: self.actor.username.clone(),
                description: speculative_description(tag, current).to_string(),
                attachment: None,
                tag,
            });
            transition_id = Some(id);
            if let Some(document) = state.find_document_mut(&document_number, &revision) {
                previous_declared = Some(std::mem::replace(&mut document.declared_status, tag.as_str().to_string()));
            }
        }

        let lifecycle = state
            .find_document(&document_number, &revision)
            .map(|document| state.lifecycle(document))
            .unwrap_or(current);

        tracing::info!(
            document = %document_number,
            revision = %revision,
            note_id = %note_id,
            tag = tag.map(StatusTag::as_str).unwrap_or(""),
            from = current.as_str(),
            to = lifecycle.as_str(),
            "speculative note recorded"
        );

        Ok(Speculation {
            generation: state.generation,
            note_id,
            transition_id,
            previous_declared,
            document_number,
            revision,
            text,
            tag,
            lifecycle,
        })
    }

    async fn send_add_note(&self, draft: &NoteDraft, speculation: &Speculation) -> AppResult<()> {
        let payload = AddNotePayload::new(
            &speculation.document_number,
            &speculation.revision,
            &self.actor.username,
            &speculation.text,
            &draft.attachments,
            speculation.tag,
        );
        let payload = serde_json::to_value(payload)?;
        self.commands
            .execute(CommandAction::AddNote, payload)
            .await?
            .into_result()
    }

    fn confirm(&self, speculation: &Speculation) {
        match self.write_state() {
            Ok(mut state) => {
                if !state.notes.confirm(&speculation.note_id) {
                    tracing::debug!(note_id = %speculation.note_id, "note already replaced by a refresh");
                }
            }
            Err(error) => tracing::error!(error = %error, "failed to confirm note"),
        }
    }

    /// Rolls back when the store provably never applied the write; otherwise
    /// leaves the pending entries for the next refresh to settle.
    fn fail(&self, error: AppError, draft: NoteDraft, speculation: &Speculation) -> SubmitFailure {
        if !error.is_definitive_write_failure() {
            tracing::warn!(
                note_id = %speculation.note_id,
                error = %error,
                "addNote outcome uncertain; keeping pending entries"
            );
            self.schedule_refresh();
            return SubmitFailure::untouched(error, draft);
        }

        let rolled_back = match self.write_state() {
            Ok(mut state) => {
                state.notes.remove(&speculation.note_id);
                if let Some(transition_id) = &speculation.transition_id {
                    state.journal.remove(transition_id);
                }
                if state.generation == speculation.generation {
                    if let Some(previous) = &speculation.previous_declared {
                        if let Some(document) =
                            state.find_document_mut(&speculation.document_number, &speculation.revision)
                        {
                            document.declared_status = previous.clone();
                        }
                    }
                }
                true
            }
            Err(lock_error) => {
                tracing::error!(error = %lock_error, "failed to roll back speculative note");
                false
            }
        };
        tracing::warn!(note_id = %speculation.note_id, error = %error, rolled_back, "addNote failed");
        SubmitFailure {
            error,
            draft,
            rolled_back,
        }
    }
}

fn receipt(speculation: &Speculation) -> SubmitReceipt {
    SubmitReceipt {
        note_id: speculation.note_id.clone(),
        effective_tag: speculation.tag,
        lifecycle: speculation.lifecycle,
    }
}
