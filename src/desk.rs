use crate::board::BoardState;
use crate::cache::SnapshotCache;
use crate::command::WriteCommand;
use crate::config::DeskSettings;
use crate::errors::{AppError, AppResult};
use crate::feed::{map_snapshot, TabularFeed};
use crate::models::{
    Actor, BoardCounts, BoardSummary, DocumentView, GlobalParams, LifecycleState, Note, Page, ProcessTransition,
    RefreshReport, SnapshotSource,
};
use chrono::{Local, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub const CACHE_FILE_NAME: &str = "desk.sqlite";

/// Owns one actor's session: the current board, the collaborators and the
/// local cache. Ledger locks are never held across an await.
pub struct PendencyDesk {
    pub(crate) state: RwLock<BoardState>,
    pub(crate) commands: Arc<dyn WriteCommand>,
    pub(crate) actor: Actor,
    feed: Arc<dyn TabularFeed>,
    cache: SnapshotCache,
    settings: RwLock<DeskSettings>,
    tickets: AtomicU64,
    me: Weak<PendencyDesk>,
}

impl PendencyDesk {
    /// Boots from `cache`, using its stored settings.
    pub fn new(
        cache: SnapshotCache,
        feed: Arc<dyn TabularFeed>,
        commands: Arc<dyn WriteCommand>,
        actor: Actor,
    ) -> AppResult<Arc<Self>> {
        let settings = cache.get_settings()?;
        Self::with_settings(cache, settings, feed, commands, actor)
    }

    /// Opens the cache under `data_dir` and layers `desk.yaml` over the stored
    /// settings.
    pub fn open(
        data_dir: &Path,
        feed: Arc<dyn TabularFeed>,
        commands: Arc<dyn WriteCommand>,
        actor: Actor,
    ) -> AppResult<Arc<Self>> {
        let cache = SnapshotCache::open(&data_dir.join(CACHE_FILE_NAME))?;
        let settings = cache.get_settings()?.with_overrides(data_dir)?;
        Self::with_settings(cache, settings, feed, commands, actor)
    }

    pub fn with_settings(
        cache: SnapshotCache,
        settings: DeskSettings,
        feed: Arc<dyn TabularFeed>,
        commands: Arc<dyn WriteCommand>,
        actor: Actor,
    ) -> AppResult<Arc<Self>> {
        settings.validate()?;
        let today = Local::now().date_naive();
        let state = match cache.load_latest()? {
            Some(cached) => {
                let mapped = map_snapshot(&cached.snapshot, today, settings.default_tolerance_days);
                tracing::info!(
                    snapshot_id = cached.id,
                    documents = mapped.documents.len(),
                    "booting from cached snapshot"
                );
                BoardState::from_mapped(mapped, 0, SnapshotSource::Cached, cached.fetched_at)
            }
            None => BoardState::empty(today),
        };

        Ok(Arc::new_cyclic(|me| Self {
            state: RwLock::new(state),
            commands,
            actor,
            feed,
            cache,
            settings: RwLock::new(settings),
            tickets: AtomicU64::new(0),
            me: me.clone(),
        }))
    }

    pub(crate) fn read_state(&self) -> AppResult<RwLockReadGuard<'_, BoardState>> {
        self.state
            .read()
            .map_err(|_| AppError::Internal("board lock poisoned".to_string()))
    }

    pub(crate) fn write_state(&self) -> AppResult<RwLockWriteGuard<'_, BoardState>> {
        self.state
            .write()
            .map_err(|_| AppError::Internal("board lock poisoned".to_string()))
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn settings(&self) -> AppResult<DeskSettings> {
        self.settings
            .read()
            .map(|settings| settings.clone())
            .map_err(|_| AppError::Internal("settings lock poisoned".to_string()))
    }

    /// Persists a partial settings update and applies it to this session.
    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<DeskSettings> {
        let settings = self.cache.update_settings(update)?;
        let mut current = self
            .settings
            .write()
            .map_err(|_| AppError::Internal("settings lock poisoned".to_string()))?;
        *current = settings.clone();
        Ok(settings)
    }

    /// Fetches every tab and replaces the board in one step. A failed fetch
    /// leaves the current board untouched. Returns `None` when a refresh that
    /// started later has already been applied.
    pub async fn refresh(&self) -> AppResult<Option<RefreshReport>> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(ticket, "refresh started");

        let snapshot = match self.feed.fetch().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(ticket, error = %error, "feed fetch failed; keeping current board");
                return Err(error);
            }
        };

        let settings = self.settings()?;
        let mapped = map_snapshot(&snapshot, Local::now().date_naive(), settings.default_tolerance_days);
        let refreshed_at = Utc::now();
        let report = RefreshReport {
            generation: ticket,
            documents: mapped.documents.len(),
            notes: mapped.notes.len(),
            transitions: mapped.transitions.len(),
            skipped_rows: mapped.skipped_rows,
            refreshed_at,
        };

        {
            let mut state = self.write_state()?;
            if state.generation > ticket {
                tracing::debug!(ticket, applied = state.generation, "discarding superseded refresh");
                return Ok(None);
            }
            *state = BoardState::from_mapped(mapped, ticket, SnapshotSource::Remote, refreshed_at);
        }

        if let Err(error) = self.cache.save_snapshot(&snapshot, settings.snapshot_retention) {
            tracing::warn!(ticket, error = %error, "failed to cache feed snapshot");
        }
        tracing::info!(
            ticket,
            documents = report.documents,
            notes = report.notes,
            transitions = report.transitions,
            skipped_rows = report.skipped_rows,
            "board refreshed"
        );
        Ok(Some(report))
    }

    /// Spawns a refresh after the configured delay. The task only holds a
    /// weak handle, so a dropped desk cancels it.
    pub fn schedule_refresh(&self) -> Option<JoinHandle<()>> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime; skipping scheduled refresh");
            return None;
        };
        let delay = self
            .settings()
            .map(|settings| settings.refresh_delay_ms)
            .unwrap_or_else(|_| DeskSettings::default().refresh_delay_ms);
        let desk = self.me.clone();

        Some(handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let Some(desk) = desk.upgrade() else {
                return;
            };
            if let Err(error) = desk.refresh().await {
                tracing::warn!(error = %error, "scheduled refresh failed");
            }
        }))
    }

    pub fn generation(&self) -> AppResult<u64> {
        Ok(self.read_state()?.generation)
    }

    pub fn source(&self) -> AppResult<SnapshotSource> {
        Ok(self.read_state()?.source)
    }

    pub fn params(&self) -> AppResult<GlobalParams> {
        Ok(self.read_state()?.params)
    }

    pub fn views(&self) -> AppResult<Vec<DocumentView>> {
        Ok(self.read_state()?.views())
    }

    pub fn page(&self, page: Page) -> AppResult<Vec<DocumentView>> {
        Ok(self.read_state()?.page(page, &self.actor))
    }

    pub fn counts(&self) -> AppResult<BoardCounts> {
        Ok(self.read_state()?.counts(&self.actor))
    }

    pub fn summary(&self, unit: Option<&str>) -> AppResult<BoardSummary> {
        Ok(self.read_state()?.summary(&self.actor, unit))
    }

    pub fn attention(&self) -> AppResult<Vec<DocumentView>> {
        Ok(self.read_state()?.attention(&self.actor))
    }

    pub fn available_units(&self) -> AppResult<Vec<String>> {
        Ok(self.read_state()?.available_units())
    }

    pub fn document_view(&self, document_number: &str, revision: &str) -> AppResult<DocumentView> {
        let state = self.read_state()?;
        let document = state
            .find_document(document_number, revision)
            .ok_or_else(|| AppError::NotFound(format!("document {document_number}/{revision}")))?;
        Ok(state.view(document))
    }

    pub fn lifecycle(&self, document_number: &str, revision: &str) -> AppResult<LifecycleState> {
        Ok(self.document_view(document_number, revision)?.lifecycle)
    }

    pub fn notes_for(&self, document_number: &str) -> AppResult<Vec<Note>> {
        Ok(self.read_state()?.notes.notes_for(document_number).cloned().collect())
    }

    pub fn history_for(&self, document_number: &str, revision: Option<&str>) -> AppResult<Vec<ProcessTransition>> {
        Ok(self
            .read_state()?
            .journal
            .history_for(document_number, revision)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::PendencyDesk;
    use crate::cache::SnapshotCache;
    use crate::command::{CommandAction, CommandOutcome, WriteCommand};
    use crate::errors::{AppError, AppResult};
    use crate::feed::{FeedSnapshot, RowSet, TabularFeed};
    use crate::models::{Actor, SnapshotSource};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct ScriptedFeed {
        responses: Mutex<Vec<AppResult<FeedSnapshot>>>,
    }

    #[async_trait]
    impl TabularFeed for ScriptedFeed {
        async fn fetch(&self) -> AppResult<FeedSnapshot> {
            self.responses
                .lock()
                .expect("feed lock")
                .pop()
                .unwrap_or_else(|| Err(AppError::Feed("script exhausted".to_string())))
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl WriteCommand for AcceptAll {
        async fn execute(&self, _action: CommandAction, _payload: serde_json::Value) -> AppResult<CommandOutcome> {
            Ok(CommandOutcome::Accepted)
        }
    }

    fn snapshot(numbers: &[&str]) -> FeedSnapshot {
        let mut rows = vec![vec!["CTE".to_string(), "SERIE".to_string(), "DATA LIMITE".to_string()]];
        rows.extend(numbers.iter().map(|number| vec![number.to_string(), "1".to_string(), "01/03/2024".to_string()]));
        FeedSnapshot {
            documents: RowSet::new(rows),
            parameters: RowSet::from_strs(&[&["HOJE", "05/03/2024"]]),
            ..FeedSnapshot::default()
        }
    }

    fn desk(cache: SnapshotCache, responses: Vec<AppResult<FeedSnapshot>>) -> Arc<PendencyDesk> {
        let feed = Arc::new(ScriptedFeed {
            responses: Mutex::new(responses),
        });
        PendencyDesk::new(cache, feed, Arc::new(AcceptAll), Actor::unrestricted("ana")).expect("desk")
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_board() {
        let cache = SnapshotCache::in_memory().expect("cache");
        let desk = desk(
            cache,
            vec![Err(AppError::Feed("offline".to_string())), Ok(snapshot(&["1", "2"]))],
        );
        let report = desk.refresh().await.expect("refresh").expect("applied");
        assert_eq!(report.documents, 2);
        assert_eq!(desk.source().expect("source"), SnapshotSource::Remote);

        assert!(matches!(desk.refresh().await, Err(AppError::Feed(_))));
        assert_eq!(desk.views().expect("views").len(), 2);
        assert_eq!(desk.generation().expect("generation"), 1);
    }

    #[tokio::test]
    async fn boots_from_cached_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("desk.sqlite");
        {
            let cache = SnapshotCache::open(&path).expect("cache");
            let desk = desk(cache, vec![Ok(snapshot(&["7"]))]);
            desk.refresh().await.expect("refresh");
        }
        let cache = SnapshotCache::open(&path).expect("reopen");
        let desk = desk(cache, Vec::new());
        assert_eq!(desk.source().expect("source"), SnapshotSource::Cached);
        assert_eq!(desk.views().expect("views")[0].document.document_number, "7");
        assert!(desk.refresh().await.is_err());
        assert_eq!(desk.views().expect("views").len(), 1);
    }

    #[tokio::test]
    async fn settings_update_applies_to_session() {
        let desk = desk(SnapshotCache::in_memory().expect("cache"), Vec::new());
        let updated = desk
            .update_settings(serde_json::json!({ "refreshDelayMs": 1 }))
            .expect("update");
        assert_eq!(updated.refresh_delay_ms, 1);
        assert_eq!(desk.settings().expect("settings").refresh_delay_ms, 1);
        assert!(desk.lifecycle("missing", "1").is_err());
    }
}
