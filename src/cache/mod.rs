use crate::config::DeskSettings;
use crate::errors::{AppError, AppResult};
use crate::feed::FeedSnapshot;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");
const SETTINGS_KEY: &str = "desk";

/// A previously fetched feed, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSnapshot {
    pub id: i64,
    pub fetched_at: DateTime<Utc>,
    pub snapshot: FeedSnapshot,
}

/// Local store for the last good feed snapshots and the desk settings.
#[derive(Debug)]
pub struct SnapshotCache {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SnapshotCache {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn in_memory() -> AppResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> AppResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        let cache = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        cache.ensure_default_settings()?;
        Ok(cache)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("cache mutex poisoned".to_string()))
    }

    pub fn get_settings(&self) -> AppResult<DeskSettings> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = ?1",
                [SETTINGS_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => match serde_json::from_str::<DeskSettings>(&raw) {
                Ok(settings) => Ok(settings),
                Err(error) => {
                    tracing::warn!(error = %error, "stored settings unreadable; using defaults");
                    Ok(DeskSettings::default())
                }
            },
            None => Ok(DeskSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<DeskSettings> {
        let current = self.get_settings()?;
        let settings = current.merged(update)?;
        self.write_settings(&settings)?;
        Ok(settings)
    }

    fn write_settings(&self, settings: &DeskSettings) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![SETTINGS_KEY, serde_json::to_string(settings)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM settings WHERE key = ?1",
            [SETTINGS_KEY],
            |row| row.get(0),
        )?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES (?1, ?2, ?3)",
                params![
                    SETTINGS_KEY,
                    serde_json::to_string(&DeskSettings::default())?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }

    /// Stores a fetched snapshot and prunes everything beyond `retention`.
    pub fn save_snapshot(&self, snapshot: &FeedSnapshot, retention: u32) -> AppResult<i64> {
        let fetched_at = Utc::now();
        let payload = serde_json::to_string(snapshot)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO feed_snapshots (fetched_at, document_rows, note_rows, transition_rows, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                fetched_at.to_rfc3339(),
                snapshot.documents.rows.len() as i64,
                snapshot.notes.rows.len() as i64,
                snapshot.transitions.rows.len() as i64,
                payload,
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "DELETE FROM feed_snapshots WHERE id NOT IN (
               SELECT id FROM feed_snapshots ORDER BY id DESC LIMIT ?1
             )",
            [i64::from(retention.max(1))],
        )?;
        Ok(id)
    }

    pub fn load_latest(&self) -> AppResult<Option<CachedSnapshot>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, fetched_at, payload_json FROM feed_snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, fetched_at, payload)) = row else {
            return Ok(None);
        };
        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|error| AppError::Internal(format!("bad snapshot timestamp: {error}")))?;
        let snapshot = serde_json::from_str::<FeedSnapshot>(&payload)?;
        Ok(Some(CachedSnapshot {
            id,
            fetched_at,
            snapshot,
        }))
    }

    pub fn snapshot_count(&self) -> AppResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM feed_snapshots", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::SnapshotCache;
    use crate::config::DeskSettings;
    use crate::feed::{FeedSnapshot, RowSet};
    use serde_json::json;

    fn snapshot(number: &str) -> FeedSnapshot {
        FeedSnapshot {
            documents: RowSet::from_strs(&[&["CTE", "SERIE"], &[number, "1"]]),
            ..FeedSnapshot::default()
        }
    }

    #[test]
    fn latest_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache").join("desk.sqlite");
        {
            let cache = SnapshotCache::open(&path).expect("open");
            cache.save_snapshot(&snapshot("1"), 5).expect("save");
            cache.save_snapshot(&snapshot("2"), 5).expect("save");
        }
        let cache = SnapshotCache::open(&path).expect("reopen");
        let latest = cache.load_latest().expect("load").expect("snapshot");
        assert_eq!(latest.snapshot, snapshot("2"));
    }

    #[test]
    fn retention_prunes_oldest() {
        let cache = SnapshotCache::in_memory().expect("cache");
        assert!(cache.load_latest().expect("load").is_none());
        for number in ["1", "2", "3", "4"] {
            cache.save_snapshot(&snapshot(number), 2).expect("save");
        }
        assert_eq!(cache.snapshot_count().expect("count"), 2);
        assert_eq!(cache.load_latest().expect("load").expect("latest").snapshot, snapshot("4"));
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let cache = SnapshotCache::in_memory().expect("cache");
        {
            let conn = cache.lock().expect("lock");
            conn.execute(
                "UPDATE settings SET value_json = 'not json' WHERE key = ?1",
                [super::SETTINGS_KEY],
            )
            .expect("corrupt");
        }
        assert_eq!(cache.get_settings().expect("settings"), DeskSettings::default());
    }

    #[test]
    fn settings_default_then_merge() {
        let cache = SnapshotCache::in_memory().expect("cache");
        assert_eq!(cache.get_settings().expect("settings").refresh_delay_ms, 5_000);
        let updated = cache
            .update_settings(json!({ "refreshDelayMs": 10, "defaultToleranceDays": 1 }))
            .expect("update");
        assert_eq!(updated.refresh_delay_ms, 10);
        assert_eq!(cache.get_settings().expect("settings"), updated);
        assert!(cache.update_settings(json!({ "maxAttachmentBytes": 0 })).is_err());
        assert_eq!(cache.get_settings().expect("settings"), updated);
    }
}
