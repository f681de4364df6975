pub mod board;
pub mod cache;
pub mod command;
pub mod config;
pub mod dates;
pub mod deadline;
pub mod desk;
pub mod errors;
pub mod feed;
pub mod ledger;
pub mod models;
pub mod mutations;
pub mod reconciler;

pub use crate::board::BoardState;
pub use crate::cache::SnapshotCache;
pub use crate::command::{CommandAction, CommandOutcome, WriteCommand};
pub use crate::config::DeskSettings;
pub use crate::desk::PendencyDesk;
pub use crate::errors::{AppError, AppResult};
pub use crate::feed::{FeedSnapshot, RowSet, TabularFeed};
pub use crate::mutations::SubmitFailure;
pub use crate::reconciler::lifecycle_state;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the JSON file logger under `<data_dir>/logs`. `RUST_LOG` wins
/// over `default_filter`.
pub fn init_tracing(data_dir: &Path, default_filter: &str) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "pendency-desk.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
