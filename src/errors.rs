use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("FEED_FAILED: {0}")]
    Feed(String),
    #[error("COMMAND_REJECTED: {0}")]
    Rejected(String),
    #[error("UNREACHABLE: {0}")]
    Unreachable(String),
    #[error("TRANSPORT: {0}")]
    Transport(String),
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// True when the remote store provably never applied the write.
    pub fn is_definitive_write_failure(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Unreachable(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
