use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("selection requires at least one candidate")]
    EmptyPool,
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("video not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Blocking(String),
}

impl From<tokio::task::JoinError> for LibraryError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Blocking(e.to_string())
    }
}
