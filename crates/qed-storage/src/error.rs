//! Error types for the storage crate.

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed to serve a read or write. Retriable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value violated a structural invariant.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

impl From<fjall::Error> for StoreError {
    fn from(e: fjall::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}
