use crate::storage::StorageError;

/// Failure of a single scheduling operation. Nothing here is fatal to the process.
#[derive(Debug)]
pub enum CoreError {
    /// Rejected input; never reaches scheduling.
    Validation(String),
    /// The store could not be written; in-memory scheduling state is unchanged.
    Storage(StorageError),
    /// The scheduler event loop has stopped.
    Unavailable,
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Validation(message) => write!(f, "invalid input: {message}"),
            CoreError::Storage(err) => write!(f, "storage error: {err}"),
            CoreError::Unavailable => write!(f, "scheduler unavailable"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(value: StorageError) -> Self {
        CoreError::Storage(value)
    }
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }
}
