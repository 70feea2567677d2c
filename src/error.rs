use thiserror::Error;

/// Failures raised by a cache storage backend.
///
/// These are always caught at the write boundary: the middleware logs and
/// discards them so a backend outage never alters the response a client sees.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage connection error: {0}")]
    Connection(String),
    #[error("entry serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }
}
