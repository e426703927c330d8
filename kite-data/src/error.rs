use kite_protocol::QueryError;

/// Errors from the persistence layer.
#[derive(Debug)]
pub enum StorageError {
    /// No record for the given kite or query.
    NotFound,
    /// The query itself is unusable.
    InvalidQuery(QueryError),
    /// The backend rejected the operation.
    Backend(Box<dyn std::error::Error + Send + Sync>),
    /// The configured backend is recognized but not available in this
    /// build.
    Unsupported(String),
}

impl StorageError {
    /// Wrap a driver-specific error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StorageError::Backend(Box::new(err))
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound => f.write_str("kite not found"),
            StorageError::InvalidQuery(err) => write!(f, "invalid query: {err}"),
            StorageError::Backend(err) => write!(f, "storage backend: {err}"),
            StorageError::Unsupported(name) => {
                write!(f, "storage backend '{name}' is not available in this build")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Backend(err) => Some(err.as_ref()),
            StorageError::InvalidQuery(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QueryError> for StorageError {
    fn from(err: QueryError) -> Self {
        StorageError::InvalidQuery(err)
    }
}
