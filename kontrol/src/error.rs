use kite_core::RpcError;
use kite_data::StorageError;
use kite_protocol::{IdentityError, QueryError};
use kite_security::SecurityError;

/// Service-level errors of the registry.
#[derive(Debug)]
pub enum KontrolError {
    /// A kite identity failed validation.
    Identity(IdentityError),
    /// A discovery query is unusable.
    Query(QueryError),
    /// The caller's key material did not authenticate and no replacement
    /// could be picked.
    Auth(SecurityError),
    /// The backend rejected an operation.
    Storage(StorageError),
    /// A token request matched no kite.
    KiteNotFound,
    /// A token request matched more than one kite.
    TooManyKites(usize),
    /// Configuration is unusable.
    Config(String),
}

impl KontrolError {
    /// Wire discriminator for RPC error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            KontrolError::Identity(_) => "invalidKite",
            KontrolError::Query(_) => "invalidQuery",
            KontrolError::Auth(_) => "authenticationError",
            KontrolError::Storage(_) => "storageError",
            KontrolError::KiteNotFound => "kiteNotFound",
            KontrolError::TooManyKites(_) => "tooManyKites",
            KontrolError::Config(_) => "configError",
        }
    }
}

impl std::fmt::Display for KontrolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KontrolError::Identity(err) => write!(f, "{err}"),
            KontrolError::Query(err) => write!(f, "{err}"),
            KontrolError::Auth(err) => write!(f, "{err}"),
            KontrolError::Storage(err) => write!(f, "{err}"),
            KontrolError::KiteNotFound => f.write_str("no kite matches the query"),
            KontrolError::TooManyKites(n) => {
                write!(f, "query matches {n} kites, token requests need exactly one")
            }
            KontrolError::Config(msg) => write!(f, "configuration: {msg}"),
        }
    }
}

impl std::error::Error for KontrolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KontrolError::Identity(err) => Some(err),
            KontrolError::Query(err) => Some(err),
            KontrolError::Auth(err) => Some(err),
            KontrolError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IdentityError> for KontrolError {
    fn from(err: IdentityError) -> Self {
        KontrolError::Identity(err)
    }
}

impl From<QueryError> for KontrolError {
    fn from(err: QueryError) -> Self {
        KontrolError::Query(err)
    }
}

impl From<SecurityError> for KontrolError {
    fn from(err: SecurityError) -> Self {
        KontrolError::Auth(err)
    }
}

impl From<StorageError> for KontrolError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidQuery(query) => KontrolError::Query(query),
            other => KontrolError::Storage(other),
        }
    }
}

impl From<KontrolError> for RpcError {
    fn from(err: KontrolError) -> Self {
        RpcError::Remote {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
