/// Errors from key management, signing, and validation.
#[derive(Debug)]
pub enum SecurityError {
    /// A PEM blob did not parse as the expected key structure.
    InvalidPem(String),
    /// Signing a token failed.
    Signing(String),
    /// A presented token failed verification.
    Verification(String),
    /// No stored key pair matches the requested id or public key.
    KeyNotFound,
    /// No stored key pair could verify the presented material, and no
    /// replacement could be picked.
    NoMatchingKey,
    /// Machine authentication was rejected.
    AuthRejected(String),
}

impl std::fmt::Display for SecurityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityError::InvalidPem(msg) => write!(f, "invalid pem: {msg}"),
            SecurityError::Signing(msg) => write!(f, "signing failed: {msg}"),
            SecurityError::Verification(msg) => write!(f, "verification failed: {msg}"),
            SecurityError::KeyNotFound => f.write_str("key pair not found"),
            SecurityError::NoMatchingKey => f.write_str("no stored key pair matches"),
            SecurityError::AuthRejected(msg) => write!(f, "authentication rejected: {msg}"),
        }
    }
}

impl std::error::Error for SecurityError {}
