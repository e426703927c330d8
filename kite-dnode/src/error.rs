/// Errors from the dnode dialect layer.
#[derive(Debug)]
pub enum DnodeError {
    /// A fragment could not be parsed as JSON.
    Json(serde_json::Error),
    /// A decoded value did not have the shape the caller asked for.
    Argument(ArgumentError),
    /// A message could not be rendered for the wire.
    Encode(String),
    /// A remote callback stub could not deliver its invocation.
    Send(String),
}

impl std::fmt::Display for DnodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnodeError::Json(err) => write!(f, "json: {err}"),
            DnodeError::Argument(err) => write!(f, "{err}"),
            DnodeError::Encode(msg) => write!(f, "encode: {msg}"),
            DnodeError::Send(msg) => write!(f, "send: {msg}"),
        }
    }
}

impl std::error::Error for DnodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DnodeError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DnodeError {
    fn from(err: serde_json::Error) -> Self {
        DnodeError::Json(err)
    }
}

impl From<ArgumentError> for DnodeError {
    fn from(err: ArgumentError) -> Self {
        DnodeError::Argument(err)
    }
}

/// A value did not match the shape a `must_*` projection demanded.
///
/// The `must_*` forms of [`Partial`](crate::Partial) raise this as a panic
/// payload; the dispatcher's recovery boundary downcasts it back into an
/// error notification, so the connection survives a malformed argument.
#[derive(Debug, Clone)]
pub struct ArgumentError {
    pub expected: &'static str,
    pub got: String,
}

impl ArgumentError {
    pub fn new(expected: &'static str, got: impl Into<String>) -> Self {
        Self {
            expected,
            got: got.into(),
        }
    }

    /// Raise this error as a panic payload, to be caught at the dispatch
    /// boundary.
    pub fn raise(self) -> ! {
        std::panic::panic_any(self)
    }
}

impl std::fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "argument error: expected {}, got {}", self.expected, self.got)
    }
}

impl std::error::Error for ArgumentError {}
