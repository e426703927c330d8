use kite_dnode::DnodeError;

/// Errors surfaced by the RPC runtime.
///
/// The dispatcher never dies from a handler fault: handler panics and
/// unresolvable methods become observer notifications, and only the
/// calling side of an RPC sees `Timeout`, `Disconnect`, or `Remote`.
#[derive(Debug, Clone)]
pub enum RpcError {
    /// An inbound method name has no registered handler.
    MethodNotFound(String),
    /// An inbound integer method refers to no live callback.
    CallbackNotFound(u64),
    /// Arguments did not decode to the expected shape.
    Argument(String),
    /// An outbound call did not receive its reply in time.
    Timeout(String),
    /// The transport closed during an in-flight exchange.
    Disconnect,
    /// The peer's handler reported an error.
    Remote { kind: String, message: String },
    /// A frame could not be parsed or rendered.
    Codec(String),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::MethodNotFound(name) => write!(f, "method not found: {name}"),
            RpcError::CallbackNotFound(id) => write!(f, "callback not found: {id}"),
            RpcError::Argument(msg) => write!(f, "argument error: {msg}"),
            RpcError::Timeout(method) => write!(f, "timeout calling {method}"),
            RpcError::Disconnect => f.write_str("transport disconnected"),
            RpcError::Remote { kind, message } => write!(f, "remote error ({kind}): {message}"),
            RpcError::Codec(msg) => write!(f, "codec: {msg}"),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<DnodeError> for RpcError {
    fn from(err: DnodeError) -> Self {
        match err {
            DnodeError::Argument(arg) => RpcError::Argument(arg.to_string()),
            DnodeError::Json(json) => RpcError::Codec(json.to_string()),
            DnodeError::Encode(msg) => RpcError::Codec(msg),
            DnodeError::Send(_) => RpcError::Disconnect,
        }
    }
}

impl RpcError {
    /// The wire `type` discriminator used in response error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::MethodNotFound(_) => "methodNotFound",
            RpcError::CallbackNotFound(_) => "callbackNotFound",
            RpcError::Argument(_) => "argumentError",
            RpcError::Timeout(_) => "timeout",
            RpcError::Disconnect => "disconnect",
            RpcError::Remote { .. } => "genericError",
            RpcError::Codec(_) => "codecError",
        }
    }
}
