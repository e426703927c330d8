use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::DnodeError;
use crate::partial::Partial;

/// The literal string left behind wherever a callable was scrubbed out of
/// an argument tree.
pub const FUNCTION_PLACEHOLDER: &str = "[Function]";

/// An argument tree: JSON values plus embedded callables.
///
/// Rust has no runtime reflection over arbitrary records, so arguments are
/// built as an explicit tree. Plain data enters through [`CallValue::from`]
/// on a `serde_json::Value` or [`CallValue::from_serialize`] on any
/// `Serialize` type (serde attributes supply wire names, skipping, and
/// embedded-field flattening); callables enter through [`callback`] or
/// [`Function`]. A callable can only exist in the tree wrapped: there is
/// no way to smuggle a bare closure past the scrubber.
#[derive(Debug, Clone, PartialEq)]
pub enum CallValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<CallValue>),
    Object(BTreeMap<String, CallValue>),
    Function(Function),
}

impl CallValue {
    /// Convert any `Serialize` type into a (callable-free) argument tree.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<CallValue, DnodeError> {
        Ok(CallValue::from(serde_json::to_value(value)?))
    }

    /// Render the tree as plain JSON. Callables become the
    /// [`FUNCTION_PLACEHOLDER`] string; use the scrubber instead when they
    /// must stay invokable.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CallValue::Null => serde_json::Value::Null,
            CallValue::Bool(b) => serde_json::Value::Bool(*b),
            CallValue::Number(n) => serde_json::Value::Number(n.clone()),
            CallValue::String(s) => serde_json::Value::String(s.clone()),
            CallValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(CallValue::to_json).collect())
            }
            CallValue::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            CallValue::Function(_) => {
                serde_json::Value::String(FUNCTION_PLACEHOLDER.to_string())
            }
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, CallValue::Function(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CallValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            CallValue::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Navigate to a child by path segments, if present.
    pub fn get(&self, segs: &[crate::path::PathSeg]) -> Option<&CallValue> {
        let mut current = self;
        for seg in segs {
            current = match current {
                CallValue::Array(items) => items.get(seg.as_index()?)?,
                CallValue::Object(fields) => fields.get(seg.as_key().as_ref())?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Build an object tree from `(key, value)` pairs.
    pub fn object<K, V, I>(fields: I) -> CallValue
    where
        K: Into<String>,
        V: IntoCallValue,
        I: IntoIterator<Item = (K, V)>,
    {
        CallValue::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into_call_value()))
                .collect(),
        )
    }
}

impl From<serde_json::Value> for CallValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CallValue::Null,
            serde_json::Value::Bool(b) => CallValue::Bool(b),
            serde_json::Value::Number(n) => CallValue::Number(n),
            serde_json::Value::String(s) => CallValue::String(s),
            serde_json::Value::Array(items) => {
                CallValue::Array(items.into_iter().map(CallValue::from).collect())
            }
            serde_json::Value::Object(fields) => CallValue::Object(
                fields.into_iter().map(|(k, v)| (k, CallValue::from(v))).collect(),
            ),
        }
    }
}

/// Delivers a remote callback invocation: scrub the arguments and emit an
/// envelope whose method is the callback's integer id. Implemented by the
/// RPC runtime; the dialect layer stays transport-agnostic.
pub trait RemoteInvoker: Send + Sync {
    fn invoke(&self, id: u64, args: CallValue) -> Result<(), DnodeError>;
}

enum FunctionInner {
    /// A callable owned by this process; the peer holds its integer id.
    Local(Box<dyn Fn(Partial) + Send + Sync>),
    /// A stub standing in for a callable owned by the peer.
    Remote { id: u64, invoker: Arc<dyn RemoteInvoker> },
}

/// A wrapped callable inside an argument tree.
///
/// Local functions are registered with the scrubber on send and invoked
/// when the peer calls back with their id. Remote functions are the stubs
/// the unscrubber installs; calling one emits a new message addressed to
/// the peer's callable.
#[derive(Clone)]
pub struct Function {
    inner: Arc<FunctionInner>,
}

impl Function {
    pub fn local<F>(f: F) -> Function
    where
        F: Fn(Partial) + Send + Sync + 'static,
    {
        Function {
            inner: Arc::new(FunctionInner::Local(Box::new(f))),
        }
    }

    pub fn remote(id: u64, invoker: Arc<dyn RemoteInvoker>) -> Function {
        Function {
            inner: Arc::new(FunctionInner::Remote { id, invoker }),
        }
    }

    /// The peer-side callback id, for stubs installed by unscrubbing.
    pub fn remote_id(&self) -> Option<u64> {
        match &*self.inner {
            FunctionInner::Remote { id, .. } => Some(*id),
            FunctionInner::Local(_) => None,
        }
    }

    /// Invoke with a fresh argument list.
    ///
    /// A remote stub scrubs the arguments and emits an envelope addressed
    /// to the peer's callable. A local function is handed the arguments
    /// marshaled as a [`Partial`]; callables embedded in a direct local
    /// call are not transferable and degrade to placeholders.
    pub fn call(&self, args: impl IntoArgs) -> Result<(), DnodeError> {
        let args = args.into_args();
        match &*self.inner {
            FunctionInner::Remote { id, invoker } => invoker.invoke(*id, args),
            FunctionInner::Local(f) => {
                let partial = Partial::from_value(&args.to_json())?;
                f(partial);
                Ok(())
            }
        }
    }

    /// Invoke a local function with already-decoded arguments. Used by the
    /// dispatcher when the peer calls back by id; delegates to the remote
    /// path for stubs.
    pub fn invoke_partial(&self, args: Partial) -> Result<(), DnodeError> {
        match &*self.inner {
            FunctionInner::Local(f) => {
                f(args);
                Ok(())
            }
            FunctionInner::Remote { id, invoker } => {
                invoker.invoke(*id, args.decode()?)
            }
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner {
            FunctionInner::Local(_) => f.write_str("Function(local)"),
            FunctionInner::Remote { id, .. } => write!(f, "Function(remote:{id})"),
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Wrap a closure as a callback value, ready to embed in an argument tree.
pub fn callback<F>(f: F) -> CallValue
where
    F: Fn(Partial) + Send + Sync + 'static,
{
    CallValue::Function(Function::local(f))
}

/// Conversion of a single value into an argument-tree node.
pub trait IntoCallValue {
    fn into_call_value(self) -> CallValue;
}

impl IntoCallValue for CallValue {
    fn into_call_value(self) -> CallValue {
        self
    }
}

impl IntoCallValue for Function {
    fn into_call_value(self) -> CallValue {
        CallValue::Function(self)
    }
}

impl IntoCallValue for serde_json::Value {
    fn into_call_value(self) -> CallValue {
        CallValue::from(self)
    }
}

impl IntoCallValue for () {
    fn into_call_value(self) -> CallValue {
        CallValue::Null
    }
}

impl IntoCallValue for bool {
    fn into_call_value(self) -> CallValue {
        CallValue::Bool(self)
    }
}

impl IntoCallValue for &str {
    fn into_call_value(self) -> CallValue {
        CallValue::String(self.to_string())
    }
}

impl IntoCallValue for String {
    fn into_call_value(self) -> CallValue {
        CallValue::String(self)
    }
}

impl IntoCallValue for f64 {
    fn into_call_value(self) -> CallValue {
        serde_json::Number::from_f64(self)
            .map(CallValue::Number)
            .unwrap_or(CallValue::Null)
    }
}

macro_rules! int_into_call_value {
    ($($ty:ty),*) => {
        $(impl IntoCallValue for $ty {
            fn into_call_value(self) -> CallValue {
                CallValue::Number(serde_json::Number::from(self as i64))
            }
        })*
    };
}

int_into_call_value!(i8, i16, i32, i64, u8, u16, u32);

impl<T: IntoCallValue> IntoCallValue for Option<T> {
    fn into_call_value(self) -> CallValue {
        match self {
            Some(v) => v.into_call_value(),
            None => CallValue::Null,
        }
    }
}

impl<T: IntoCallValue> IntoCallValue for Vec<T> {
    fn into_call_value(self) -> CallValue {
        CallValue::Array(self.into_iter().map(IntoCallValue::into_call_value).collect())
    }
}

/// Conversion into a top-level argument sequence.
///
/// Method calls carry their arguments as a sequence; tuples of up to eight
/// elements convert positionally. `CallValue` passes through unchanged for
/// callers that build the sequence by hand.
pub trait IntoArgs {
    fn into_args(self) -> CallValue;
}

impl IntoArgs for CallValue {
    fn into_args(self) -> CallValue {
        self
    }
}

impl IntoArgs for () {
    fn into_args(self) -> CallValue {
        CallValue::Array(Vec::new())
    }
}

impl<T: IntoCallValue> IntoArgs for Vec<T> {
    fn into_args(self) -> CallValue {
        CallValue::Array(self.into_iter().map(IntoCallValue::into_call_value).collect())
    }
}

macro_rules! tuple_into_args {
    ($($name:ident),+) => {
        impl<$($name: IntoCallValue),+> IntoArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> CallValue {
                let ($($name,)+) = self;
                CallValue::Array(vec![$($name.into_call_value()),+])
            }
        }
    };
}

tuple_into_args!(A);
tuple_into_args!(A, B);
tuple_into_args!(A, B, C);
tuple_into_args!(A, B, C, D);
tuple_into_args!(A, B, C, D, E);
tuple_into_args!(A, B, C, D, E, F);
tuple_into_args!(A, B, C, D, E, F, G);
tuple_into_args!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_conversions() {
        assert_eq!(42i32.into_call_value(), CallValue::Number(42.into()));
        assert_eq!("x".into_call_value(), CallValue::String("x".into()));
        assert_eq!(None::<i32>.into_call_value(), CallValue::Null);
    }

    #[test]
    fn tuple_args_build_a_sequence() {
        let args = ("hello", 7i64).into_args();
        match args {
            CallValue::Array(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].as_str(), Some("hello"));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn serde_types_flatten_through_json() {
        #[derive(serde::Serialize)]
        struct Inner {
            port: u16,
        }

        #[derive(serde::Serialize)]
        struct Outer {
            #[serde(rename = "hostName")]
            host: String,
            #[serde(flatten)]
            inner: Inner,
            #[serde(skip)]
            _secret: u8,
        }

        let v = CallValue::from_serialize(&Outer {
            host: "a".into(),
            inner: Inner { port: 80 },
            _secret: 9,
        })
        .unwrap();

        let json = v.to_json();
        assert_eq!(json["hostName"], "a");
        assert_eq!(json["port"], 80);
        assert!(json.get("_secret").is_none());
    }
}
