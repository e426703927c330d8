use std::future::Future;

use futures_util::future::BoxFuture;
use kite_dnode::{CallValue, Function, Partial};
use kite_protocol::{Kite, KiteQuery};

use crate::error::RpcError;
use crate::request::Request;

pub type HandlerResult = Result<CallValue, RpcError>;

/// A method handler. Async closures over [`Request`] implement this
/// directly; positional handlers are adapted through [`positional`].
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, request: Request) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(request))
    }
}

/// Extraction of one positional argument.
pub trait FromArg: Sized {
    fn from_arg(arg: &Partial) -> Result<Self, RpcError>;
}

macro_rules! from_arg_via_serde {
    ($($ty:ty),*) => {
        $(impl FromArg for $ty {
            fn from_arg(arg: &Partial) -> Result<Self, RpcError> {
                arg.to().map_err(|e| RpcError::Argument(e.to_string()))
            }
        })*
    };
}

from_arg_via_serde!(
    String,
    bool,
    f64,
    i64,
    u64,
    serde_json::Value,
    Kite,
    KiteQuery
);

impl<T: FromArg> FromArg for Option<T> {
    fn from_arg(arg: &Partial) -> Result<Self, RpcError> {
        if arg.raw().trim() == "null" {
            Ok(None)
        } else {
            T::from_arg(arg).map(Some)
        }
    }
}

/// A positional callback argument.
#[derive(Clone, Debug)]
pub struct Callback(pub Function);

impl FromArg for Callback {
    fn from_arg(arg: &Partial) -> Result<Self, RpcError> {
        arg.function()
            .map(Callback)
            .map_err(|e| RpcError::Argument(e.to_string()))
    }
}

/// Positional decoding of a whole argument sequence.
pub trait FromArgs: Sized {
    fn from_args(args: &Partial) -> Result<Self, RpcError>;
}

macro_rules! tuple_from_args {
    ($count:literal; $($name:ident $idx:tt),+) => {
        impl<$($name: FromArg),+> FromArgs for ($($name,)+) {
            fn from_args(args: &Partial) -> Result<Self, RpcError> {
                let items = args
                    .slice_of($count)
                    .map_err(|e| RpcError::Argument(e.to_string()))?;
                Ok(($($name::from_arg(&items[$idx])?,)+))
            }
        }
    };
}

tuple_from_args!(1; A 0);
tuple_from_args!(2; A 0, B 1);
tuple_from_args!(3; A 0, B 1, C 2);
tuple_from_args!(4; A 0, B 1, C 2, D 3);
tuple_from_args!(5; A 0, B 1, C 2, D 3, E 4);

/// Adapt a function whose parameters are decoded positionally out of the
/// argument sequence.
///
/// ```ignore
/// client.method("add", positional(|(a, b): (f64, f64)| async move {
///     Ok(CallValue::from_serialize(&(a + b))?)
/// }));
/// ```
pub fn positional<F, A, Fut>(f: F) -> impl Handler
where
    A: FromArgs + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    move |request: Request| {
        let bound = A::from_args(&request.args).map(|args| f(args));
        async move {
            match bound {
                Ok(fut) => fut.await,
                Err(err) => Err(err),
            }
        }
    }
}
