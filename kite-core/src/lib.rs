//! The bidirectional RPC runtime: a dispatcher over the dnode dialect.
//!
//! A [`Client`] speaks to exactly one peer through an opaque [`Transport`].
//! Either side may invoke named methods on the other, and any argument may
//! carry callbacks that the peer can invoke back later. Requests follow the
//! options-envelope convention: the first argument object carries the
//! caller identity, authentication, the real arguments, and a response
//! callback through which the handler's outcome travels back.

pub mod client;
pub mod error;
pub mod handler;
pub mod request;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use error::RpcError;
pub use handler::{positional, Callback, FromArg, FromArgs, Handler, HandlerResult};
pub use request::Request;
pub use transport::{pipe, PipeTransport, Transport};
