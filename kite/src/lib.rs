//! Kite: a fleet registry and bidirectional RPC runtime.
//!
//! This facade crate re-exports the member crates through a single
//! dependency with feature flags.
//!
//! | Feature     | Default | Crate            |
//! |-------------|---------|------------------|
//! | `security`  | **yes** | `kite-security`  |
//! | `data`      | **yes** | `kite-data`      |
//! | `data-sqlx` | no      | `kite-data-sqlx` |
//! | `kontrol`   | no      | `kontrol`        |
//! | `full`      | no      | All of the above |

pub extern crate kite_core;
pub extern crate kite_dnode;
pub extern crate kite_protocol;

#[cfg(feature = "data")]
pub extern crate kite_data;
#[cfg(feature = "data-sqlx")]
pub extern crate kite_data_sqlx;
#[cfg(feature = "kontrol")]
pub extern crate kontrol;
#[cfg(feature = "security")]
pub extern crate kite_security;

pub use kite_core::{Client, ClientBuilder, Handler, Request, RpcError, Transport};
pub use kite_dnode::{callback, CallValue, Function, Message, Method, Partial, Scrubber};
pub use kite_protocol::{Kite, KiteQuery, RegisterValue};
