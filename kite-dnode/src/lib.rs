//! The dnode dialect: a JSON message framing where either peer may invoke
//! methods on the other, and callback functions may ride along inside
//! ordinary structured arguments.
//!
//! Outgoing argument trees are *scrubbed*: every embedded callable is
//! replaced by the placeholder string `"[Function]"` and its position is
//! recorded in a path map keyed by a monotonically allocated integer id.
//! The receiver *unscrubs* by installing invocation stubs at the recorded
//! paths; invoking a stub sends a new message whose `method` is that
//! integer id, which the original sender routes back to the stored
//! callable.
//!
//! The `arguments` field of a [`Message`] is decoded lazily through a
//! [`Partial`], because only the dispatcher knows what shape the handler
//! expects.

pub mod error;
pub mod message;
pub mod partial;
pub mod path;
pub mod scrub;
pub mod unscrub;
pub mod value;

pub use error::{ArgumentError, DnodeError};
pub use message::{Message, Method};
pub use partial::{CallbackSpec, Partial};
pub use path::{Path, PathSeg};
pub use scrub::{CallbackMap, Scrubber};
pub use unscrub::{install, specs_from_map};
pub use value::{callback, CallValue, Function, IntoArgs, IntoCallValue, RemoteInvoker, FUNCTION_PLACEHOLDER};
