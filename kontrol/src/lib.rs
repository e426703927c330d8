//! Kontrol, the registry process: kites register here, renew their leases
//! by heartbeating, discover each other through constraint queries, and
//! obtain audience-scoped access tokens. Connected clients speak the
//! dnode RPC dialect over WebSocket; plain HTTP covers registration and
//! heartbeats for clients that do not hold a connection open.

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod http;
pub mod registry;
pub mod rpc;

pub use config::{Backend, KontrolConfig, StorageConfig};
pub use error::KontrolError;
pub use heartbeat::HeartbeatSupervisor;
pub use registry::Registry;
