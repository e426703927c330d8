//! The kite persistence contract and the default in-memory backend.
//!
//! Backends are interchangeable behind [`KiteStorage`]; implementations
//! without intrinsic TTL run a background sweeper honoring the key
//! lifetime, and must never return an expired lease even between sweeps.

pub mod error;
pub mod memory;
pub mod storage;

pub use error::StorageError;
pub use memory::InMemoryKiteStorage;
pub use storage::{KiteRecord, KiteStorage};
