use async_trait::async_trait;
use kite_protocol::{Kite, KiteQuery, RegisterValue};

use crate::error::StorageError;

/// One stored registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KiteRecord {
    pub kite: Kite,
    pub value: RegisterValue,
}

/// The persistence contract behind the registry.
///
/// Concurrent calls are safe, and writes are idempotent on the
/// `(kite, value)` tuple: upsert-then-update is semantically identical to
/// update-then-upsert. Both writes renew the record's lease.
#[async_trait]
pub trait KiteStorage: Send + Sync {
    /// Insert or refresh a registration.
    async fn upsert(&self, kite: &Kite, value: &RegisterValue) -> Result<(), StorageError>;

    /// Refresh a registration's value and lease.
    async fn update(&self, kite: &Kite, value: &RegisterValue) -> Result<(), StorageError>;

    /// Remove a registration.
    async fn delete(&self, kite: &Kite) -> Result<(), StorageError>;

    /// Fetch live registrations matching the query: id-only fast path, or
    /// prefix walk plus constraint/trailing-field filtering. Expired
    /// leases are never returned.
    async fn get(&self, query: &KiteQuery) -> Result<Vec<KiteRecord>, StorageError>;
}

/// Whether a stored canonical key falls under a query prefix path.
///
/// Segment-aligned: `/u/e/n` covers `/u/e/n/...` but not `/u/e/nx/...`.
pub fn key_under_prefix(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_is_segment_aligned() {
        assert!(key_under_prefix("/u/e/n/1.0.0/r/h/id", "/u/e/n"));
        assert!(key_under_prefix("/u/e/n", "/u/e/n"));
        assert!(!key_under_prefix("/u/e/nx/1.0.0/r/h/id", "/u/e/n"));
        assert!(!key_under_prefix("/other/e/n/1.0.0/r/h/id", "/u"));
    }
}
