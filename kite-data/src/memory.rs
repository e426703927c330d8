use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use async_trait::async_trait;
use kite_protocol::{Kite, KiteQuery, RegisterValue};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::storage::{key_under_prefix, KiteRecord, KiteStorage};

struct Entry {
    kite: Kite,
    value: RegisterValue,
    expires_at: Instant,
}

struct Inner {
    /// Canonical key → registration.
    entries: HashMap<String, Entry>,
    /// Secondary index: kite id → canonical key.
    ids: HashMap<String, String>,
}

/// The default backend: no persistence, leases expire after the key TTL.
///
/// Lacking intrinsic TTL, it runs a sweeper task; lookups additionally
/// skip entries whose lease lapsed between sweeps.
pub struct InMemoryKiteStorage {
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl InMemoryKiteStorage {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                ids: HashMap::new(),
            }),
        })
    }

    fn write(&self, kite: &Kite, value: &RegisterValue) {
        let key = kite.key();
        let mut inner = self.inner.lock().unwrap();
        inner.ids.insert(kite.id.clone(), key.clone());
        inner.entries.insert(
            key,
            Entry {
                kite: kite.clone(),
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop expired leases. Called by the sweeper; harmless to call
    /// directly.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<(String, String)> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, entry)| (key.clone(), entry.kite.id.clone()))
            .collect();
        for (key, id) in expired {
            inner.entries.remove(&key);
            if inner.ids.get(&id).map(|k| k == &key).unwrap_or(false) {
                inner.ids.remove(&id);
            }
            tracing::debug!(key, "lease expired");
        }
    }

    /// Run the sweeper until the token is cancelled.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let storage = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => storage.sweep(),
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    fn live_record(entry: &Entry, now: Instant) -> Option<KiteRecord> {
        (entry.expires_at > now).then(|| KiteRecord {
            kite: entry.kite.clone(),
            value: entry.value.clone(),
        })
    }
}

#[async_trait]
impl KiteStorage for InMemoryKiteStorage {
    async fn upsert(&self, kite: &Kite, value: &RegisterValue) -> Result<(), StorageError> {
        self.write(kite, value);
        Ok(())
    }

    async fn update(&self, kite: &Kite, value: &RegisterValue) -> Result<(), StorageError> {
        // Idempotent with upsert on the same tuple; both renew the lease.
        self.write(kite, value);
        Ok(())
    }

    async fn delete(&self, kite: &Kite) -> Result<(), StorageError> {
        let key = kite.key();
        let mut inner = self.inner.lock().unwrap();
        inner.entries.remove(&key);
        if inner.ids.get(&kite.id).map(|k| k == &key).unwrap_or(false) {
            inner.ids.remove(&kite.id);
        }
        Ok(())
    }

    async fn get(&self, query: &KiteQuery) -> Result<Vec<KiteRecord>, StorageError> {
        let now = Instant::now();
        let inner = self.inner.lock().unwrap();

        if query.is_id_only() {
            let Some(key) = inner.ids.get(&query.id) else {
                return Ok(Vec::new());
            };
            return Ok(inner
                .entries
                .get(key)
                .and_then(|entry| Self::live_record(entry, now))
                .into_iter()
                .collect());
        }

        let prefix = query.prefix()?;
        Ok(inner
            .entries
            .iter()
            .filter(|(key, _)| key_under_prefix(key, &prefix.path))
            .filter(|(_, entry)| prefix.admits(&entry.kite))
            .filter_map(|(_, entry)| Self::live_record(entry, now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kite(version: &str, id: &str) -> Kite {
        Kite {
            username: "devrim".into(),
            environment: "prod".into(),
            name: "mathworker".into(),
            version: version.into(),
            region: "us-east".into(),
            hostname: "host-a".into(),
            id: id.into(),
        }
    }

    fn value() -> RegisterValue {
        RegisterValue {
            url: "http://host-a:6161/kite".into(),
            key_id: "key-1".into(),
        }
    }

    fn query(version: &str) -> KiteQuery {
        KiteQuery {
            username: "devrim".into(),
            environment: "prod".into(),
            name: "mathworker".into(),
            version: version.into(),
            ..KiteQuery::default()
        }
    }

    #[tokio::test]
    async fn prefix_and_id_lookups() {
        let storage = InMemoryKiteStorage::new(Duration::from_secs(60));
        storage.upsert(&kite("1.1.1", "uuid-1"), &value()).await.unwrap();

        let hits = storage.get(&query("")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value.url, "http://host-a:6161/kite");

        let by_id = storage.get(&KiteQuery::by_id("uuid-1")).await.unwrap();
        assert_eq!(by_id.len(), 1);

        let miss = storage.get(&KiteQuery::by_id("nope")).await.unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn version_constraint_filters_post_fetch() {
        let storage = InMemoryKiteStorage::new(Duration::from_secs(60));
        for (i, version) in ["1.0.0", "1.1.0", "1.1.5", "1.2.0", "2.0.0"].iter().enumerate() {
            storage
                .upsert(&kite(version, &format!("uuid-{i}")), &value())
                .await
                .unwrap();
        }

        let mut versions: Vec<String> = storage
            .get(&query("~> 1.1"))
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.kite.version)
            .collect();
        versions.sort();
        assert_eq!(versions, ["1.1.0", "1.1.5", "1.2.0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_leases_vanish_even_before_the_sweep() {
        let storage = InMemoryKiteStorage::new(Duration::from_secs(90));
        storage.upsert(&kite("1.1.1", "uuid-1"), &value()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(91)).await;
        assert!(storage.get(&query("")).await.unwrap().is_empty());
        assert!(storage.get(&KiteQuery::by_id("uuid-1")).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_prunes_and_stops_on_cancel() {
        let storage = InMemoryKiteStorage::new(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        storage.start_sweeper(Duration::from_secs(5), cancel.clone());

        storage.upsert(&kite("1.1.1", "uuid-1"), &value()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(16)).await;

        {
            let inner = storage.inner.lock().unwrap();
            assert!(inner.entries.is_empty(), "sweeper removed the expired lease");
            assert!(inner.ids.is_empty());
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn update_then_upsert_is_idempotent() {
        let storage = InMemoryKiteStorage::new(Duration::from_secs(60));
        let k = kite("1.1.1", "uuid-1");

        storage.update(&k, &value()).await.unwrap();
        storage.upsert(&k, &value()).await.unwrap();

        let hits = storage.get(&query("")).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
