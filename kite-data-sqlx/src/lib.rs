//! SQL kite storage: a single `kites` table with a tree-path column.
//!
//! Works against Postgres and CrateDB (which speaks the pg wire protocol).
//! Rows carry an epoch-seconds `updated_at`; the cleaner loop enforces the
//! key TTL, and queries filter on it so an expired lease is never returned
//! between cleaner passes.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use kite_data::{KiteRecord, StorageError};
use kite_protocol::{Kite, KiteQuery, RegisterValue};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kites (
    path TEXT PRIMARY KEY,
    id TEXT NOT NULL,
    kite TEXT NOT NULL,
    url TEXT NOT NULL,
    key_id TEXT NOT NULL,
    updated_at BIGINT NOT NULL
)";

pub struct SqlxKiteStorage {
    pool: PgPool,
    ttl: Duration,
}

impl SqlxKiteStorage {
    /// Connect and ensure the schema exists.
    pub async fn connect(dsn: &str, ttl: Duration) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(dsn)
            .await
            .map_err(StorageError::backend)?;
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(StorageError::backend)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS kites_id_idx ON kites (id)")
            .execute(&pool)
            .await
            .map_err(StorageError::backend)?;
        Ok(Self { pool, ttl })
    }

    fn now_epoch() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn cutoff(&self) -> i64 {
        Self::now_epoch() - self.ttl.as_secs() as i64
    }

    async fn write(&self, kite: &Kite, value: &RegisterValue) -> Result<(), StorageError> {
        let kite_json = serde_json::to_string(kite)
            .map_err(|e| StorageError::Backend(Box::new(e)))?;
        sqlx::query(
            "INSERT INTO kites (path, id, kite, url, key_id, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (path) DO UPDATE
             SET url = $4, key_id = $5, updated_at = $6",
        )
        .bind(kite.key())
        .bind(&kite.id)
        .bind(kite_json)
        .bind(&value.url)
        .bind(&value.key_id)
        .bind(Self::now_epoch())
        .execute(&self.pool)
        .await
        .map_err(StorageError::backend)?;
        Ok(())
    }

    /// Delete rows whose lease lapsed. Returns the number removed.
    pub async fn clean(&self) -> Result<u64, StorageError> {
        let deleted = sqlx::query("DELETE FROM kites WHERE updated_at < $1")
            .bind(self.cutoff())
            .execute(&self.pool)
            .await
            .map_err(StorageError::backend)?
            .rows_affected();
        if deleted > 0 {
            tracing::debug!(deleted, "cleaned expired kite rows");
        }
        Ok(deleted)
    }

    /// Run the cleaner until the token is cancelled.
    pub fn start_cleaner(&self, interval: Duration, cancel: CancellationToken) {
        let storage = Self {
            pool: self.pool.clone(),
            ttl: self.ttl,
        };
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let Err(err) = storage.clean().await {
                            tracing::warn!(error = %err, "kite cleaner pass failed");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<KiteRecord, StorageError> {
        let kite_json: String = row.get("kite");
        let kite: Kite = serde_json::from_str(&kite_json)
            .map_err(|e| StorageError::Backend(Box::new(e)))?;
        Ok(KiteRecord {
            kite,
            value: RegisterValue {
                url: row.get("url"),
                key_id: row.get("key_id"),
            },
        })
    }
}

#[async_trait]
impl kite_data::KiteStorage for SqlxKiteStorage {
    async fn upsert(&self, kite: &Kite, value: &RegisterValue) -> Result<(), StorageError> {
        self.write(kite, value).await
    }

    async fn update(&self, kite: &Kite, value: &RegisterValue) -> Result<(), StorageError> {
        // Same write as upsert: both renew the lease, and the pair is
        // idempotent on the (kite, value) tuple.
        self.write(kite, value).await
    }

    async fn delete(&self, kite: &Kite) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kites WHERE path = $1")
            .bind(kite.key())
            .execute(&self.pool)
            .await
            .map_err(StorageError::backend)?;
        Ok(())
    }

    async fn get(&self, query: &KiteQuery) -> Result<Vec<KiteRecord>, StorageError> {
        if query.is_id_only() {
            let rows = sqlx::query(
                "SELECT kite, url, key_id FROM kites WHERE id = $1 AND updated_at >= $2",
            )
            .bind(&query.id)
            .bind(self.cutoff())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::backend)?;
            return rows.iter().map(Self::record_from_row).collect();
        }

        let prefix = query.prefix()?;
        let rows = sqlx::query(
            "SELECT kite, url, key_id FROM kites
             WHERE (path = $1 OR path LIKE $2) AND updated_at >= $3",
        )
        .bind(&prefix.path)
        .bind(like_pattern(&prefix.path))
        .bind(self.cutoff())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::backend)?;

        let records: Result<Vec<KiteRecord>, StorageError> =
            rows.iter().map(Self::record_from_row).collect();
        Ok(records?
            .into_iter()
            .filter(|record| prefix.admits(&record.kite))
            .collect())
    }
}

/// Segment-aligned LIKE pattern for a prefix path, with LIKE wildcards in
/// the prefix escaped.
fn like_pattern(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}/%")
}
