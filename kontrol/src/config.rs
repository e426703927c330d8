use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KontrolError;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    InMemory,
    Postgres,
    /// CrateDB; shares the SQL backend over the pg wire protocol.
    Crate,
    Etcd,
}

impl Backend {
    pub fn parse(name: &str) -> Result<Backend, KontrolError> {
        match name {
            "in-memory" => Ok(Backend::InMemory),
            "postgres" => Ok(Backend::Postgres),
            "crate" => Ok(Backend::Crate),
            "etcd" => Ok(Backend::Etcd),
            other => Err(KontrolError::Config(format!(
                "unknown storage backend '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: String,
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "in-memory".into(),
            dsn: String::new(),
        }
    }
}

/// Registry configuration: `kontrol.yaml` overlaid with `KONTROL_*`
/// environment variables. Timing fields are seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KontrolConfig {
    /// Registry id, used as the token issuer. Generated when empty.
    pub id: String,
    pub port: u16,
    /// Publicly reachable URL, embedded in issued kitekeys.
    pub url: String,
    pub storage: StorageConfig,
    /// Pre-shared token accepted by `registerMachine`; machine
    /// registration is disabled when unset.
    pub machine_auth_token: Option<String>,
    /// PEM files holding the signing pair. Both set: the pair is loaded
    /// at boot; otherwise a fresh pair is generated.
    pub public_key_file: Option<String>,
    pub private_key_file: Option<String>,
    /// The process's own kitekey. When set, boot verifies it against the
    /// stored key pairs by trial in reverse insertion order and fails
    /// fast if none signed it.
    pub kite_key: Option<String>,
    pub heartbeat_interval: u64,
    pub heartbeat_delay: u64,
    pub update_interval: u64,
    pub key_ttl: u64,
    pub token_ttl: u64,
    pub token_leeway: u64,
}

impl Default for KontrolConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            port: 4000,
            url: "http://localhost:4000/kite".into(),
            storage: StorageConfig::default(),
            machine_auth_token: None,
            public_key_file: None,
            private_key_file: None,
            kite_key: None,
            heartbeat_interval: 10,
            heartbeat_delay: 20,
            update_interval: 60,
            key_ttl: 90,
            token_ttl: 48 * 60 * 60,
            token_leeway: 5 * 60,
        }
    }
}

impl KontrolConfig {
    /// Load from `kontrol.yaml` (or `$KONTROL_CONFIG`), then overlay
    /// environment variables. A missing file yields the defaults.
    pub fn load() -> Result<KontrolConfig, KontrolError> {
        let path = std::env::var("KONTROL_CONFIG").unwrap_or_else(|_| "kontrol.yaml".into());
        let mut config = if Path::new(&path).exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| KontrolError::Config(format!("reading {path}: {e}")))?;
            serde_yaml::from_str(&raw)
                .map_err(|e| KontrolError::Config(format!("parsing {path}: {e}")))?
        } else {
            KontrolConfig::default()
        };
        config.overlay_env()?;
        if config.id.is_empty() {
            config.id = uuid::Uuid::new_v4().to_string();
        }
        Ok(config)
    }

    fn overlay_env(&mut self) -> Result<(), KontrolError> {
        if let Ok(port) = std::env::var("KONTROL_PORT") {
            self.port = port
                .parse()
                .map_err(|_| KontrolError::Config(format!("bad KONTROL_PORT '{port}'")))?;
        }
        if let Ok(url) = std::env::var("KONTROL_URL") {
            self.url = url;
        }
        if let Ok(backend) = std::env::var("KONTROL_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
        if let Ok(dsn) = std::env::var("KONTROL_STORAGE_DSN") {
            self.storage.dsn = dsn;
        }
        if let Ok(token) = std::env::var("KONTROL_MACHINE_AUTH_TOKEN") {
            self.machine_auth_token = Some(token);
        }
        if let Ok(path) = std::env::var("KONTROL_PUBLIC_KEY_FILE") {
            self.public_key_file = Some(path);
        }
        if let Ok(path) = std::env::var("KONTROL_PRIVATE_KEY_FILE") {
            self.private_key_file = Some(path);
        }
        if let Ok(kite_key) = std::env::var("KONTROL_KITE_KEY") {
            self.kite_key = Some(kite_key);
        }
        Ok(())
    }

    pub fn backend(&self) -> Result<Backend, KontrolError> {
        Backend::parse(&self.storage.backend)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    pub fn heartbeat_delay(&self) -> Duration {
        Duration::from_secs(self.heartbeat_delay)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    pub fn key_ttl(&self) -> Duration {
        Duration::from_secs(self.key_ttl)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl)
    }

    pub fn token_leeway(&self) -> Duration {
        Duration::from_secs(self.token_leeway)
    }
}
