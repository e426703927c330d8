use std::sync::Arc;
use std::time::Duration;

use kite_data::KiteStorage;
use kite_protocol::{
    Authentication, GetKitesResult, Kite, KiteQuery, KiteWithToken, RegisterMachineArgs,
    RegisterResult, RegisterValue,
};
use kite_security::{
    KeyLookup, KeyPairStore, KiteKeyClaims, KiteKeyIssuer, MachineAuthenticator, SecurityError,
    SignOptions, TokenIssuer,
};
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

use crate::config::KontrolConfig;
use crate::error::KontrolError;
use crate::heartbeat::{HeartbeatSupervisor, UpdateFn};

/// The registry core: storage, key material, token issuing, and heartbeat
/// supervision behind the five registry operations.
pub struct Registry {
    id: String,
    storage: Arc<dyn KiteStorage>,
    keys: Arc<dyn KeyPairStore>,
    tokens: TokenIssuer,
    kitekeys: KiteKeyIssuer,
    machine_auth: Option<Arc<dyn MachineAuthenticator>>,
    heartbeats: HeartbeatSupervisor,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
}

impl Registry {
    pub fn new(
        config: &KontrolConfig,
        storage: Arc<dyn KiteStorage>,
        keys: Arc<dyn KeyPairStore>,
        machine_auth: Option<Arc<dyn MachineAuthenticator>>,
    ) -> Registry {
        let cancel = CancellationToken::new();
        Registry {
            id: config.id.clone(),
            storage,
            keys,
            tokens: TokenIssuer::new(config.token_ttl(), config.token_leeway(), cancel.clone()),
            kitekeys: KiteKeyIssuer::new(config.id.clone(), config.url.clone()),
            machine_auth,
            heartbeats: HeartbeatSupervisor::new(
                config.heartbeat_interval(),
                config.heartbeat_delay(),
                config.update_interval(),
                cancel.clone(),
            ),
            heartbeat_interval: config.heartbeat_interval(),
            cancel,
        }
    }

    pub fn heartbeats(&self) -> &HeartbeatSupervisor {
        &self.heartbeats
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// The root shutdown token: supervisors, token eviction, and sweepers
    /// all listen on it.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn key_store(&self) -> &dyn KeyPairStore {
        self.keys.as_ref()
    }

    pub fn kite_keys(&self) -> &KiteKeyIssuer {
        &self.kitekeys
    }

    /// Validate a presented kitekey and recover the caller's claims plus
    /// the key pair that signed it (with the deletion signal).
    pub fn authenticate(
        &self,
        auth: Option<&Authentication>,
    ) -> Result<(KiteKeyClaims, KeyLookup), KontrolError> {
        let auth = auth.ok_or_else(|| {
            KontrolError::Auth(SecurityError::AuthRejected(
                "no authentication presented".into(),
            ))
        })?;
        if auth.auth_type != "kiteKey" {
            return Err(KontrolError::Auth(SecurityError::AuthRejected(format!(
                "unsupported auth type '{}'",
                auth.auth_type
            ))));
        }
        self.kitekeys
            .validate(&auth.key, self.keys.as_ref())
            .map_err(KontrolError::Auth)
    }

    /// Register a kite and arm its heartbeat supervision.
    ///
    /// A caller presenting a now-deleted key pair is not rejected: the
    /// registration is signed against the pair currently in force and the
    /// reply carries the fresh kitekey and public key so the client can
    /// overwrite its material atomically.
    pub async fn register(
        &self,
        kite: &Kite,
        url: &str,
        auth: Option<&Authentication>,
    ) -> Result<RegisterResult, KontrolError> {
        kite.validate()?;
        let (claims, lookup) = self.authenticate(auth)?;
        if claims.sub != kite.username {
            return Err(KontrolError::Auth(SecurityError::AuthRejected(format!(
                "kitekey subject '{}' may not register as '{}'",
                claims.sub, kite.username
            ))));
        }

        let (key_id, kite_key, public_key) = if lookup.deleted {
            let current = self.keys.current().map_err(KontrolError::Auth)?;
            let fresh = self
                .kitekeys
                .issue(&current, &claims.sub)
                .map_err(KontrolError::Auth)?;
            tracing::info!(kite = %kite.key(), "rotating caller onto the current key pair");
            (current.id.clone(), Some(fresh), Some(current.public))
        } else {
            (lookup.pair.id, None, None)
        };

        let value = RegisterValue {
            url: url.to_string(),
            key_id,
        };
        self.storage.upsert(kite, &value).await?;
        self.heartbeats.arm(&kite.id, self.lease_renewal(kite, &value));
        tracing::info!(kite = %kite.key(), url, "kite registered");

        Ok(RegisterResult {
            url: url.to_string(),
            kite_key,
            public_key,
            heartbeat_interval: self.heartbeat_interval.as_secs(),
        })
    }

    fn lease_renewal(&self, kite: &Kite, value: &RegisterValue) -> UpdateFn {
        let storage = self.storage.clone();
        let kite = kite.clone();
        let value = value.clone();
        Arc::new(move || {
            let storage = storage.clone();
            let kite = kite.clone();
            let value = value.clone();
            Box::pin(async move { storage.update(&kite, &value).await })
        })
    }

    /// Discovery: prefix match plus constraint filtering, shuffled
    /// results, one freshly issued token per kite for the querying
    /// caller.
    pub async fn get_kites(
        &self,
        query: &KiteQuery,
        caller_username: &str,
    ) -> Result<GetKitesResult, KontrolError> {
        let mut records = self.storage.get(query).await?;
        records.shuffle(&mut rand::thread_rng());

        let mut kites = Vec::with_capacity(records.len());
        for record in records {
            let token = self.token_for(query, &record.kite, &record.value.key_id, caller_username);
            kites.push(KiteWithToken {
                kite: record.kite,
                url: record.value.url,
                token,
                key_id: Some(record.value.key_id),
            });
        }
        Ok(GetKitesResult { kites })
    }

    fn token_for(
        &self,
        query: &KiteQuery,
        kite: &Kite,
        key_id: &str,
        caller_username: &str,
    ) -> Option<String> {
        let audience = audience_for(query, kite);
        let lookup = self.keys.get_by_id(key_id).ok()?;
        self.tokens
            .sign(SignOptions {
                audience: &audience,
                subject: caller_username,
                issuer: &self.id,
                key_pair: &lookup.pair,
                force: false,
            })
            .map_err(|err| {
                tracing::warn!(kite = %kite.key(), error = %err, "token signing failed");
                err
            })
            .ok()
    }

    /// Issue a token for the single kite a query resolves to.
    pub async fn get_token(
        &self,
        query: &KiteQuery,
        caller_username: &str,
    ) -> Result<String, KontrolError> {
        let records = self.storage.get(query).await?;
        if records.len() > 1 {
            return Err(KontrolError::TooManyKites(records.len()));
        }
        let Some(record) = records.into_iter().next() else {
            return Err(KontrolError::KiteNotFound);
        };

        let audience = audience_for(query, &record.kite);
        let lookup = self
            .keys
            .get_by_id(&record.value.key_id)
            .map_err(KontrolError::Auth)?;
        self.tokens
            .sign(SignOptions {
                audience: &audience,
                subject: caller_username,
                issuer: &self.id,
                key_pair: &lookup.pair,
                force: false,
            })
            .map_err(KontrolError::Auth)
    }

    /// The public key currently in force for the caller. A deleted
    /// presented key yields the replacement.
    pub fn get_key(&self, auth: Option<&Authentication>) -> Result<String, KontrolError> {
        let (_, lookup) = self.authenticate(auth)?;
        if lookup.deleted {
            Ok(self.keys.current().map_err(KontrolError::Auth)?.public)
        } else {
            Ok(lookup.pair.public)
        }
    }

    /// Issue a kitekey for a machine with no prior identity, through the
    /// pluggable authentication hook.
    pub fn register_machine(&self, args: &RegisterMachineArgs) -> Result<String, KontrolError> {
        let authenticator = self.machine_auth.as_ref().ok_or_else(|| {
            KontrolError::Auth(SecurityError::AuthRejected(
                "machine registration is disabled".into(),
            ))
        })?;
        authenticator
            .authenticate(&args.auth_type, &args.key, &args.username)
            .map_err(KontrolError::Auth)?;

        let pair = self.keys.current().map_err(KontrolError::Auth)?;
        self.kitekeys
            .issue(&pair, &args.username)
            .map_err(KontrolError::Auth)
    }
}

/// The token audience a query encodes; an id-only query falls back to the
/// matched kite's username prefix.
fn audience_for(query: &KiteQuery, kite: &Kite) -> String {
    query
        .audience()
        .unwrap_or_else(|_| format!("/{}", kite.username))
}
