use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::SecurityError;
use crate::keys::{KeyLookup, KeyPair, KeyPairStore};

/// Claims of a kitekey: the long-lived signed identity document proving a
/// machine's claim to a username. Carries the issuing registry's public
/// key so the machine can later verify tokens minted against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiteKeyClaims {
    /// Issuing registry id.
    pub iss: String,
    /// The username the machine is entitled to.
    pub sub: String,
    pub iat: i64,
    pub jti: String,
    #[serde(rename = "kontrolURL")]
    pub kontrol_url: String,
    #[serde(rename = "kontrolKey")]
    pub kontrol_key: String,
}

/// Permissive validation: kitekeys have no expiry and no audience.
fn kitekey_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = Default::default();
    validation
}

/// Issues and validates kitekeys against a key pair store.
pub struct KiteKeyIssuer {
    /// Registry id used as `iss`.
    pub issuer: String,
    /// URL the machine should register back to.
    pub kontrol_url: String,
}

impl KiteKeyIssuer {
    pub fn new(issuer: impl Into<String>, kontrol_url: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            kontrol_url: kontrol_url.into(),
        }
    }

    /// Sign a kitekey for `username` with the given pair.
    pub fn issue(&self, pair: &KeyPair, username: &str) -> Result<String, SecurityError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SecurityError::Signing(format!("system clock error: {e}")))?
            .as_secs() as i64;

        let claims = KiteKeyClaims {
            iss: self.issuer.clone(),
            sub: username.to_string(),
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            kontrol_url: self.kontrol_url.clone(),
            kontrol_key: pair.public.clone(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(pair.id.clone());

        encode(&header, &claims, &pair.encoding_key()?)
            .map_err(|e| SecurityError::Signing(e.to_string()))
    }

    /// Verify a presented kitekey against the store.
    ///
    /// The embedded `kontrolKey` claim selects the pair; a logically
    /// deleted pair still verifies, and the lookup's deletion flag tells
    /// the registry to hand the caller fresh key material.
    pub fn validate(
        &self,
        token: &str,
        store: &dyn KeyPairStore,
    ) -> Result<(KiteKeyClaims, KeyLookup), SecurityError> {
        let unverified = peek_claims(token)?;
        let lookup = store
            .get_by_public(&unverified.kontrol_key)
            .map_err(|_| SecurityError::NoMatchingKey)?;

        let data = decode::<KiteKeyClaims>(
            token,
            &lookup.pair.decoding_key()?,
            &kitekey_validation(),
        )
        .map_err(|e| SecurityError::Verification(e.to_string()))?;

        Ok((data.claims, lookup))
    }
}

/// Read the claims without verifying the signature, to find out which
/// stored pair to verify against.
fn peek_claims(token: &str) -> Result<KiteKeyClaims, SecurityError> {
    let unreadable = || SecurityError::Verification("unreadable kitekey".into());
    let payload = token.split('.').nth(1).ok_or_else(unreadable)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| unreadable())?;
    serde_json::from_slice(&bytes).map_err(|_| unreadable())
}

/// Identify which stored pair signed the process's own kitekey: trial
/// verification in reverse insertion order, first match wins. The result
/// is what the registry signs its own registration records with.
pub fn pick_self_pair(
    store: &dyn KeyPairStore,
    kite_key: &str,
) -> Result<KeyPair, SecurityError> {
    let validation = kitekey_validation();
    for pair in store.all().iter().rev() {
        let Ok(decoding_key) = pair.decoding_key() else {
            continue;
        };
        if decode::<KiteKeyClaims>(kite_key, &decoding_key, &validation).is_ok() {
            return Ok(pair.clone());
        }
    }
    Err(SecurityError::NoMatchingKey)
}

/// Pluggable hook deciding whether a machine may register under a
/// username.
pub trait MachineAuthenticator: Send + Sync {
    fn authenticate(
        &self,
        auth_type: &str,
        key: &str,
        username: &str,
    ) -> Result<(), SecurityError>;
}

/// Accepts callers presenting a pre-shared token.
pub struct SharedTokenAuthenticator {
    token: String,
}

impl SharedTokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl MachineAuthenticator for SharedTokenAuthenticator {
    fn authenticate(
        &self,
        auth_type: &str,
        key: &str,
        _username: &str,
    ) -> Result<(), SecurityError> {
        if auth_type != "token" {
            return Err(SecurityError::AuthRejected(format!(
                "unsupported auth type '{auth_type}'"
            )));
        }
        if key != self.token {
            return Err(SecurityError::AuthRejected("bad machine token".into()));
        }
        Ok(())
    }
}
