use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, Header};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::SecurityError;
use crate::keys::KeyPair;

/// Default lifetime of an access token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(48 * 60 * 60);
/// Default clock-skew allowance applied around `iat`/`exp`.
pub const DEFAULT_TOKEN_LEEWAY: Duration = Duration::from_secs(5 * 60);

/// Claims of an issued access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    /// The audience path: a prefix of the canonical kite key space.
    pub aud: String,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub exp: i64,
    pub jti: String,
}

/// One signing request.
pub struct SignOptions<'a> {
    pub audience: &'a str,
    pub subject: &'a str,
    pub issuer: &'a str,
    pub key_pair: &'a KeyPair,
    /// Bypass the cache and mint a fresh token.
    pub force: bool,
}

/// Signs RS256 tokens and caches them per `audience|subject|issuer|keyId`.
///
/// A cache hit returns the identical signed string until the entry is
/// evicted at `ttl − leeway` or the caller forces a renewal. Eviction
/// timers share the issuer's cancellation token and stop with it.
pub struct TokenIssuer {
    ttl: Duration,
    leeway: Duration,
    suppress_nbf: bool,
    cache: Arc<Mutex<HashMap<String, String>>>,
    cancel: CancellationToken,
}

impl TokenIssuer {
    pub fn new(ttl: Duration, leeway: Duration, cancel: CancellationToken) -> Self {
        Self {
            ttl,
            leeway,
            suppress_nbf: false,
            cache: Arc::new(Mutex::new(HashMap::new())),
            cancel,
        }
    }

    /// Omit the `nbf` claim from issued tokens.
    pub fn suppress_nbf(mut self, yes: bool) -> Self {
        self.suppress_nbf = yes;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign (or return the cached) token for the given tuple.
    pub fn sign(&self, opts: SignOptions<'_>) -> Result<String, SecurityError> {
        let cache_key = format!(
            "{}|{}|{}|{}",
            opts.audience, opts.subject, opts.issuer, opts.key_pair.id
        );

        if !opts.force {
            if let Some(cached) = self.cache.lock().unwrap().get(&cache_key) {
                return Ok(cached.clone());
            }
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SecurityError::Signing(format!("system clock error: {e}")))?
            .as_secs() as i64;
        let leeway = self.leeway.as_secs() as i64;
        let ttl = self.ttl.as_secs() as i64;

        let claims = TokenClaims {
            iss: opts.issuer.to_string(),
            sub: opts.subject.to_string(),
            aud: opts.audience.to_string(),
            iat: now - leeway,
            nbf: (!self.suppress_nbf).then_some(now - leeway),
            exp: now + ttl + leeway,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(opts.key_pair.id.clone());

        let signed = encode(&header, &claims, &opts.key_pair.encoding_key()?)
            .map_err(|e| SecurityError::Signing(e.to_string()))?;

        self.cache
            .lock()
            .unwrap()
            .insert(cache_key.clone(), signed.clone());
        self.schedule_eviction(cache_key);

        Ok(signed)
    }

    fn schedule_eviction(&self, cache_key: String) {
        let after = self.ttl.saturating_sub(self.leeway);
        let cache = self.cache.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    cache.lock().unwrap().remove(&cache_key);
                    tracing::debug!(key = %cache_key, "token cache entry evicted");
                }
                _ = cancel.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    fn validation(audience: &str) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation
    }

    fn issuer(ttl: Duration, leeway: Duration) -> TokenIssuer {
        TokenIssuer::new(ttl, leeway, CancellationToken::new())
    }

    #[tokio::test]
    async fn identical_tuples_share_the_signed_string() {
        let pair = KeyPair::generate().unwrap();
        let issuer = issuer(DEFAULT_TOKEN_TTL, DEFAULT_TOKEN_LEEWAY);

        let opts = || SignOptions {
            audience: "/devrim",
            subject: "caller",
            issuer: "kontrol-1",
            key_pair: &pair,
            force: false,
        };
        let first = issuer.sign(opts()).unwrap();
        let second = issuer.sign(opts()).unwrap();
        assert_eq!(first, second);

        let forced = issuer
            .sign(SignOptions {
                force: true,
                ..opts()
            })
            .unwrap();
        assert_ne!(first, forced, "forced renewal mints a fresh jti");
    }

    #[tokio::test]
    async fn lifetime_honors_ttl_and_leeway() {
        let pair = KeyPair::generate().unwrap();
        let ttl = Duration::from_secs(3600);
        let leeway = Duration::from_secs(60);
        let issuer = issuer(ttl, leeway);

        let signed = issuer
            .sign(SignOptions {
                audience: "/devrim/prod",
                subject: "caller",
                issuer: "kontrol-1",
                key_pair: &pair,
                force: false,
            })
            .unwrap();

        let data = decode::<TokenClaims>(
            &signed,
            &pair.decoding_key().unwrap(),
            &validation("/devrim/prod"),
        )
        .unwrap();

        let claims = data.claims;
        assert!(claims.exp - claims.iat >= (ttl.as_secs() as i64) - (leeway.as_secs() as i64));
        assert_eq!(claims.exp - claims.iat, (ttl.as_secs() + 2 * leeway.as_secs()) as i64);
        assert_eq!(claims.aud, "/devrim/prod");
        assert_eq!(claims.nbf, Some(claims.iat));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_evict_at_ttl_minus_leeway() {
        let pair = KeyPair::generate().unwrap();
        let issuer = issuer(Duration::from_secs(100), Duration::from_secs(10));

        let opts = || SignOptions {
            audience: "/a",
            subject: "s",
            issuer: "i",
            key_pair: &pair,
            force: false,
        };
        let first = issuer.sign(opts()).unwrap();

        tokio::time::sleep(Duration::from_secs(91)).await;
        tokio::task::yield_now().await;

        let second = issuer.sign(opts()).unwrap();
        assert_ne!(first, second, "cache entry evicted at ttl - leeway");
    }

    #[tokio::test]
    async fn nbf_is_suppressible() {
        let pair = KeyPair::generate().unwrap();
        let issuer = issuer(DEFAULT_TOKEN_TTL, DEFAULT_TOKEN_LEEWAY).suppress_nbf(true);
        let signed = issuer
            .sign(SignOptions {
                audience: "/a",
                subject: "s",
                issuer: "i",
                key_pair: &pair,
                force: false,
            })
            .unwrap();

        let mut validation = validation("/a");
        validation.validate_nbf = false;
        let data =
            decode::<TokenClaims>(&signed, &pair.decoding_key().unwrap(), &validation).unwrap();
        assert!(data.claims.nbf.is_none());
    }
}
