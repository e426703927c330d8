use std::sync::Mutex;

use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::SecurityError;

/// An RSA key pair held by the registry. Both halves are PEM strings; the
/// private half signs tokens issued against kites registered under this
/// pair's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub id: String,
    pub public: String,
    pub private: String,
}

impl KeyPair {
    /// Generate a fresh RSA-2048 pair with a uuid id.
    pub fn generate() -> Result<KeyPair, SecurityError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| SecurityError::Signing(format!("rsa generation: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| SecurityError::InvalidPem(e.to_string()))?
            .to_string();
        let public = public_key
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| SecurityError::InvalidPem(e.to_string()))?;

        Ok(KeyPair {
            id: uuid::Uuid::new_v4().to_string(),
            public,
            private,
        })
    }

    /// Check that both halves parse as RSA PEM structures.
    pub fn validate(&self) -> Result<(), SecurityError> {
        RsaPrivateKey::from_pkcs8_pem(&self.private)
            .map_err(|e| SecurityError::InvalidPem(format!("private: {e}")))?;
        RsaPublicKey::from_public_key_pem(&self.public)
            .map_err(|e| SecurityError::InvalidPem(format!("public: {e}")))?;
        Ok(())
    }

    pub fn encoding_key(&self) -> Result<EncodingKey, SecurityError> {
        EncodingKey::from_rsa_pem(self.private.as_bytes())
            .map_err(|e| SecurityError::InvalidPem(format!("private: {e}")))
    }

    pub fn decoding_key(&self) -> Result<DecodingKey, SecurityError> {
        DecodingKey::from_rsa_pem(self.public.as_bytes())
            .map_err(|e| SecurityError::InvalidPem(format!("public: {e}")))
    }
}

/// A retrieval result carrying the logical-deletion signal.
///
/// A deleted pair is still returned and still verifies outstanding
/// artifacts; the flag tells the caller to re-sign against the pair
/// currently in force instead of rejecting.
#[derive(Debug, Clone)]
pub struct KeyLookup {
    pub pair: KeyPair,
    pub deleted: bool,
}

/// The rolling key pair set.
pub trait KeyPairStore: Send + Sync {
    /// Insert a pair; an empty id is auto-generated. The PEM structure is
    /// validated before storage.
    fn add(&self, pair: KeyPair) -> Result<KeyPair, SecurityError>;

    fn get_by_id(&self, id: &str) -> Result<KeyLookup, SecurityError>;

    fn get_by_public(&self, public: &str) -> Result<KeyLookup, SecurityError>;

    /// Soft-delete: the pair keeps validating, retrievals gain the
    /// deletion signal.
    fn delete(&self, id: &str, public: &str) -> Result<(), SecurityError>;

    /// All pairs in insertion order, including deleted ones.
    fn all(&self) -> Vec<KeyPair>;

    /// The most recently added pair that is not deleted.
    fn current(&self) -> Result<KeyPair, SecurityError>;
}

struct StoredPair {
    pair: KeyPair,
    deleted: bool,
}

/// Insertion-ordered in-memory key pair set behind one mutex.
pub struct InMemoryKeyPairStore {
    entries: Mutex<Vec<StoredPair>>,
}

impl InMemoryKeyPairStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryKeyPairStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyPairStore for InMemoryKeyPairStore {
    fn add(&self, mut pair: KeyPair) -> Result<KeyPair, SecurityError> {
        pair.validate()?;
        if pair.id.is_empty() {
            pair.id = uuid::Uuid::new_v4().to_string();
        }
        let mut entries = self.entries.lock().unwrap();
        entries.push(StoredPair {
            pair: pair.clone(),
            deleted: false,
        });
        Ok(pair)
    }

    fn get_by_id(&self, id: &str) -> Result<KeyLookup, SecurityError> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .find(|entry| entry.pair.id == id)
            .map(|entry| KeyLookup {
                pair: entry.pair.clone(),
                deleted: entry.deleted,
            })
            .ok_or(SecurityError::KeyNotFound)
    }

    fn get_by_public(&self, public: &str) -> Result<KeyLookup, SecurityError> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .find(|entry| entry.pair.public == public)
            .map(|entry| KeyLookup {
                pair: entry.pair.clone(),
                deleted: entry.deleted,
            })
            .ok_or(SecurityError::KeyNotFound)
    }

    fn delete(&self, id: &str, public: &str) -> Result<(), SecurityError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.pair.id == id || entry.pair.public == public)
            .ok_or(SecurityError::KeyNotFound)?;
        entry.deleted = true;
        Ok(())
    }

    fn all(&self) -> Vec<KeyPair> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.pair.clone())
            .collect()
    }

    fn current(&self) -> Result<KeyPair, SecurityError> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|entry| !entry.deleted)
            .map(|entry| entry.pair.clone())
            .ok_or(SecurityError::KeyNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_fills_empty_ids_and_validates() {
        let store = InMemoryKeyPairStore::new();
        let mut pair = KeyPair::generate().unwrap();
        pair.id = String::new();
        let stored = store.add(pair).unwrap();
        assert!(!stored.id.is_empty());

        let bogus = KeyPair {
            id: "x".into(),
            public: "not a pem".into(),
            private: "not a pem".into(),
        };
        assert!(matches!(store.add(bogus), Err(SecurityError::InvalidPem(_))));
    }

    #[test]
    fn soft_delete_keeps_the_pair_retrievable() {
        let store = InMemoryKeyPairStore::new();
        let pair = store.add(KeyPair::generate().unwrap()).unwrap();

        store.delete(&pair.id, "").unwrap();

        let by_id = store.get_by_id(&pair.id).unwrap();
        assert!(by_id.deleted);
        assert_eq!(by_id.pair.public, pair.public);

        let by_public = store.get_by_public(&pair.public).unwrap();
        assert!(by_public.deleted);
    }

    #[test]
    fn current_skips_deleted_pairs() {
        let store = InMemoryKeyPairStore::new();
        let first = store.add(KeyPair::generate().unwrap()).unwrap();
        let second = store.add(KeyPair::generate().unwrap()).unwrap();

        assert_eq!(store.current().unwrap().id, second.id);
        store.delete(&second.id, "").unwrap();
        assert_eq!(store.current().unwrap().id, first.id);
    }
}
