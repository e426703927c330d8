//! Security primitives for the registry: a rolling set of RSA signing key
//! pairs (rotation without a flag day), an RS256 token issuer with a
//! per-audience cache, and the kitekey machine identity document.

pub mod error;
pub mod keys;
pub mod kitekey;
pub mod token;

pub use error::SecurityError;
pub use keys::{InMemoryKeyPairStore, KeyLookup, KeyPair, KeyPairStore};
pub use kitekey::{
    pick_self_pair, KiteKeyClaims, KiteKeyIssuer, MachineAuthenticator, SharedTokenAuthenticator,
};
pub use token::{SignOptions, TokenClaims, TokenIssuer, DEFAULT_TOKEN_LEEWAY, DEFAULT_TOKEN_TTL};
