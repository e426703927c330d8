//! Key rotation without a flag day: the full lifecycle of a pair from
//! boot through soft deletion, with outstanding kitekeys and tokens
//! staying valid throughout.

use std::time::Duration;

use jsonwebtoken::{decode, Algorithm, Validation};
use kite_security::{
    pick_self_pair, InMemoryKeyPairStore, KeyPair, KeyPairStore, KiteKeyIssuer, SignOptions,
    TokenClaims, TokenIssuer, DEFAULT_TOKEN_LEEWAY, DEFAULT_TOKEN_TTL,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn rolling_a_pair_keeps_outstanding_material_valid() {
    let store = InMemoryKeyPairStore::new();
    let issuer = KiteKeyIssuer::new("kontrol-1", "http://kontrol.example:4000/kite");
    let tokens = TokenIssuer::new(
        DEFAULT_TOKEN_TTL,
        DEFAULT_TOKEN_LEEWAY,
        CancellationToken::new(),
    );

    // Boot pair signs a kitekey and an access token.
    let old = store.add(KeyPair::generate().unwrap()).unwrap();
    let kite_key = issuer.issue(&old, "devrim").unwrap();
    let token = tokens
        .sign(SignOptions {
            audience: "/devrim",
            subject: "caller",
            issuer: "kontrol-1",
            key_pair: &old,
            force: false,
        })
        .unwrap();

    // Rotation: soft-delete the old pair, roll in a fresh one.
    store.delete(&old.id, "").unwrap();
    let fresh = store.add(KeyPair::generate().unwrap()).unwrap();
    assert_eq!(store.current().unwrap().id, fresh.id);

    // The outstanding kitekey still validates; the deletion flag is the
    // signal to hand out replacement material.
    let (claims, lookup) = issuer.validate(&kite_key, &store).unwrap();
    assert_eq!(claims.sub, "devrim");
    assert!(lookup.deleted);

    // The outstanding access token verifies against the old public half
    // until its own exp.
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["/devrim"]);
    let verified =
        decode::<TokenClaims>(&token, &old.decoding_key().unwrap(), &validation).unwrap();
    assert_eq!(verified.claims.sub, "caller");

    // Self-pair selection still finds the deleted signer for the old
    // kitekey, and the fresh pair for a newly minted one.
    assert_eq!(pick_self_pair(&store, &kite_key).unwrap().id, old.id);
    let fresh_kite_key = issuer.issue(&fresh, "devrim").unwrap();
    assert_eq!(pick_self_pair(&store, &fresh_kite_key).unwrap().id, fresh.id);
}

#[tokio::test]
async fn rotation_changes_the_token_cache_key() {
    let store = InMemoryKeyPairStore::new();
    let tokens = TokenIssuer::new(
        Duration::from_secs(3600),
        Duration::from_secs(60),
        CancellationToken::new(),
    );

    let old = store.add(KeyPair::generate().unwrap()).unwrap();
    let first = tokens
        .sign(SignOptions {
            audience: "/devrim",
            subject: "caller",
            issuer: "kontrol-1",
            key_pair: &old,
            force: false,
        })
        .unwrap();

    store.delete(&old.id, "").unwrap();
    let fresh = store.add(KeyPair::generate().unwrap()).unwrap();

    // Same audience, subject, and issuer, but a different key id: the
    // cache must not replay the old signature.
    let second = tokens
        .sign(SignOptions {
            audience: "/devrim",
            subject: "caller",
            issuer: "kontrol-1",
            key_pair: &fresh,
            force: false,
        })
        .unwrap();
    assert_ne!(first, second);

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["/devrim"]);
    let verified = decode::<TokenClaims>(&second, &fresh.decoding_key().unwrap(), &validation);
    assert!(verified.is_ok());
}
