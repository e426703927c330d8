//! The HTTP surface, exercised in-process with oneshot requests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use kite_data::InMemoryKiteStorage;
use kite_protocol::{Authentication, Kite};
use kite_security::{InMemoryKeyPairStore, KeyPair, KeyPairStore};
use kontrol::{KontrolConfig, Registry};
use tower::ServiceExt;

struct Fixture {
    registry: Arc<Registry>,
    keys: Arc<InMemoryKeyPairStore>,
}

fn fixture() -> Fixture {
    let mut config = KontrolConfig::default();
    config.id = "kontrol-test".into();

    let keys = Arc::new(InMemoryKeyPairStore::new());
    keys.add(KeyPair::generate().unwrap()).unwrap();
    let storage = InMemoryKiteStorage::new(config.key_ttl());
    let registry = Arc::new(Registry::new(&config, storage, keys.clone(), None));
    Fixture { registry, keys }
}

fn app(f: &Fixture) -> axum::Router {
    kontrol::http::router(f.registry.clone())
}

fn kitekey_auth(f: &Fixture, username: &str) -> Authentication {
    let pair = f.keys.current().unwrap();
    Authentication {
        auth_type: "kiteKey".into(),
        key: f.registry.kite_keys().issue(&pair, username).unwrap(),
    }
}

fn kite_fixture() -> Kite {
    Kite {
        username: "devrim".into(),
        environment: "prod".into(),
        name: "mathworker".into(),
        version: "1.1.1".into(),
        region: "us-east".into(),
        hostname: "host-a".into(),
        id: "uuid-1".into(),
    }
}

async fn body_string(resp: axum::http::Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn healthz_answers() {
    let f = fixture();
    let resp = app(&f)
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ok");
}

#[tokio::test]
async fn unknown_heartbeats_are_told_to_register_again() {
    let f = fixture();
    let resp = app(&f)
        .oneshot(
            Request::post("/heartbeat?id=unknown-kite")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "registeragain");
}

#[tokio::test]
async fn register_then_heartbeat_pongs() {
    let f = fixture();
    let auth = kitekey_auth(&f, "devrim");

    let body = serde_json::json!({
        "kite": kite_fixture(),
        "url": "http://host-a:6161/kite",
        "auth": { "type": auth.auth_type, "key": auth.key },
    });
    let resp = app(&f)
        .oneshot(
            Request::post("/register")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let reply: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(reply["url"], "http://host-a:6161/kite");
    assert_eq!(reply["heartbeatInterval"], 10);
    assert!(reply.get("kiteKey").is_none(), "no rotation happened");

    let resp = app(&f)
        .oneshot(
            Request::post("/heartbeat?id=uuid-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_string(resp).await, "pong");
}

#[tokio::test]
async fn register_without_a_kite_is_a_bad_request() {
    let f = fixture();
    let resp = app(&f)
        .oneshot(
            Request::post("/register")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"url": "http://host-a:6161/kite"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn register_with_bad_key_material_is_unauthorized() {
    let f = fixture();
    let body = serde_json::json!({
        "kite": kite_fixture(),
        "url": "http://host-a:6161/kite",
        "auth": { "type": "kiteKey", "key": "not-a-jwt" },
    });
    let resp = app(&f)
        .oneshot(
            Request::post("/register")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
