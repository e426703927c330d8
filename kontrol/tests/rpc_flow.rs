//! The full registration dance over the RPC dialect: a kite client and
//! the registry wired through the in-process pipe.

use std::sync::Arc;
use std::time::Duration;

use kite_core::{pipe, Client, Request};
use kite_data::InMemoryKiteStorage;
use kite_dnode::{CallValue, Function};
use kite_protocol::{
    Authentication, GetKitesResult, Kite, KiteQuery, RegisterArgs, RegisterResult,
};
use kite_security::{
    InMemoryKeyPairStore, KeyPair, KeyPairStore, MachineAuthenticator, SharedTokenAuthenticator,
};
use kontrol::{KontrolConfig, Registry};
use tokio::sync::mpsc;

const CALL_TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

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

fn registry() -> Arc<Registry> {
    let mut config = KontrolConfig::default();
    config.id = "kontrol-test".into();
    config.machine_auth_token = Some("secret".into());

    let keys = Arc::new(InMemoryKeyPairStore::new());
    keys.add(KeyPair::generate().unwrap()).unwrap();
    let storage = InMemoryKiteStorage::new(config.key_ttl());
    let machine_auth: Option<Arc<dyn MachineAuthenticator>> =
        Some(Arc::new(SharedTokenAuthenticator::new("secret")));
    Arc::new(Registry::new(&config, storage, keys, machine_auth))
}

#[tokio::test]
async fn registration_dance() {
    let registry = registry();

    // Kontrol's side of the connection.
    let kontrol_client = Client::new();
    kontrol::rpc::attach_methods(&kontrol_client, registry.clone());

    // The kite's side: announces its identity, handles `heartbeat`.
    let kite_client = Client::builder().identity(kite_fixture()).build();
    let (hb_tx, mut hb_rx) = mpsc::unbounded_channel::<(f64, Function)>();
    kite_client.method("heartbeat", move |req: Request| {
        let hb_tx = hb_tx.clone();
        async move {
            let items = req.args.must_slice_of(2);
            let _ = hb_tx.send((items[0].must_float64(), items[1].must_function()));
            Ok(CallValue::Null)
        }
    });

    let (ta, tb) = pipe();
    {
        let kontrol_client = kontrol_client.clone();
        tokio::spawn(async move { kontrol_client.run(ta).await });
    }
    {
        let kite_client = kite_client.clone();
        tokio::spawn(async move { kite_client.run(tb).await });
    }

    // 1. A machine with no identity obtains a kitekey.
    let machine_args = serde_json::json!({
        "authType": "token",
        "key": "secret",
        "username": "devrim",
    });
    let kite_key = kite_client
        .call(
            "registerMachine",
            (CallValue::from(machine_args),),
            CALL_TIMEOUT,
        )
        .await
        .unwrap()
        .must_string();
    assert_eq!(kite_key.split('.').count(), 3);

    // 2. Register, authenticated by the kitekey.
    kite_client.set_auth(Some(Authentication {
        auth_type: "kiteKey".into(),
        key: kite_key,
    }));
    let register_args = RegisterArgs {
        url: "http://host-a:6161/kite".into(),
        kite: None,
        auth: None,
    };
    let reply: RegisterResult = kite_client
        .call(
            "register",
            (CallValue::from_serialize(&register_args).unwrap(),),
            CALL_TIMEOUT,
        )
        .await
        .unwrap()
        .to()
        .unwrap();
    assert_eq!(reply.url, "http://host-a:6161/kite");
    assert_eq!(reply.heartbeat_interval, 10);

    // 3. Kontrol asked us to heartbeat, passing the ping callback.
    let (interval, ping) = tokio::time::timeout(Duration::from_secs(5), hb_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(interval, 10.0);
    assert!(registry.heartbeats().is_supervised("uuid-1"));
    ping.call(()).unwrap();

    // 4. Discovery finds the registered kite, with a token.
    let query = KiteQuery {
        username: "devrim".into(),
        environment: "prod".into(),
        name: "mathworker".into(),
        version: "~> 1.1".into(),
        ..KiteQuery::default()
    };
    let get_kites_args = serde_json::json!({ "query": query });
    let found: GetKitesResult = kite_client
        .call(
            "getKites",
            (CallValue::from(get_kites_args),),
            CALL_TIMEOUT,
        )
        .await
        .unwrap()
        .to()
        .unwrap();
    assert_eq!(found.kites.len(), 1);
    assert_eq!(found.kites[0].url, "http://host-a:6161/kite");
    assert!(found.kites[0].token.is_some());

    // 5. getToken resolves the same single kite.
    let token = kite_client
        .call(
            "getToken",
            (CallValue::from_serialize(&query).unwrap(),),
            CALL_TIMEOUT,
        )
        .await
        .unwrap()
        .must_string();
    assert_eq!(token.split('.').count(), 3);

    // 6. getKey returns the public half currently in force.
    let public = kite_client
        .call("getKey", (), CALL_TIMEOUT)
        .await
        .unwrap()
        .must_string();
    assert!(public.contains("BEGIN PUBLIC KEY"));

    kontrol_client.close();
    kite_client.close();
}
