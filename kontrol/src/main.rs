use std::sync::Arc;

use kite_data::{InMemoryKiteStorage, StorageError};
use kite_security::{
    InMemoryKeyPairStore, KeyPair, KeyPairStore, MachineAuthenticator, SharedTokenAuthenticator,
};
use kontrol::{Backend, KontrolConfig, KontrolError, Registry};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = KontrolConfig::load()?;
    tracing::info!(id = %config.id, port = config.port, backend = %config.storage.backend, "starting kontrol");

    let keys = Arc::new(InMemoryKeyPairStore::new());
    let boot_pair = match (&config.public_key_file, &config.private_key_file) {
        (Some(public_file), Some(private_file)) => KeyPair {
            id: String::new(),
            public: std::fs::read_to_string(public_file)?,
            private: std::fs::read_to_string(private_file)?,
        },
        _ => KeyPair::generate()?,
    };
    let initial = keys.add(boot_pair)?;
    tracing::info!(key_id = %initial.id, "signing key pair ready");

    if let Some(kite_key) = &config.kite_key {
        let self_pair = kite_security::pick_self_pair(keys.as_ref(), kite_key)?;
        tracing::info!(key_id = %self_pair.id, "own kitekey verified against stored pair");
    }

    let machine_auth: Option<Arc<dyn MachineAuthenticator>> = config
        .machine_auth_token
        .clone()
        .map(|token| Arc::new(SharedTokenAuthenticator::new(token)) as Arc<dyn MachineAuthenticator>);

    let registry;
    match config.backend()? {
        Backend::InMemory => {
            let storage = InMemoryKiteStorage::new(config.key_ttl());
            registry = Arc::new(Registry::new(
                &config,
                storage.clone(),
                keys.clone(),
                machine_auth,
            ));
            storage.start_sweeper(config.key_ttl(), registry.cancellation());
        }
        Backend::Postgres | Backend::Crate => {
            let storage = Arc::new(
                kite_data_sqlx::SqlxKiteStorage::connect(&config.storage.dsn, config.key_ttl())
                    .await?,
            );
            registry = Arc::new(Registry::new(
                &config,
                storage.clone(),
                keys.clone(),
                machine_auth,
            ));
            storage.start_cleaner(config.key_ttl(), registry.cancellation());
        }
        Backend::Etcd => {
            return Err(Box::new(KontrolError::Storage(StorageError::Unsupported(
                "etcd".into(),
            ))) as Box<dyn std::error::Error>);
        }
    }

    let app = kontrol::http::router(registry.clone());
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "kontrol listening");

    let shutdown_registry = registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            shutdown_registry.shutdown();
        })
        .await?;

    registry.shutdown();
    Ok(())
}
