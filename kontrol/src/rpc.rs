use std::sync::Arc;

use kite_core::{Client, Request, RpcError};
use kite_dnode::{CallValue, Function, Partial};
use kite_protocol::{KiteQuery, RegisterArgs, RegisterMachineArgs};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::registry::Registry;

/// Wire shape of `getKites` arguments.
#[derive(Deserialize)]
struct GetKitesArgs {
    query: KiteQuery,
}

fn first_arg<T: DeserializeOwned>(args: &Partial) -> Result<T, RpcError> {
    args.one()
        .and_then(|arg| arg.to())
        .map_err(|e| RpcError::Argument(e.to_string()))
}

/// Register the five registry methods on a per-connection client.
///
/// The connection-scoped `client` is captured by `register` so kontrol
/// can call the peer's `heartbeat` handler back over the same pipe.
pub fn attach_methods(client: &Client, registry: Arc<Registry>) {
    let reg = registry.clone();
    let conn = client.clone();
    client.method("register", move |req: Request| {
        let registry = reg.clone();
        let client = conn.clone();
        async move {
            let args: RegisterArgs = first_arg(&req.args)?;
            let kite = req
                .caller
                .clone()
                .or_else(|| args.kite.clone())
                .ok_or_else(|| RpcError::Argument("registration without a kite identity".into()))?;
            let auth = args.auth.or(req.auth);

            let result = registry
                .register(&kite, &args.url, auth.as_ref())
                .await
                .map_err(RpcError::from)?;

            // Ask the client to ping every interval through this callback.
            let supervisor = registry.heartbeats().clone();
            let id = kite.id.clone();
            let ping = Function::local(move |_args: Partial| {
                supervisor.beat(&id);
            });
            let interval = registry.heartbeat_interval().as_secs() as i64;
            client.tell("heartbeat", (interval, CallValue::Function(ping)))?;

            CallValue::from_serialize(&result).map_err(RpcError::from)
        }
    });

    let reg = registry.clone();
    client.method("getKites", move |req: Request| {
        let registry = reg.clone();
        async move {
            let (claims, _) = registry.authenticate(req.auth.as_ref())?;
            let args: GetKitesArgs = first_arg(&req.args)?;
            let result = registry.get_kites(&args.query, &claims.sub).await?;
            CallValue::from_serialize(&result).map_err(RpcError::from)
        }
    });

    let reg = registry.clone();
    client.method("getToken", move |req: Request| {
        let registry = reg.clone();
        async move {
            let (claims, _) = registry.authenticate(req.auth.as_ref())?;
            let query: KiteQuery = first_arg(&req.args)?;
            let token = registry.get_token(&query, &claims.sub).await?;
            Ok(CallValue::String(token))
        }
    });

    let reg = registry.clone();
    client.method("getKey", move |req: Request| {
        let registry = reg.clone();
        async move {
            let public = registry.get_key(req.auth.as_ref())?;
            Ok(CallValue::String(public))
        }
    });

    let reg = registry;
    client.method("registerMachine", move |req: Request| {
        let registry = reg.clone();
        async move {
            let args: RegisterMachineArgs = first_arg(&req.args)?;
            let kite_key = registry.register_machine(&args)?;
            Ok(CallValue::String(kite_key))
        }
    });
}
