use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kite_core::{Client, RpcError, Transport};
use kite_protocol::RegisterArgs;
use serde::Deserialize;

use crate::error::KontrolError;
use crate::registry::Registry;
use crate::rpc;

/// The registry's HTTP surface: registration and heartbeats over plain
/// HTTP, the RPC dialect over `/kite` WebSocket upgrades.
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/register", post(register))
        .route("/heartbeat", post(heartbeat))
        .route("/kite", get(upgrade))
        .with_state(registry)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct HeartbeatParams {
    id: String,
}

/// The HTTP heartbeat variant: a known id resets its supervision timer, an
/// unknown one is told to re-run the registration dance.
async fn heartbeat(
    State(registry): State<Arc<Registry>>,
    Query(params): Query<HeartbeatParams>,
) -> &'static str {
    if registry.heartbeats().beat(&params.id) {
        "pong"
    } else {
        "registeragain"
    }
}

async fn register(
    State(registry): State<Arc<Registry>>,
    Json(args): Json<RegisterArgs>,
) -> Response {
    let Some(kite) = args.kite else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "register body must include the kite identity",
        );
    };
    match registry.register(&kite, &args.url, args.auth.as_ref()).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn upgrade(State(registry): State<Arc<Registry>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, registry))
}

async fn serve_socket(socket: WebSocket, registry: Arc<Registry>) {
    let client = Client::new();
    rpc::attach_methods(&client, registry);
    client.run(WsTransport { socket }).await;
    tracing::debug!("kite connection closed");
}

/// Adapts an accepted WebSocket into the RPC transport contract.
struct WsTransport {
    socket: WebSocket,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), RpcError> {
        self.socket
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|_| RpcError::Disconnect)
    }

    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.socket.recv().await? {
                Ok(WsMessage::Text(text)) => return Some(text.to_string()),
                Ok(WsMessage::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.socket.send(WsMessage::Close(None)).await;
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

impl IntoResponse for KontrolError {
    fn into_response(self) -> Response {
        let status = match &self {
            KontrolError::Auth(_) => StatusCode::UNAUTHORIZED,
            KontrolError::Identity(_) | KontrolError::Query(_) => StatusCode::BAD_REQUEST,
            KontrolError::KiteNotFound => StatusCode::NOT_FOUND,
            KontrolError::TooManyKites(_) => StatusCode::CONFLICT,
            KontrolError::Storage(_) | KontrolError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.to_string())
    }
}
