//! HTTP routes and the socket loop.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use session_telemetry::{gather_text, ACTIVE_CONNECTIONS};
use shared_types::ConnectionId;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use turn_coordinator::TurnCoordinatorApi;

use super::identity::Identity;
use super::{GatewayError, GatewayState, ServerMessage};

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// `/ws`, `/health` and `/metrics`.
pub fn router<C>(state: GatewayState<C>) -> Router
where
    C: TurnCoordinatorApi + 'static,
{
    Router::new()
        .route("/ws", get(ws_upgrade::<C>))
        .route("/health", get(health::<C>))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Binds `addr` and serves until `shutdown` changes.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: watch::Receiver<bool>,
) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })?;
    serve_listener(listener, router, shutdown).await
}

pub async fn serve_listener(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), GatewayError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Gateway listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(GatewayError::Serve)
}

async fn ws_upgrade<C>(
    State(state): State<GatewayState<C>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response
where
    C: TurnCoordinatorApi + 'static,
{
    let identity = match state.identity.resolve(params.token.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "Refusing connection");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };
    let max_message_size = state.settings.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| serve_socket(socket, state, identity))
}

async fn serve_socket<C>(socket: WebSocket, state: GatewayState<C>, identity: Identity)
where
    C: TurnCoordinatorApi + 'static,
{
    let connection_id = ConnectionId::random();
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::channel::<ServerMessage>(state.settings.outbox_capacity);
    let handler = state.connection(connection_id.clone(), outbox);

    ACTIVE_CONNECTIONS.inc();
    info!(
        connection_id = %connection_id,
        user_id = identity.user_id.as_deref().unwrap_or("anonymous"),
        "Connection opened"
    );

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Failed to encode server message");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    handler.greet().await;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handler.handle_text(&text).await,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => handler.handle_text(&text).await,
                Err(e) => handler.invalid_frame(e).await,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Socket read failed");
                break;
            }
        }
    }

    handler.disconnect().await;
    let _ = writer.await;
    ACTIVE_CONNECTIONS.dec();
}

async fn health<C>(State(state): State<GatewayState<C>>) -> Json<Value>
where
    C: TurnCoordinatorApi + 'static,
{
    Json(json!({
        "status": "ok",
        "message": "Beatgrid session server is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": state.registry.connection_count(),
    }))
}

async fn metrics() -> Response {
    match gather_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
