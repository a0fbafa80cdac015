//! The snapshot-stream port: `GET /stream` delivers an initial
//! bulk of `insert`s describing existing sessions followed by live
//! `insert`/`update`/`delete` events over a websocket. `GET /snapshots` is a
//! plain REST bulk fetch for clients that don't want a live connection.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use sessiond_protocol::PublishedOp;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::app::AppState;

pub fn router(app: Arc<AppState>) -> Router {
    Router::new()
        .route("/stream", get(stream_ws))
        .route("/snapshots", get(snapshots))
        .with_state(app)
}

async fn snapshots(State(app): State<Arc<AppState>>) -> Response {
    Json(app.publisher.bulk()).into_response()
}

async fn stream_ws(ws: WebSocketUpgrade, State(app): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(mut socket: WebSocket, app: Arc<AppState>) {
    // Subscribe before reading the bulk snapshot so no insert/update that
    // lands in between is missed.
    let mut rx = app.publisher.subscribe();

    for snapshot in app.publisher.bulk() {
        if send_op(&mut socket, &PublishedOp::Insert { snapshot }).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(op) => {
                        if send_op(&mut socket, &op).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Stream subscriber lagged; resuming from current state");
                        continue;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => continue,
                }
            }
        }
    }
}

async fn send_op(socket: &mut WebSocket, op: &PublishedOp) -> Result<(), axum::Error> {
    let text = serde_json::to_string(op).unwrap_or_default();
    socket.send(Message::Text(text)).await
}
