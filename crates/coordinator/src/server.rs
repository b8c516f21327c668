//! HTTP surface: the two WebSocket endpoints plus a health probe.
//!
//! `/wso` is where workers register; `/ws` is where browsers land. Each
//! upgraded socket is bridged into a correlated channel by a pair of pump
//! tasks, then handed to the Coordinator.

use crate::coordinator::Coordinator;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use relay_protocol::{Channel, FrameTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Frame buffer depth between a channel and its socket pumps.
const SOCKET_FRAME_BUFFER: usize = 64;

#[derive(Clone)]
struct AppState {
    coordinator: Arc<Coordinator>,
    request_timeout: Duration,
}

/// Build the Coordinator's router.
#[must_use]
pub fn router(coordinator: Arc<Coordinator>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/ws", get(browser_ws))
        .route("/wso", get(worker_ws))
        .route("/healthz", get(healthz))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AppState {
            coordinator,
            request_timeout,
        })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn worker_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let channel = channel_over_socket(socket, state.request_timeout);
        let worker_id = state.coordinator.register_worker(channel).await;
        info!(target: "coordinator.server", worker_id = %worker_id, "Worker connection established");
    })
}

async fn browser_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let channel = channel_over_socket(socket, state.request_timeout);
        match state.coordinator.admit_browser(channel.clone()) {
            Ok(session_id) => {
                info!(
                    target: "coordinator.server",
                    session_id = %session_id,
                    "Browser connection established"
                );
            }
            Err(err) => {
                // Refuse the connection; closing the channel tears the
                // socket pumps down.
                warn!(target: "coordinator.server", error = %err, "Browser admission refused");
                channel.close();
            }
        }
    })
}

/// Bridge an upgraded WebSocket into a correlated channel. The read pump
/// dropping its sender is what reports connection death to the channel.
fn channel_over_socket(socket: WebSocket, request_timeout: Duration) -> Channel {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(SOCKET_FRAME_BUFFER);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(SOCKET_FRAME_BUFFER);

    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(frame)) => {
                    if inbound_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    Channel::spawn_with_timeout(FrameTransport::new(outbound_tx, inbound_rx), request_timeout)
}
