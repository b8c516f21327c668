//! Coordinator uplink.
//!
//! The worker dials out to the Coordinator's worker endpoint and keeps that
//! connection alive for its whole life: on any connection loss it retries
//! forever with a fixed delay, re-registering its handlers on each fresh
//! channel, so active rooms survive Coordinator restarts.

use crate::config::Config;
use crate::worker::Worker;

use futures_util::{SinkExt, StreamExt};
use relay_protocol::{Channel, FrameTransport, Packet, PacketKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Delay between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Frame buffer depth between the channel and the socket pumps.
const SOCKET_FRAME_BUFFER: usize = 64;

/// Dial the Coordinator and keep the worker attached until `shutdown` fires.
pub async fn run(worker: Arc<Worker>, config: Config, shutdown: CancellationToken) {
    loop {
        let connection = tokio::select! {
            () = shutdown.cancelled() => {
                info!(target: "worker.uplink", "Shutdown requested");
                return;
            }
            connection = connect_async(config.coordinator_url.as_str()) => connection,
        };

        match connection {
            Ok((socket, _response)) => {
                info!(
                    target: "worker.uplink",
                    url = %config.coordinator_url,
                    "Connected to Coordinator"
                );
                let channel = channel_over_socket(socket, config.request_timeout());
                worker.attach_coordinator(&channel);
                spawn_heartbeat(channel.clone(), config.heartbeat_interval());

                let closed = channel.closed();
                tokio::select! {
                    () = shutdown.cancelled() => {
                        channel.close();
                        info!(target: "worker.uplink", "Shutdown requested");
                        return;
                    }
                    () = closed.cancelled() => {
                        warn!(target: "worker.uplink", "Coordinator connection lost, reconnecting");
                    }
                }
            }
            Err(err) => {
                warn!(
                    target: "worker.uplink",
                    url = %config.coordinator_url,
                    error = %err,
                    "Cannot connect to Coordinator, retrying"
                );
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

/// Bridge a WebSocket into a correlated channel with a pair of pump tasks.
/// The read pump dropping its sender is what tells the channel the
/// connection died.
fn channel_over_socket(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    request_timeout: Duration,
) -> Channel {
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

/// Periodic liveness ping toward the Coordinator. The Coordinator echoes;
/// the echo is deliberately unhandled on our side.
fn spawn_heartbeat(channel: Channel, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let closed = channel.closed();

        loop {
            tokio::select! {
                () = closed.cancelled() => break,
                _ = ticker.tick() => {
                    if channel.notify(Packet::new(PacketKind::Heartbeat)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}
