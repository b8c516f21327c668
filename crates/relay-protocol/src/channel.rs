//! The correlated channel: request/response multiplexing over one duplex
//! connection.
//!
//! Every connection in Arcadia (browser <-> Coordinator, worker <->
//! Coordinator) is wrapped in exactly one [`Channel`]. A dedicated read-loop
//! task decodes inbound frames and dispatches each packet in two tiers:
//!
//! 1. **Reply dispatch** — if the packet's correlation id matches an
//!    outstanding [`Channel::request`], the one-shot waiter is fulfilled and
//!    removed. Each waiter is fulfilled at most once.
//! 2. **Event dispatch** — otherwise the handler registered for the packet's
//!    kind runs on its own task. A handler may return a reply, which is sent
//!    back stamped with the inbound packet's correlation and session ids;
//!    returning `None` or the no-op sentinel sends nothing.
//!
//! Writes are serialized by construction: all frames funnel through the
//! single outbound sender feeding one transport pump.
//!
//! When the connection dies (read loop exit), every outstanding request is
//! failed with [`ChannelError::Closed`] and the channel's `closed` token
//! fires, so owners can tear down dependent state. Requests also carry a
//! deadline; the original design blocked forever, which is a liveness hole
//! this implementation closes (see DESIGN.md).

use crate::packet::{Packet, PacketKind};
use crate::transport::FrameTransport;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Default deadline for [`Channel::request`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors surfaced by channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The underlying connection is gone; no reply will ever arrive.
    #[error("channel closed")]
    Closed,

    /// No reply arrived within the request deadline.
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    /// The packet could not be encoded as a frame.
    #[error("frame encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Boxed future returned by event handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Option<Packet>> + Send>>;

type EventHandler = Arc<dyn Fn(Packet) -> HandlerFuture + Send + Sync>;
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Packet>>>>;
type HandlerMap = Arc<Mutex<HashMap<PacketKind, EventHandler>>>;

/// A correlated duplex channel. Cheap to clone; all clones share the same
/// connection, pending-request table, and handler registry.
#[derive(Clone)]
pub struct Channel {
    outbound: mpsc::Sender<String>,
    pending: PendingMap,
    handlers: HandlerMap,
    closed: CancellationToken,
    request_timeout: Duration,
}

/// Recover the guard from a poisoned lock: the maps hold plain data, so a
/// panicked holder cannot leave them logically inconsistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Channel {
    /// Wrap a transport and start its read loop.
    #[must_use]
    pub fn spawn(transport: FrameTransport) -> Self {
        Self::spawn_with_timeout(transport, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Wrap a transport with a custom request deadline.
    #[must_use]
    pub fn spawn_with_timeout(transport: FrameTransport, request_timeout: Duration) -> Self {
        let (outbound, inbound) = transport.into_parts();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let handlers: HandlerMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();

        tokio::spawn(read_loop(
            inbound,
            outbound.clone(),
            Arc::clone(&pending),
            Arc::clone(&handlers),
            closed.clone(),
        ));

        Self {
            outbound,
            pending,
            handlers,
            closed,
            request_timeout,
        }
    }

    /// Register the handler for unsolicited packets of `kind`, replacing any
    /// previous registration. The handler runs on its own task so it never
    /// blocks the read loop, and its non-sentinel return value is sent back
    /// stamped with the inbound packet's correlation and session ids.
    pub fn on<F, Fut>(&self, kind: PacketKind, handler: F)
    where
        F: Fn(Packet) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Packet>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |packet| Box::pin(handler(packet)));
        lock(&self.handlers).insert(kind, handler);
    }

    /// Send a packet without expecting a reply. A fresh correlation id is
    /// stamped so the remote side can still echo it if it chooses to answer.
    pub async fn notify(&self, mut packet: Packet) -> Result<(), ChannelError> {
        packet.correlation_id = uuid::Uuid::new_v4().to_string();
        self.transmit(&packet).await
    }

    /// Send a packet and wait for the correlated reply, up to the channel's
    /// default deadline.
    pub async fn request(&self, packet: Packet) -> Result<Packet, ChannelError> {
        self.request_with_timeout(packet, self.request_timeout).await
    }

    /// Send a packet and wait for the correlated reply, up to `deadline`.
    ///
    /// The reply slot is registered before the frame is written, so a reply
    /// cannot race past its waiter no matter how fast the remote side turns
    /// the request around.
    pub async fn request_with_timeout(
        &self,
        mut packet: Packet,
        deadline: Duration,
    ) -> Result<Packet, ChannelError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        packet.correlation_id.clone_from(&correlation_id);

        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.pending).insert(correlation_id.clone(), reply_tx);

        if let Err(err) = self.transmit(&packet).await {
            lock(&self.pending).remove(&correlation_id);
            return Err(err);
        }

        tokio::select! {
            reply = reply_rx => reply.map_err(|_| ChannelError::Closed),
            () = tokio::time::sleep(deadline) => {
                lock(&self.pending).remove(&correlation_id);
                Err(ChannelError::TimedOut(deadline))
            }
        }
    }

    /// Stop the read loop and fail all outstanding requests. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Token fired when the connection dies, for owners that must cascade
    /// cleanup (e.g. the Coordinator dropping a worker's rooms).
    #[must_use]
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// True once the connection is known dead.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn transmit(&self, packet: &Packet) -> Result<(), ChannelError> {
        let frame = serde_json::to_string(packet)?;
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ChannelError::Closed)
    }
}

/// Per-channel read loop: decode, then two-tier dispatch.
async fn read_loop(
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
    pending: PendingMap,
    handlers: HandlerMap,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = closed.cancelled() => break,
            frame = inbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let packet: Packet = match serde_json::from_str(&frame) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(target: "relay.channel", error = %err, "Dropping undecodable frame");
                continue;
            }
        };

        // Tier 1: a reply some request is waiting for.
        if !packet.correlation_id.is_empty() {
            if let Some(waiter) = lock(&pending).remove(&packet.correlation_id) {
                // Fulfilling a oneshot never blocks; the waiter resumes on
                // its own task.
                let _ = waiter.send(packet);
                continue;
            }
        }

        // Tier 2: an unsolicited event.
        if matches!(packet.kind, PacketKind::Noop | PacketKind::Unknown) {
            trace!(target: "relay.channel", "Ignoring non-dispatchable packet");
            continue;
        }

        let handler = lock(&handlers).get(&packet.kind).cloned();
        match handler {
            Some(handler) => {
                tokio::spawn(dispatch_event(handler, packet, outbound.clone()));
            }
            None => {
                debug!(
                    target: "relay.channel",
                    kind = ?packet.kind,
                    "No handler registered for packet kind"
                );
            }
        }
    }

    closed.cancel();

    // Fail every blocked caller: dropping the one-shot senders resolves
    // their receivers with an error, which surfaces as `Closed`.
    let drained = lock(&pending).drain().count();
    if drained > 0 {
        debug!(
            target: "relay.channel",
            outstanding = drained,
            "Channel closed with outstanding requests"
        );
    }

    // A dead channel dispatches nothing; dropping the handlers also breaks
    // the reference cycle formed by handlers that captured the channel.
    lock(&handlers).clear();
}

/// Run one event handler and send its reply, if any.
async fn dispatch_event(handler: EventHandler, packet: Packet, outbound: mpsc::Sender<String>) {
    let correlation_id = packet.correlation_id.clone();
    let session_id = packet.session_id.clone();

    let Some(mut reply) = handler(packet).await else {
        return;
    };
    if reply.is_noop() {
        return;
    }

    // The reply inherits the request's correlation and session stamps so the
    // remote side can match it without the handler doing any bookkeeping.
    reply.correlation_id = correlation_id;
    reply.session_id = session_id;

    match serde_json::to_string(&reply) {
        Ok(frame) => {
            if outbound.send(frame).await.is_err() {
                debug!(target: "relay.channel", "Reply dropped: connection closed");
            }
        }
        Err(err) => {
            warn!(target: "relay.channel", error = %err, "Failed to encode reply");
        }
    }
}
