//! Media fan-out pumps.
//!
//! One pump per stream reads from the emulator and offers each unit to every
//! connected peer independently. Delivery is per-peer `try_send`: a peer
//! whose buffer is full loses its own frames, up to its buffer depth, while
//! the other peers keep receiving at full rate. There is no cross-peer
//! synchronization.

use super::Room;

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
enum Stream {
    Video,
    Audio,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

pub(super) fn spawn_video_pump(room: Arc<Room>, source: mpsc::Receiver<Bytes>) {
    tokio::spawn(pump(room, source, Stream::Video));
}

pub(super) fn spawn_audio_pump(room: Arc<Room>, source: mpsc::Receiver<Bytes>) {
    tokio::spawn(pump(room, source, Stream::Audio));
}

async fn pump(room: Arc<Room>, mut source: mpsc::Receiver<Bytes>, stream: Stream) {
    let shutdown = room.terminated();

    loop {
        let unit = tokio::select! {
            () = shutdown.cancelled() => break,
            unit = source.recv() => match unit {
                Some(unit) => unit,
                None => break,
            },
        };
        fan_out(&room, &unit, stream);
    }

    debug!(
        target: "worker.room",
        room_id = %room.id(),
        stream = stream.name(),
        "Fan-out pump stopped"
    );
}

fn fan_out(room: &Room, unit: &Bytes, stream: Stream) {
    // Snapshot, then push outside the session-list lock.
    for peer in room.peers() {
        if !peer.is_connected() {
            continue;
        }
        let delivered = match stream {
            Stream::Video => peer.offer_video(unit.clone()),
            Stream::Audio => peer.offer_audio(unit.clone()),
        };
        if !delivered {
            trace!(
                target: "worker.room",
                room_id = %room.id(),
                peer_id = peer.id(),
                stream = stream.name(),
                "Peer buffer full, unit dropped"
            );
        }
    }
}
