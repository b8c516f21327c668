//! Worker error types.

use common::{RoomId, SessionId};
use relay_protocol::ChannelError;
use thiserror::Error;

/// Worker error type.
///
/// Application-level failures (a `save` with no joined room, an attach to a
/// terminated room) are reported back to the browser in-band as `"error"`
/// payloads; only connection-level failures tear anything down.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The coordinator channel failed mid-operation.
    #[error("coordinator channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The room has already terminated; room ids are never resurrected.
    #[error("room {0} is terminated")]
    RoomTerminated(RoomId),

    /// No live room with this id on this worker.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// A peer session with the same id is already attached to the room.
    #[error("peer {0} already attached")]
    AlreadyAttached(String),

    /// The player index is outside the supported range.
    #[error("player index {0} out of range")]
    InvalidPlayerIndex(u8),

    /// The session has no established peer connection to attach.
    #[error("session {0} has no peer connection")]
    NoPeerConnection(SessionId),

    /// The session has not joined any room.
    #[error("session {0} has not joined a room")]
    NotJoined(SessionId),

    /// The emulator director failed.
    #[error("director error: {0}")]
    Director(#[from] crate::emulator::DirectorError),

    /// The peer transport failed.
    #[error("peer transport error: {0}")]
    Peer(#[from] crate::peer::PeerError),

    /// The save store failed.
    #[error("save store error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
