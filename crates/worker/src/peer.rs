//! Peer-media transport collaborator interface.
//!
//! The actual media transport (ICE, DTLS, codec plumbing) lives outside this
//! crate. A room interacts with one attached player only through a
//! [`PeerSession`]: bounded media senders going out, an input receiver coming
//! in, a connectivity watch, and a done token. The transport side holds the
//! matching [`PeerEndpoints`].

use bytes::Bytes;
use common::SessionId;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Default per-peer media buffer depth. A peer more than this many frames
/// behind starts losing frames, not delaying anyone else.
pub const DEFAULT_MEDIA_BUFFER: usize = 32;

/// Default per-peer input buffer depth.
pub const DEFAULT_INPUT_BUFFER: usize = 100;

/// Errors surfaced by the peer transport collaborator.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The remote offer could not be consumed.
    #[error("signaling failed: {0}")]
    Signaling(String),

    /// The peer's input stream was already claimed by a fan-in pump.
    #[error("peer input stream already claimed")]
    InputClaimed,
}

/// Connectivity of a peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Signaling done, media transport still connecting.
    New,
    /// Media is flowing; the fan-out pumps deliver to this peer.
    Connected,
    /// The transport dropped; the peer is on its way out.
    Disconnected,
}

/// One player's media attachment, as seen by the room.
pub struct PeerSession {
    id: String,
    video: mpsc::Sender<Bytes>,
    audio: mpsc::Sender<Bytes>,
    input: Mutex<Option<mpsc::Receiver<u8>>>,
    state: watch::Receiver<PeerState>,
    done: CancellationToken,
}

/// The transport-facing ends of a [`PeerSession`].
pub struct PeerEndpoints {
    /// Video frames bound for this peer.
    pub video: mpsc::Receiver<Bytes>,
    /// Audio packets bound for this peer.
    pub audio: mpsc::Receiver<Bytes>,
    /// This player's raw key state, pre-shift.
    pub input: mpsc::Sender<u8>,
    /// Connectivity updates.
    pub state: watch::Sender<PeerState>,
    /// Cancelled when the transport goes away for good.
    pub done: CancellationToken,
}

impl PeerSession {
    /// Create a session and its transport endpoints with default buffers.
    #[must_use]
    pub fn new(id: impl Into<String>) -> (Self, PeerEndpoints) {
        Self::with_buffers(id, DEFAULT_MEDIA_BUFFER, DEFAULT_MEDIA_BUFFER, DEFAULT_INPUT_BUFFER)
    }

    /// Create a session with explicit buffer depths.
    #[must_use]
    pub fn with_buffers(
        id: impl Into<String>,
        video_buffer: usize,
        audio_buffer: usize,
        input_buffer: usize,
    ) -> (Self, PeerEndpoints) {
        let (video_tx, video_rx) = mpsc::channel(video_buffer);
        let (audio_tx, audio_rx) = mpsc::channel(audio_buffer);
        let (input_tx, input_rx) = mpsc::channel(input_buffer);
        let (state_tx, state_rx) = watch::channel(PeerState::New);
        let done = CancellationToken::new();

        let session = Self {
            id: id.into(),
            video: video_tx,
            audio: audio_tx,
            input: Mutex::new(Some(input_rx)),
            state: state_rx,
            done: done.clone(),
        };
        let endpoints = PeerEndpoints {
            video: video_rx,
            audio: audio_rx,
            input: input_tx,
            state: state_tx,
            done,
        };
        (session, endpoints)
    }

    /// Identity of this peer session, unique per `(room, connection)`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// True while media should be delivered to this peer.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == PeerState::Connected
    }

    /// Offer a video frame. Returns `false` when the frame was dropped
    /// because this peer's buffer is full or its transport is gone.
    pub fn offer_video(&self, frame: Bytes) -> bool {
        self.video.try_send(frame).is_ok()
    }

    /// Offer an audio packet; same delivery semantics as [`Self::offer_video`].
    pub fn offer_audio(&self, packet: Bytes) -> bool {
        self.audio.try_send(packet).is_ok()
    }

    /// Claim the peer's input stream. Consumed exactly once, by the room's
    /// fan-in pump at attach time.
    pub fn claim_input(&self) -> Result<mpsc::Receiver<u8>, PeerError> {
        self.input
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or(PeerError::InputClaimed)
    }

    /// Cancelled when the transport goes away for good.
    #[must_use]
    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }
}

/// Signaling interface of the peer transport: consume a remote offer and
/// produce the local answer plus the attached peer session.
pub trait PeerConnector: Send + Sync {
    /// Start a peer connection as the offeree for `session_id`.
    fn start_as_offeree(
        &self,
        session_id: &SessionId,
        remote_offer: &str,
    ) -> Result<(String, PeerSession), PeerError>;
}
