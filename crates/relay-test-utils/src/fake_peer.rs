//! Scriptable peer-media transport.

use bytes::Bytes;
use common::SessionId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use worker::peer::{PeerConnector, PeerError, PeerSession, PeerState};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The test's ends of one fake peer connection.
pub struct PeerRig {
    /// Id of the peer session handed to the room.
    pub peer_id: String,
    /// The answer returned from signaling.
    pub answer: String,
    /// Drain video frames delivered to this peer.
    pub video: mpsc::Receiver<Bytes>,
    /// Drain audio packets delivered to this peer.
    pub audio: mpsc::Receiver<Bytes>,
    /// Press keys on this player's controller.
    pub input: mpsc::Sender<u8>,
    /// Flip connectivity.
    pub state: watch::Sender<PeerState>,
    /// Kill the transport.
    pub done: CancellationToken,
}

/// Connector that accepts any offer and parks a [`PeerRig`] per session.
///
/// Peer ids are derived from the session id, so a retried `initwebrtc` for
/// the same session produces a peer with the same identity (and replaces the
/// previous rig).
pub struct FakePeerConnector {
    label: String,
    video_buffer: usize,
    audio_buffer: usize,
    input_buffer: usize,
    auto_connect: bool,
    refuse: AtomicBool,
    rigs: Mutex<HashMap<SessionId, PeerRig>>,
}

impl FakePeerConnector {
    /// A connector whose answers and peer ids carry `label`, so tests can
    /// tell which worker's transport produced them.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_buffers(label, 32, 32, 100)
    }

    /// A connector with explicit per-peer buffer depths.
    #[must_use]
    pub fn with_buffers(
        label: impl Into<String>,
        video_buffer: usize,
        audio_buffer: usize,
        input_buffer: usize,
    ) -> Self {
        Self {
            label: label.into(),
            video_buffer,
            audio_buffer,
            input_buffer,
            auto_connect: true,
            refuse: AtomicBool::new(false),
            rigs: Mutex::new(HashMap::new()),
        }
    }

    /// Leave new peers in the `New` state instead of flipping them to
    /// `Connected` immediately.
    #[must_use]
    pub fn without_auto_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    /// Make subsequent signaling attempts fail.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Take the rig for a session's peer. Each rig can be taken once.
    #[must_use]
    pub fn take_rig(&self, session_id: &SessionId) -> Option<PeerRig> {
        lock(&self.rigs).remove(session_id)
    }

    /// Number of peers this connector has signaled.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        lock(&self.rigs).len()
    }
}

impl PeerConnector for FakePeerConnector {
    fn start_as_offeree(
        &self,
        session_id: &SessionId,
        remote_offer: &str,
    ) -> Result<(String, PeerSession), PeerError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(PeerError::Signaling("scripted refusal".to_string()));
        }

        let peer_id = format!("{}-{session_id}", self.label);
        let (session, endpoints) = PeerSession::with_buffers(
            peer_id.clone(),
            self.video_buffer,
            self.audio_buffer,
            self.input_buffer,
        );
        if self.auto_connect {
            let _ = endpoints.state.send(PeerState::Connected);
        }

        let answer = format!("{}-answer:{remote_offer}", self.label);
        lock(&self.rigs).insert(
            session_id.clone(),
            PeerRig {
                peer_id,
                answer: answer.clone(),
                video: endpoints.video,
                audio: endpoints.audio,
                input: endpoints.input,
                state: endpoints.state,
                done: endpoints.done,
            },
        );

        Ok((answer, session))
    }
}
