//! Game rooms.
//!
//! A room owns one running emulator instance and the set of peer sessions
//! watching and playing it. The emulator's video and audio streams fan out to
//! every attached peer; every peer's input fans back into the emulator's
//! single input channel. The room lives until its last peer detaches, then
//! tears itself down exactly once.
//!
//! Lifecycle: `created -> running -> (peers attach/detach) -> terminated`.
//! No peer can attach to a terminated room, and a terminated room id is
//! never reused; a later `start` for the same id creates a fresh room.

mod input;
mod media;

pub use input::pack_input;

use crate::emulator::{DirectorFactory, GameDirector, InputWord, MAX_PLAYERS};
use crate::errors::WorkerError;
use crate::peer::PeerSession;
use crate::storage::{SaveStore, StorageError};

use common::RoomId;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct RoomInner {
    sessions: Vec<Arc<PeerSession>>,
    running: bool,
}

/// One running game instance and its attached peer sessions.
pub struct Room {
    id: RoomId,
    game: String,
    director: Arc<dyn GameDirector>,
    input: mpsc::Sender<InputWord>,
    inner: Mutex<RoomInner>,
    shutdown: CancellationToken,
}

fn lock(inner: &Mutex<RoomInner>) -> MutexGuard<'_, RoomInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Room {
    /// Start a room for `game`. An empty `room_id` gets a generated one.
    ///
    /// The emulator instance is created through `factory` and its video and
    /// audio streams start pumping immediately; frames produced before any
    /// peer attaches are simply dropped.
    pub fn create(
        room_id: RoomId,
        game: impl Into<String>,
        factory: &dyn DirectorFactory,
    ) -> Result<Arc<Self>, WorkerError> {
        let id = if room_id.is_empty() {
            RoomId::generate()
        } else {
            room_id
        };
        let game = game.into();

        let (director, endpoints) = factory.create(&id, &game)?;
        info!(target: "worker.room", room_id = %id, game = %game, "Room created");

        let room = Arc::new(Self {
            id,
            game,
            director,
            input: endpoints.input,
            inner: Mutex::new(RoomInner {
                sessions: Vec::new(),
                running: true,
            }),
            shutdown: CancellationToken::new(),
        });

        media::spawn_video_pump(Arc::clone(&room), endpoints.video);
        media::spawn_audio_pump(Arc::clone(&room), endpoints.audio);

        Ok(room)
    }

    /// Room identity. Global across workers.
    #[must_use]
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// The game this room is running.
    #[must_use]
    pub fn game(&self) -> &str {
        &self.game
    }

    /// True until the last peer detaches.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner).running
    }

    /// Number of currently attached peer sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        lock(&self.inner).sessions.len()
    }

    /// Whether a peer with this id is attached.
    #[must_use]
    pub fn has_session(&self, peer_id: &str) -> bool {
        lock(&self.inner)
            .sessions
            .iter()
            .any(|session| session.id() == peer_id)
    }

    /// Attach a peer session as player `player_index` (1-based) and start
    /// its input fan-in pump.
    ///
    /// Rejects terminated rooms, duplicate peer ids, and out-of-range player
    /// indexes; callers joining idempotently check [`Self::has_session`]
    /// first.
    pub fn attach(
        self: &Arc<Self>,
        peer: Arc<PeerSession>,
        player_index: u8,
    ) -> Result<(), WorkerError> {
        if player_index == 0 || player_index > MAX_PLAYERS {
            return Err(WorkerError::InvalidPlayerIndex(player_index));
        }

        let input_rx = {
            let mut inner = lock(&self.inner);
            if !inner.running {
                return Err(WorkerError::RoomTerminated(self.id.clone()));
            }
            if inner.sessions.iter().any(|s| s.id() == peer.id()) {
                return Err(WorkerError::AlreadyAttached(peer.id().to_string()));
            }
            let input_rx = peer.claim_input()?;
            inner.sessions.push(Arc::clone(&peer));
            input_rx
        };

        debug!(
            target: "worker.room",
            room_id = %self.id,
            peer_id = peer.id(),
            player_index,
            "Peer attached"
        );
        input::spawn_fan_in(Arc::clone(self), peer, player_index, input_rx);
        Ok(())
    }

    /// Detach the peer with this id, if attached. Detaching the last peer
    /// terminates the room; concurrent last-peer departures terminate it
    /// exactly once. Unknown ids are a no-op.
    pub fn detach(&self, peer_id: &str) {
        let became_empty = {
            let mut inner = lock(&self.inner);
            let Some(position) = inner
                .sessions
                .iter()
                .position(|session| session.id() == peer_id)
            else {
                return;
            };
            inner.sessions.remove(position);
            inner.running && inner.sessions.is_empty()
        };

        debug!(target: "worker.room", room_id = %self.id, peer_id, "Peer detached");
        if became_empty {
            self.close();
        }
    }

    /// Terminate the room: stop the emulator, cancel the pumps, fire the
    /// completion signal. Runs the teardown at most once no matter how many
    /// callers race here; the running flag is checked-and-set under the
    /// session-list lock.
    pub fn close(&self) {
        {
            let mut inner = lock(&self.inner);
            if !inner.running {
                return;
            }
            inner.running = false;
        }

        info!(target: "worker.room", room_id = %self.id, "Closing room");
        self.director.stop();
        self.shutdown.cancel();
    }

    /// Completion signal: cancelled once the room has terminated. Consumed
    /// by the worker to reclaim the room's slot, and by the pumps as their
    /// stop condition.
    #[must_use]
    pub fn terminated(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Persist the room's emulator state: local save first, then the store.
    pub fn save_state(&self, store: &dyn SaveStore) -> Result<(), WorkerError> {
        self.director.save()?;
        store.save(self.id.as_str(), &self.director.save_path())?;
        Ok(())
    }

    /// Restore the room's emulator state from the local save file.
    pub fn load_state(&self) -> Result<(), WorkerError> {
        self.director.load()?;
        Ok(())
    }

    /// Pull a missing local save file from the store, so a room resumed on
    /// a fresh worker picks up where it left off. Best effort: a room with
    /// no stored state simply starts clean.
    pub fn hydrate_from(&self, store: &dyn SaveStore) {
        let path = self.director.save_path();
        if path.exists() {
            return;
        }
        match store.load(self.id.as_str()) {
            Ok(bytes) => {
                if let Err(err) = fs::write(&path, bytes) {
                    warn!(
                        target: "worker.room",
                        room_id = %self.id,
                        error = %err,
                        "Failed to write hydrated save file"
                    );
                }
            }
            Err(StorageError::NotFound(_)) => {
                debug!(target: "worker.room", room_id = %self.id, "No stored state to hydrate");
            }
            Err(err) => {
                warn!(
                    target: "worker.room",
                    room_id = %self.id,
                    error = %err,
                    "Save store lookup failed during hydration"
                );
            }
        }
    }

    /// Snapshot of the attached sessions, taken under the lock so the pumps
    /// never hold it across channel pushes.
    pub(crate) fn peers(&self) -> Vec<Arc<PeerSession>> {
        lock(&self.inner).sessions.clone()
    }

    /// Forward one combined input word to the emulator. A full input channel
    /// drops the word rather than stalling the fan-in pump.
    pub(crate) fn offer_input(&self, word: InputWord) -> bool {
        if !lock(&self.inner).running {
            return false;
        }
        self.input.try_send(word).is_ok()
    }
}
