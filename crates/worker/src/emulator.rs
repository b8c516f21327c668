//! Emulator collaborator interface.
//!
//! The emulator core is outside this crate. A room only ever sees it through
//! the channel endpoints handed over at creation: a video frame source, an
//! audio packet source, and an input word sink, plus the [`GameDirector`]
//! handle for save/load/stop control.

use bytes::Bytes;
use common::RoomId;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// One combined input word. Each player owns a disjoint
/// [`KEYS_PER_PLAYER`]-bit range inside it.
pub type InputWord = u32;

/// Bits of input state per player slot.
pub const KEYS_PER_PLAYER: u32 = 8;

/// Highest supported 1-based player index (the input word is 32 bits wide).
pub const MAX_PLAYERS: u8 = 4;

/// Errors surfaced by the emulator collaborator.
#[derive(Debug, Error)]
pub enum DirectorError {
    /// The emulator could not be started for this game.
    #[error("failed to start emulator: {0}")]
    StartFailed(String),

    /// Persisting the emulator state failed.
    #[error("save failed: {0}")]
    SaveFailed(String),

    /// Restoring the emulator state failed.
    #[error("load failed: {0}")]
    LoadFailed(String),
}

/// The channel endpoints of one running emulator instance.
///
/// The room consumes `video`/`audio` through its fan-out pumps and feeds
/// `input` from its per-peer fan-in pumps.
pub struct EmulatorEndpoints {
    /// Encoded video frames, in presentation order.
    pub video: mpsc::Receiver<Bytes>,
    /// Encoded audio packets, in presentation order.
    pub audio: mpsc::Receiver<Bytes>,
    /// Combined input words consumed by the emulator.
    pub input: mpsc::Sender<InputWord>,
}

/// Control handle for one running emulator instance.
pub trait GameDirector: Send + Sync {
    /// Persist the current state to the local save file.
    fn save(&self) -> Result<(), DirectorError>;

    /// Restore state from the local save file.
    fn load(&self) -> Result<(), DirectorError>;

    /// Location of the local save file for this instance.
    fn save_path(&self) -> PathBuf;

    /// Stop driving the emulator. Called exactly once, when the room
    /// terminates.
    fn stop(&self);
}

/// Factory for emulator instances, injected into the worker at startup.
pub trait DirectorFactory: Send + Sync {
    /// Start an emulator for `game` and return its control handle together
    /// with the channel endpoints the room will pump.
    fn create(
        &self,
        room_id: &RoomId,
        game: &str,
    ) -> Result<(Arc<dyn GameDirector>, EmulatorEndpoints), DirectorError>;
}
