//! Fake collaborators for Arcadia tests.
//!
//! Rooms and workers are generic over three seams (emulator director, peer
//! transport, save store); the fakes here implement all three with the test
//! holding the far end of every channel, so tests can inject frames, drain
//! peer media, type on a player's controller, and inspect persistence.

#![warn(clippy::pedantic)]

mod fake_director;
mod fake_peer;
mod memory_store;

pub use fake_director::{DirectorHandle, FakeDirector, FakeDirectorFactory};
pub use fake_peer::{FakePeerConnector, PeerRig};
pub use memory_store::MemorySaveStore;
