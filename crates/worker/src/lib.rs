//! Arcadia worker.
//!
//! A worker hosts game rooms: it runs emulator instances through the
//! director interface, fans their audio/video out to attached peer sessions,
//! fans player input back in, and answers the browser traffic the
//! Coordinator relays to it over one persistent channel.
//!
//! # Structure
//!
//! - [`worker::Worker`]: per-process state (rooms, relayed browser sessions)
//!   and the Coordinator-channel handlers, including cross-worker bridging.
//! - [`room::Room`]: one emulator instance plus its peer sessions; media
//!   fan-out, input fan-in, exactly-once termination.
//! - [`emulator`], [`peer`], [`storage`]: the narrow interfaces to the
//!   emulator core, the peer-media transport, and save-state persistence.
//! - [`coordinator_client`]: the reconnecting uplink.

#![warn(clippy::pedantic)]

pub mod config;
pub mod coordinator_client;
pub mod emulator;
pub mod errors;
pub mod peer;
pub mod room;
pub mod storage;
pub mod worker;

pub use errors::WorkerError;
pub use worker::Worker;
