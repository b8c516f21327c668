//! Arcadia signaling protocol.
//!
//! This crate implements the two building blocks every Arcadia connection is
//! made of:
//!
//! - [`packet`]: the JSON wire packet exchanged on a persistent duplex
//!   connection, with a closed set of packet kinds.
//! - [`channel`]: the correlated channel, which turns one such connection
//!   into an RPC-capable multiplexer by matching replies to outstanding
//!   requests via per-request correlation IDs, and dispatching everything
//!   else to registered event handlers.
//!
//! The channel is transport-agnostic: it reads and writes raw text frames
//! through [`transport::FrameTransport`], so the same code runs over a
//! WebSocket in production and over an in-memory pair in tests.

#![warn(clippy::pedantic)]

pub mod channel;
pub mod packet;
pub mod transport;

pub use channel::{Channel, ChannelError};
pub use packet::{Packet, PacketKind};
pub use transport::FrameTransport;
