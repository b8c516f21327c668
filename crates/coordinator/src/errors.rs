//! Coordinator error types.

use common::{SessionId, WorkerId};
use relay_protocol::ChannelError;
use thiserror::Error;

/// Coordinator error type.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A browser asked to be admitted while zero workers are registered.
    /// Fatal for that admission attempt; the connection is refused.
    #[error("no worker available")]
    NoWorkerAvailable,

    /// No registered worker with this id.
    #[error("unknown worker: {0}")]
    WorkerNotFound(WorkerId),

    /// No admitted browser session with this id.
    #[error("unknown session: {0}")]
    SessionNotFound(SessionId),

    /// A relay hop failed at the channel level.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
