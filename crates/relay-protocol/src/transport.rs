//! Frame transport for correlated channels.
//!
//! A [`FrameTransport`] is one side of a persistent duplex connection,
//! reduced to ordered text frames: an outbound sender and an inbound
//! receiver. Production code bridges these to a WebSocket with a pair of
//! pump tasks; tests wire two transports back to back with [`FrameTransport::pair`].
//!
//! Dropping the inbound sender half (e.g. because the socket read pump saw
//! EOF) is how connection death reaches the channel's read loop.

use tokio::sync::mpsc;

/// Default frame buffer depth for in-memory pairs.
pub const DEFAULT_FRAME_BUFFER: usize = 64;

/// One side of a duplex text-frame connection.
#[derive(Debug)]
pub struct FrameTransport {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<String>,
}

impl FrameTransport {
    /// Build a transport from an outbound sender and inbound receiver,
    /// typically the application ends of a pair of socket pump tasks.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<String>) -> Self {
        Self { outbound, inbound }
    }

    /// Two transports wired back to back: frames sent on one side arrive on
    /// the other, in order. The backbone of every in-process test.
    #[must_use]
    pub fn pair(buffer: usize) -> (Self, Self) {
        let (left_tx, right_rx) = mpsc::channel(buffer);
        let (right_tx, left_rx) = mpsc::channel(buffer);
        (
            Self {
                outbound: left_tx,
                inbound: left_rx,
            },
            Self {
                outbound: right_tx,
                inbound: right_rx,
            },
        )
    }

    /// Split into the raw sender/receiver halves.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        (self.outbound, self.inbound)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (left, right) = FrameTransport::pair(8);
        let (left_tx, _left_rx) = left.into_parts();
        let (_right_tx, mut right_rx) = right.into_parts();

        left_tx.send("one".to_string()).await.unwrap();
        left_tx.send("two".to_string()).await.unwrap();

        assert_eq!(right_rx.recv().await.unwrap(), "one");
        assert_eq!(right_rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_dropping_one_side_closes_the_other() {
        let (left, right) = FrameTransport::pair(8);
        drop(left);

        let (_right_tx, mut right_rx) = right.into_parts();
        assert!(right_rx.recv().await.is_none());
    }
}
