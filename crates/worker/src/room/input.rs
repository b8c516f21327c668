//! Input fan-in.
//!
//! Every attached peer gets one pump that reads its raw key state and shifts
//! it into that player's bit range of the shared input word, so N players
//! collapse into the emulator's single input channel without colliding.

use super::Room;
use crate::emulator::{InputWord, KEYS_PER_PLAYER};
use crate::peer::PeerSession;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Shift a player's raw key byte into its slot of the combined input word.
///
/// Player 1 occupies bits `0..KEYS_PER_PLAYER`, player 2 the next range, and
/// so on; the ranges are disjoint for all supported player indexes.
#[must_use]
pub fn pack_input(keys: u8, player_index: u8) -> InputWord {
    let shift = u32::from(player_index.saturating_sub(1)) * KEYS_PER_PLAYER;
    InputWord::from(keys) << shift
}

pub(super) fn spawn_fan_in(
    room: Arc<Room>,
    peer: Arc<PeerSession>,
    player_index: u8,
    mut input: mpsc::Receiver<u8>,
) {
    tokio::spawn(async move {
        let shutdown = room.terminated();
        let gone = peer.done();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = gone.cancelled() => {
                    // Transport death counts as departure even if no explicit
                    // quit ever arrives.
                    room.detach(peer.id());
                    break;
                }
                keys = input.recv() => {
                    let Some(keys) = keys else { break };
                    if !peer.is_connected() {
                        continue;
                    }
                    let word = pack_input(keys, player_index);
                    if !room.offer_input(word) {
                        trace!(
                            target: "worker.room",
                            room_id = %room.id(),
                            peer_id = peer.id(),
                            "Input word dropped"
                        );
                    }
                }
            }
        }

        debug!(
            target: "worker.room",
            room_id = %room.id(),
            peer_id = peer.id(),
            player_index,
            "Fan-in pump stopped"
        );
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::emulator::MAX_PLAYERS;

    #[test]
    fn test_player_ranges_are_disjoint() {
        let all_keys = u8::MAX;
        let mut seen: InputWord = 0;
        for player in 1..=MAX_PLAYERS {
            let word = pack_input(all_keys, player);
            assert_eq!(word & seen, 0, "player {player} collides with earlier players");
            seen |= word;
        }
        assert_eq!(seen, InputWord::MAX);
    }

    #[test]
    fn test_same_key_different_players() {
        let p1 = pack_input(0b1, 1);
        let p2 = pack_input(0b1, 2);
        assert_eq!(p1, 0b1);
        assert_eq!(p2, 1 << KEYS_PER_PLAYER);
        assert_eq!(p1 & p2, 0);
        assert_eq!(p1 | p2, (1 << KEYS_PER_PLAYER) | 1);
    }

    #[test]
    fn test_player_one_is_identity() {
        for keys in [0u8, 1, 0b1010_0101, u8::MAX] {
            assert_eq!(pack_input(keys, 1), InputWord::from(keys));
        }
    }
}
