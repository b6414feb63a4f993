//! Error taxonomy shared by the server and client halves of the netcode.
//!
//! None of these are fatal to a running simulation: the tick loop and the
//! client loop log them and drop the offending record.

use crate::{PlayerId, Seq};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetcodeError {
    /// Input at or below the player's confirmed sequence.
    #[error("stale input from player {player_id}: seq {seq} <= confirmed {current}")]
    StaleInput {
        player_id: PlayerId,
        seq: Seq,
        current: Seq,
    },

    /// Input whose sequence is already waiting in the player's queue.
    #[error("duplicate input from player {player_id}: seq {seq} already queued")]
    DuplicateInput { player_id: PlayerId, seq: Seq },

    /// The bounded per-player queue dropped its oldest entries.
    #[error("input queue overflow for player {player_id}: evicted {evicted} oldest inputs")]
    QueueOverflow { player_id: PlayerId, evicted: usize },

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("input claims player {got} but connection belongs to {expected}")]
    PlayerMismatch { expected: PlayerId, got: PlayerId },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, NetcodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_input_message_names_sequences() {
        let err = NetcodeError::StaleInput {
            player_id: PlayerId(7),
            seq: 50,
            current: 50,
        };
        let text = err.to_string();
        assert!(text.contains("player 7"));
        assert!(text.contains("seq 50"));
    }

    #[test]
    fn test_overflow_message() {
        let err = NetcodeError::QueueOverflow {
            player_id: PlayerId(1),
            evicted: 44,
        };
        assert_eq!(
            err.to_string(),
            "input queue overflow for player 1: evicted 44 oldest inputs"
        );
    }
}
