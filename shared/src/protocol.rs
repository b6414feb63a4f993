//! Wire records exchanged between client and server.
//!
//! Each record travels as one bincode-encoded datagram. Both directions are
//! closed enums so receivers dispatch with a single `match`.

use crate::error::{NetcodeError, Result};
use crate::sim::{InputCommand, SimState, StateHasher};
use crate::{PlayerId, Seq, Tick};
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Upper bound for a single encoded record.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Authoritative state of one player, tagged with the highest input sequence
/// the server had consumed for that player.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// The player's simulation tick, equal to `state.tick`.
    pub tick: Tick,
    /// Room tick at emission.
    pub server_tick: Tick,
    pub last_processed_seq: Seq,
    pub state: SimState,
    pub hash: Option<u64>,
}

impl Snapshot {
    pub fn new(server_tick: Tick, last_processed_seq: Seq, state: SimState, hashed: bool) -> Self {
        let mut snapshot = Self {
            tick: state.tick,
            server_tick,
            last_processed_seq,
            state,
            hash: None,
        };
        if hashed {
            snapshot.hash = Some(snapshot.digest());
        }
        snapshot
    }

    /// Integrity digest over the tick, the confirmed sequence and the state.
    /// `server_tick` is informational and left out.
    pub fn digest(&self) -> u64 {
        let mut hasher = StateHasher::new();
        hasher.write_u32(self.tick);
        hasher.write_u32(self.last_processed_seq);
        hasher.write_u64(self.state.hash());
        hasher.finish()
    }

    /// False only when a hash is attached and does not match the contents.
    pub fn verify(&self) -> bool {
        self.hash.map_or(true, |hash| hash == self.digest())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ClientMessage {
    /// Opens a session for an identity issued by the authentication service.
    Join { player_id: PlayerId },
    Input(InputCommand),
    Ping { client_time: u64 },
    Leave,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerMessage {
    Hello {
        server_tick: Tick,
        tick_rate: u32,
        player_id: PlayerId,
        /// Current authoritative state the client resumes prediction from.
        resume: Snapshot,
    },
    Snapshot(Snapshot),
    Pong { client_time: u64, server_time: u64 },
    Rejected { reason: String },
}

fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let data = serialize(message).map_err(|e| NetcodeError::MalformedMessage(e.to_string()))?;
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(NetcodeError::MalformedMessage(format!(
            "encoded record is {} bytes, limit is {}",
            data.len(),
            MAX_DATAGRAM_SIZE
        )));
    }
    Ok(data)
}

fn decode<'a, T: Deserialize<'a>>(data: &'a [u8]) -> Result<T> {
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(NetcodeError::MalformedMessage(format!(
            "datagram of {} bytes exceeds limit",
            data.len()
        )));
    }
    deserialize(data).map_err(|e| NetcodeError::MalformedMessage(e.to_string()))
}

impl ClientMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        decode(data)
    }
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        decode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> SimState {
        SimState {
            tick: 12,
            player_id: PlayerId(9),
            x: 1.5,
            y: -2.0,
            vx: 0.25,
            vy: 0.0,
        }
    }

    #[test]
    fn test_input_record_roundtrip() {
        let message = ClientMessage::Input(InputCommand {
            player_id: PlayerId(9),
            seq: 123,
            tick: 456,
            dt_ms: 16.667,
            move_x: 1.0,
            move_y: -0.5,
            buttons: 0b101,
        });

        let data = message.encode().unwrap();
        match ClientMessage::decode(&data).unwrap() {
            ClientMessage::Input(cmd) => {
                assert_eq!(cmd.seq, 123);
                assert_eq!(cmd.tick, 456);
                assert_eq!(cmd.move_y, -0.5);
                assert_eq!(cmd.buttons, 0b101);
            }
            other => panic!("Wrong record after decode: {:?}", other),
        }
    }

    #[test]
    fn test_hello_carries_resume_snapshot() {
        let message = ServerMessage::Hello {
            server_tick: 900,
            tick_rate: 60,
            player_id: PlayerId(9),
            resume: Snapshot::new(900, 11, sample_state(), true),
        };

        let data = message.encode().unwrap();
        match ServerMessage::decode(&data).unwrap() {
            ServerMessage::Hello {
                server_tick,
                tick_rate,
                player_id,
                resume,
            } => {
                assert_eq!(server_tick, 900);
                assert_eq!(tick_rate, 60);
                assert_eq!(player_id, PlayerId(9));
                assert_eq!(resume.tick, 12);
                assert_eq!(resume.last_processed_seq, 11);
                assert!(resume.verify());
            }
            other => panic!("Wrong record after decode: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result = ServerMessage::decode(&[0xff, 0xff, 0xff, 0xff, 0x01]);
        assert!(matches!(result, Err(NetcodeError::MalformedMessage(_))));

        let result = ClientMessage::decode(&[]);
        assert!(matches!(result, Err(NetcodeError::MalformedMessage(_))));
    }

    #[test]
    fn test_oversized_datagram_is_malformed() {
        let data = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        assert!(matches!(
            ClientMessage::decode(&data),
            Err(NetcodeError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_snapshot_hash_verification() {
        let mut snapshot = Snapshot::new(5, 3, sample_state(), true);
        assert!(snapshot.verify());

        snapshot.state.x += 1.0;
        assert!(!snapshot.verify());

        let mut reordered = Snapshot::new(5, 3, sample_state(), true);
        reordered.last_processed_seq = 4;
        assert!(!reordered.verify());

        let mut retimed = Snapshot::new(5, 3, sample_state(), true);
        retimed.tick += 1;
        assert!(!retimed.verify());

        let mut clock_only = Snapshot::new(5, 3, sample_state(), true);
        clock_only.server_tick = 99;
        assert!(clock_only.verify());

        let unhashed = Snapshot::new(5, 3, sample_state(), false);
        assert_eq!(unhashed.hash, None);
        assert!(unhashed.verify());
    }
}
