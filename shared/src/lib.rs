//! Definitions shared by the authoritative server and the predicting client:
//! the deterministic step function, the data model, wire records, tunables and
//! the error taxonomy.

pub mod config;
pub mod error;
pub mod protocol;
pub mod sim;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use config::NetcodeConfig;
pub use error::NetcodeError;
pub use protocol::{ClientMessage, ServerMessage, Snapshot};
pub use sim::{step, InputCommand, SimState};

/// Per-player input sequence number. Zero means nothing has been processed.
pub type Seq = u32;

/// Simulation step counter.
pub type Tick = u32;

/// Stable player identity issued by the external authentication service.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wall-clock milliseconds since the Unix epoch, for ping/pong only.
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
