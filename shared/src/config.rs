//! Tunables shared by the server and the client.

use crate::error::{NetcodeError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetcodeConfig {
    /// Simulation steps per second on both sides.
    pub tick_rate_hz: u32,
    /// Snapshot cadence in server ticks, decoupled from the tick rate.
    pub snapshot_every_n_ticks: u32,
    /// Capacity of each player's server-side input queue.
    pub max_buffered_inputs_per_player: usize,
    /// Capacity of the client's input history and predicted frame history.
    pub max_client_history_frames: usize,
    pub eps_pos: f32,
    pub eps_vel: f32,
    /// Server ticks a sequence gap may persist before the missing inputs are
    /// treated as "no input".
    pub gap_timeout_ticks: u32,
    /// Attach an integrity hash to every snapshot.
    pub snapshot_hashes: bool,
}

impl Default for NetcodeConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            snapshot_every_n_ticks: 2,
            max_buffered_inputs_per_player: 256,
            max_client_history_frames: 120,
            eps_pos: 0.02,
            eps_vel: 0.05,
            gap_timeout_ticks: 8,
            snapshot_hashes: true,
        }
    }
}

impl NetcodeConfig {
    /// Fixed simulation step in seconds.
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate_hz as f32
    }

    pub fn tick_dt_ms(&self) -> f32 {
        1000.0 / self.tick_rate_hz as f32
    }

    pub fn tick_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz))
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 1000 {
            return Err(NetcodeError::InvalidConfig(format!(
                "tick rate must be within 1..=1000 Hz, got {}",
                self.tick_rate_hz
            )));
        }
        if self.snapshot_every_n_ticks == 0 {
            return Err(NetcodeError::InvalidConfig(
                "snapshot cadence must be at least one tick".to_string(),
            ));
        }
        if self.max_buffered_inputs_per_player == 0 {
            return Err(NetcodeError::InvalidConfig(
                "server input queue needs a non-zero capacity".to_string(),
            ));
        }
        if self.max_client_history_frames == 0 {
            return Err(NetcodeError::InvalidConfig(
                "client history needs a non-zero capacity".to_string(),
            ));
        }
        if !(self.eps_pos.is_finite() && self.eps_pos >= 0.0)
            || !(self.eps_vel.is_finite() && self.eps_vel >= 0.0)
        {
            return Err(NetcodeError::InvalidConfig(format!(
                "divergence epsilons must be finite and non-negative, got pos={} vel={}",
                self.eps_pos, self.eps_vel
            )));
        }
        Ok(())
    }
}
