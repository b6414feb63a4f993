//! Deterministic per-player simulation shared by server and client.
//!
//! The server runs [`step`] when it consumes a player's input; the client runs
//! the very same function when predicting and when resimulating after a
//! rollback. Identical ordered inputs on an identical starting state therefore
//! produce bit-identical results on both sides.

use crate::{PlayerId, Seq, Tick};
use serde::{Deserialize, Serialize};

/// Acceleration applied per unit of input axis, in units per second squared.
pub const ACCELERATION: f32 = 20.0;

/// Button bit flags carried by [`InputCommand::buttons`].
pub mod buttons {
    pub const PRIMARY: u8 = 1 << 0;
    pub const SECONDARY: u8 = 1 << 1;
    pub const JUMP: u8 = 1 << 2;
    pub const SPRINT: u8 = 1 << 3;
}

/// One client input, created once per local simulation step.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct InputCommand {
    pub player_id: PlayerId,
    pub seq: Seq,
    /// Client-predicted tick this command produces.
    pub tick: Tick,
    /// Frame delta measured by the client. Diagnostics only; simulation always
    /// uses the fixed tick interval.
    pub dt_ms: f32,
    pub move_x: f32,
    pub move_y: f32,
    pub buttons: u8,
}

impl InputCommand {
    /// A command carrying no movement, used to fill sequence gaps.
    pub fn neutral(player_id: PlayerId, seq: Seq, tick: Tick, dt_ms: f32) -> Self {
        Self {
            player_id,
            seq,
            tick,
            dt_ms,
            move_x: 0.0,
            move_y: 0.0,
            buttons: 0,
        }
    }

    pub fn pressed(&self, button: u8) -> bool {
        self.buttons & button != 0
    }
}

/// Simulated state of one player.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct SimState {
    pub tick: Tick,
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl SimState {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            tick: 0,
            player_id,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
        }
    }

    /// Euclidean distance between the positions of two states.
    pub fn position_error(&self, other: &SimState) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn velocity_error(&self, other: &SimState) -> f32 {
        let dvx = self.vx - other.vx;
        let dvy = self.vy - other.vy;
        (dvx * dvx + dvy * dvy).sqrt()
    }

    /// True when position or velocity differ by more than the given epsilons.
    pub fn diverges_from(&self, other: &SimState, eps_pos: f32, eps_vel: f32) -> bool {
        self.position_error(other) > eps_pos || self.velocity_error(other) > eps_vel
    }

    /// Deterministic 64-bit FNV-1a digest over the exact bit patterns of the
    /// state, used as the snapshot integrity hash.
    pub fn hash(&self) -> u64 {
        let mut hasher = StateHasher::new();
        hasher.write_u32(self.tick);
        hasher.write_u64(self.player_id.0);
        hasher.write_u32(self.x.to_bits());
        hasher.write_u32(self.y.to_bits());
        hasher.write_u32(self.vx.to_bits());
        hasher.write_u32(self.vy.to_bits());
        hasher.finish()
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

pub(crate) struct StateHasher {
    state: u64,
}

impl StateHasher {
    pub(crate) fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= u64::from(*byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }

    pub(crate) fn finish(&self) -> u64 {
        self.state
    }
}

/// Clamps an input axis into [-1, 1]; NaN and infinities count as no input.
pub fn sanitize_axis(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Advances `state` by one fixed step of length `dt` seconds under `cmd`.
///
/// Operation order is fixed: velocity integrates first, then position, then
/// the tick counter. Extensions must keep a single order and must not branch on
/// float equality.
pub fn step(state: &SimState, cmd: &InputCommand, dt: f32) -> SimState {
    let ax = sanitize_axis(cmd.move_x) * ACCELERATION;
    let ay = sanitize_axis(cmd.move_y) * ACCELERATION;

    let vx = state.vx + ax * dt;
    let vy = state.vy + ay * dt;

    SimState {
        tick: state.tick.wrapping_add(1),
        player_id: state.player_id,
        x: state.x + vx * dt,
        y: state.y + vy * dt,
        vx,
        vy,
    }
}
