//! Client-side prediction of the local player.
//!
//! Every local step builds an [`InputCommand`], records it, and applies it
//! immediately with the shared step function, so the player's own actions are
//! visible without waiting for the server. The caller transmits the returned
//! command fire-and-forget.

use crate::history::{FrameHistory, InputHistory, PredictedFrame};
use log::debug;
use shared::{step, InputCommand, NetcodeConfig, PlayerId, Seq, SimState, Snapshot, Tick};

pub struct Predictor {
    player_id: PlayerId,
    config: NetcodeConfig,
    state: SimState,
    next_seq: Seq,
    /// Highest sequence the server has confirmed through a snapshot.
    confirmed_seq: Seq,
    inputs: InputHistory,
    frames: FrameHistory,
}

impl Predictor {
    pub fn new(player_id: PlayerId, config: NetcodeConfig) -> Self {
        let capacity = config.max_client_history_frames;
        Self {
            player_id,
            config,
            state: SimState::new(player_id),
            next_seq: 1,
            confirmed_seq: 0,
            inputs: InputHistory::new(capacity),
            frames: FrameHistory::new(capacity),
        }
    }

    /// Restarts prediction from an authoritative snapshot, dropping all
    /// history. Used after every hello.
    pub fn reset(&mut self, resume: &Snapshot) {
        self.state = resume.state;
        self.confirmed_seq = resume.last_processed_seq;
        self.next_seq = resume.last_processed_seq.wrapping_add(1);
        self.inputs.clear();
        self.frames.clear();
        debug!(
            "Prediction reset to tick {} (next seq {})",
            self.state.tick, self.next_seq
        );
    }

    /// Predicts one local step and returns the command to transmit.
    ///
    /// `dt_ms` is the measured frame time, recorded in the command for
    /// diagnostics; the simulation always advances by the fixed tick interval.
    pub fn step(&mut self, move_x: f32, move_y: f32, buttons: u8, dt_ms: f32) -> InputCommand {
        let cmd = InputCommand {
            player_id: self.player_id,
            seq: self.next_seq,
            tick: self.state.tick.wrapping_add(1),
            dt_ms,
            move_x,
            move_y,
            buttons,
        };
        self.next_seq = self.next_seq.wrapping_add(1);

        if let Some(evicted) = self.inputs.push(cmd) {
            debug!(
                "Input history full, dropped unconfirmed seq {}",
                evicted.seq
            );
        }
        self.apply(&cmd);

        cmd
    }

    /// Applies a command on top of the current state and records the frame.
    pub(crate) fn apply(&mut self, cmd: &InputCommand) {
        self.state = step(&self.state, cmd, self.config.tick_dt());
        self.frames.push(PredictedFrame {
            tick: self.state.tick,
            state: self.state,
        });
    }

    pub(crate) fn adopt(&mut self, state: SimState) {
        self.state = state;
    }

    pub(crate) fn confirm(&mut self, seq: Seq) {
        self.confirmed_seq = self.confirmed_seq.max(seq);
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut InputHistory {
        &mut self.inputs
    }

    pub(crate) fn frames_mut(&mut self) -> &mut FrameHistory {
        &mut self.frames
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn config(&self) -> &NetcodeConfig {
        &self.config
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn tick(&self) -> Tick {
        self.state.tick
    }

    pub fn next_seq(&self) -> Seq {
        self.next_seq
    }

    pub fn confirmed_seq(&self) -> Seq {
        self.confirmed_seq
    }

    pub fn input_history(&self) -> &InputHistory {
        &self.inputs
    }

    pub fn frames(&self) -> &FrameHistory {
        &self.frames
    }
}
