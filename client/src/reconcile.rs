//! Reconciliation of local prediction with authoritative snapshots.
//!
//! Each snapshot is checked against the frame predicted for the same tick. A
//! match only prunes confirmed inputs. A mismatch rolls the predictor back to
//! the snapshot and resimulates every input the server has not yet consumed.

use crate::predictor::Predictor;
use log::{debug, warn};
use shared::error::{NetcodeError, Result};
use shared::{InputCommand, NetcodeConfig, Snapshot, Tick};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Snapshot for another player, or not newer than what was already seen.
    Ignored,
    /// Prediction matched; confirmed inputs were pruned.
    Confirmed { pruned: usize },
    /// Prediction diverged; state was rolled back and inputs replayed.
    Corrected {
        from_tick: Tick,
        replayed: usize,
        /// Distance the current predicted position moved.
        correction: f32,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub confirmed: u64,
    pub corrected: u64,
    pub ignored: u64,
}

pub struct Reconciler {
    eps_pos: f32,
    eps_vel: f32,
    stats: ReconcileStats,
}

impl Reconciler {
    pub fn new(config: &NetcodeConfig) -> Self {
        Self {
            eps_pos: config.eps_pos,
            eps_vel: config.eps_vel,
            stats: ReconcileStats::default(),
        }
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    pub fn on_snapshot(
        &mut self,
        predictor: &mut Predictor,
        snapshot: &Snapshot,
    ) -> Result<Reconciliation> {
        if snapshot.state.player_id != predictor.player_id() {
            self.stats.ignored += 1;
            return Ok(Reconciliation::Ignored);
        }

        if !snapshot.verify() {
            return Err(NetcodeError::MalformedMessage(format!(
                "snapshot hash mismatch at tick {}",
                snapshot.tick
            )));
        }

        // The server only changes a player's state by consuming inputs, so a
        // snapshot that confirms nothing new carries nothing new.
        if snapshot.last_processed_seq <= predictor.confirmed_seq() {
            self.stats.ignored += 1;
            return Ok(Reconciliation::Ignored);
        }

        let diverged = match predictor.frames().get(snapshot.tick) {
            Some(frame) => frame
                .state
                .diverges_from(&snapshot.state, self.eps_pos, self.eps_vel),
            None => true,
        };

        if !diverged {
            predictor.confirm(snapshot.last_processed_seq);
            let pruned = predictor
                .inputs_mut()
                .prune_through(snapshot.last_processed_seq);
            predictor.frames_mut().discard_before(snapshot.tick);
            self.stats.confirmed += 1;
            return Ok(Reconciliation::Confirmed { pruned });
        }

        Ok(self.roll_back(predictor, snapshot))
    }

    fn roll_back(&mut self, predictor: &mut Predictor, snapshot: &Snapshot) -> Reconciliation {
        let before = *predictor.state();

        predictor.frames_mut().clear();
        predictor.adopt(snapshot.state);
        predictor.confirm(snapshot.last_processed_seq);
        predictor
            .inputs_mut()
            .prune_through(snapshot.last_processed_seq);

        if let Some(oldest) = predictor.input_history().oldest_seq() {
            if oldest > snapshot.last_processed_seq + 1 {
                warn!(
                    "Resimulating without inputs {}..{}, evicted from history",
                    snapshot.last_processed_seq + 1,
                    oldest
                );
            }
        }

        let pending: Vec<InputCommand> = predictor
            .input_history()
            .unconfirmed_after(snapshot.last_processed_seq)
            .copied()
            .collect();
        for cmd in &pending {
            predictor.apply(cmd);
        }

        let correction = before.position_error(predictor.state());
        self.stats.corrected += 1;
        debug!(
            "Rolled back to tick {} (seq {}), replayed {} inputs, corrected by {:.4}",
            snapshot.tick,
            snapshot.last_processed_seq,
            pending.len(),
            correction
        );

        Reconciliation::Corrected {
            from_tick: snapshot.tick,
            replayed: pending.len(),
            correction,
        }
    }
}
