//! Authoritative simulation for one room.
//!
//! The room exclusively owns every player's [`SimState`]. Network tasks never
//! touch it; they hand inputs to [`Room::ingest_input`], which only queues
//! them. [`Room::tick`] is the sole place state changes, consuming each
//! player's queue strictly in sequence order.

use log::{debug, info, warn};
use shared::error::{NetcodeError, Result};
use shared::{step, InputCommand, NetcodeConfig, PlayerId, Seq, SimState, Snapshot, Tick};
use std::collections::{BTreeMap, VecDeque};

/// Outcome of a successful [`Room::ingest_input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
    /// Queue length after the insert.
    pub queued: usize,
    /// Oldest inputs dropped because the queue was full.
    pub evicted: usize,
}

/// Summary of one [`Room::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    /// Queued commands applied across all players.
    pub applied: usize,
    /// Missing sequences filled with neutral input after a gap timed out.
    pub gap_filled: usize,
    /// Players left waiting on a sequence gap this tick.
    pub stalled: Vec<PlayerId>,
}

#[derive(Debug, Default)]
struct Advance {
    applied: usize,
    gap_filled: usize,
    stalled: bool,
}

/// Server-side bookkeeping for one player.
#[derive(Debug)]
struct PlayerSlot {
    state: SimState,
    /// Highest sequence applied to `state`.
    current_seq: Seq,
    highest_accepted_seq: Seq,
    /// Pending inputs, kept sorted by sequence.
    queue: VecDeque<InputCommand>,
    /// Consecutive ticks the queue head has been blocked by a gap.
    gap_ticks: u32,
}

impl PlayerSlot {
    fn new(player_id: PlayerId) -> Self {
        Self {
            state: SimState::new(player_id),
            current_seq: 0,
            highest_accepted_seq: 0,
            queue: VecDeque::new(),
            gap_ticks: 0,
        }
    }

    fn apply(&mut self, cmd: &InputCommand, dt: f32) {
        self.state = step(&self.state, cmd, dt);
        self.current_seq = cmd.seq;
        if cmd.tick != self.state.tick {
            debug!(
                "Player {} seq {} predicted tick {} but simulated tick {}",
                self.state.player_id, cmd.seq, cmd.tick, self.state.tick
            );
        }
    }

    /// Drains every in-order command, filling a persistent gap once it has
    /// been blocked for `gap_timeout` ticks. At most `max_fill` neutral
    /// commands are synthesised per call.
    fn advance(&mut self, dt: f32, gap_timeout: u32, max_fill: usize) -> Advance {
        let mut advance = Advance::default();
        let mut fill_budget = max_fill;

        loop {
            let head_seq = match self.queue.front() {
                Some(head) => head.seq,
                None => {
                    self.gap_ticks = 0;
                    break;
                }
            };

            if head_seq <= self.current_seq {
                self.queue.pop_front();
                continue;
            }

            if head_seq == self.current_seq + 1 {
                if let Some(cmd) = self.queue.pop_front() {
                    self.apply(&cmd, dt);
                    advance.applied += 1;
                }
                self.gap_ticks = 0;
                continue;
            }

            if advance.gap_filled == 0 {
                self.gap_ticks = self.gap_ticks.saturating_add(1);
            }
            if self.gap_ticks < gap_timeout || fill_budget == 0 {
                advance.stalled = true;
                break;
            }

            let player_id = self.state.player_id;
            let dt_ms = dt * 1000.0;
            while self.current_seq + 1 < head_seq && fill_budget > 0 {
                let seq = self.current_seq + 1;
                let neutral =
                    InputCommand::neutral(player_id, seq, self.state.tick.wrapping_add(1), dt_ms);
                self.apply(&neutral, dt);
                advance.gap_filled += 1;
                fill_budget -= 1;
            }
        }

        advance
    }
}

/// One match's authoritative world: a player table plus the room clock.
pub struct Room {
    config: NetcodeConfig,
    tick: Tick,
    players: BTreeMap<PlayerId, PlayerSlot>,
}

impl Room {
    pub fn new(config: NetcodeConfig) -> Self {
        Self {
            config,
            tick: 0,
            players: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &NetcodeConfig {
        &self.config
    }

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    /// Registers a player, or resumes an existing one with an empty queue.
    /// Returns the snapshot the client should resume prediction from.
    pub fn join(&mut self, player_id: PlayerId) -> Snapshot {
        match self.players.get_mut(&player_id) {
            Some(slot) => {
                slot.queue.clear();
                slot.gap_ticks = 0;
                info!(
                    "Player {} rejoined at seq {} tick {}",
                    player_id, slot.current_seq, slot.state.tick
                );
            }
            None => {
                self.players.insert(player_id, PlayerSlot::new(player_id));
                info!("Player {} joined room at tick {}", player_id, self.tick);
            }
        }

        self.build_snapshot(player_id)
            .unwrap_or_else(|| Snapshot::new(self.tick, 0, SimState::new(player_id), false))
    }

    pub fn leave(&mut self, player_id: PlayerId) -> bool {
        if self.players.remove(&player_id).is_some() {
            info!("Player {} left room", player_id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.players.contains_key(&player_id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn state(&self, player_id: PlayerId) -> Option<&SimState> {
        self.players.get(&player_id).map(|slot| &slot.state)
    }

    pub fn current_seq(&self, player_id: PlayerId) -> Option<Seq> {
        self.players.get(&player_id).map(|slot| slot.current_seq)
    }

    pub fn highest_accepted_seq(&self, player_id: PlayerId) -> Option<Seq> {
        self.players
            .get(&player_id)
            .map(|slot| slot.highest_accepted_seq)
    }

    /// Sequences waiting in the player's queue, in application order.
    pub fn queued(&self, player_id: PlayerId) -> Vec<Seq> {
        self.players
            .get(&player_id)
            .map(|slot| slot.queue.iter().map(|cmd| cmd.seq).collect())
            .unwrap_or_default()
    }

    /// Validates and queues one input. Never mutates simulation state.
    pub fn ingest_input(&mut self, player_id: PlayerId, cmd: InputCommand) -> Result<Ingested> {
        let capacity = self.config.max_buffered_inputs_per_player;
        let slot = self
            .players
            .get_mut(&player_id)
            .ok_or(NetcodeError::UnknownPlayer(player_id))?;

        if cmd.player_id != player_id {
            return Err(NetcodeError::PlayerMismatch {
                expected: player_id,
                got: cmd.player_id,
            });
        }

        if cmd.seq <= slot.current_seq {
            return Err(NetcodeError::StaleInput {
                player_id,
                seq: cmd.seq,
                current: slot.current_seq,
            });
        }

        match slot.queue.binary_search_by_key(&cmd.seq, |queued| queued.seq) {
            Ok(_) => {
                return Err(NetcodeError::DuplicateInput {
                    player_id,
                    seq: cmd.seq,
                })
            }
            Err(position) => slot.queue.insert(position, cmd),
        }
        slot.highest_accepted_seq = slot.highest_accepted_seq.max(cmd.seq);

        let mut evicted = 0;
        while slot.queue.len() > capacity {
            slot.queue.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            warn!(
                "{}",
                NetcodeError::QueueOverflow {
                    player_id,
                    evicted
                }
            );
        }

        Ok(Ingested {
            queued: slot.queue.len(),
            evicted,
        })
    }

    /// Advances the room by one fixed step.
    ///
    /// Players are processed in ascending id order. Each player's transition is
    /// independent, so nothing one player sends can stall another.
    pub fn tick(&mut self) -> TickReport {
        self.tick = self.tick.wrapping_add(1);
        let dt = self.config.tick_dt();
        let gap_timeout = self.config.gap_timeout_ticks;
        let max_fill = self.config.max_buffered_inputs_per_player;

        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        for (player_id, slot) in self.players.iter_mut() {
            let advance = slot.advance(dt, gap_timeout, max_fill);
            if advance.gap_filled > 0 {
                warn!(
                    "Player {} sequence gap timed out, filled {} inputs with no input (now at seq {})",
                    player_id, advance.gap_filled, slot.current_seq
                );
            }
            if advance.stalled {
                report.stalled.push(*player_id);
            }
            report.applied += advance.applied;
            report.gap_filled += advance.gap_filled;
        }

        report
    }

    /// True on ticks where snapshots should go out.
    pub fn snapshot_due(&self) -> bool {
        self.tick % self.config.snapshot_every_n_ticks == 0
    }

    pub fn emit_snapshot(&self, player_id: PlayerId) -> Option<Snapshot> {
        self.build_snapshot(player_id)
    }

    /// Snapshots for every player, in ascending id order.
    pub fn emit_snapshots(&self) -> Vec<(PlayerId, Snapshot)> {
        self.players
            .keys()
            .filter_map(|id| self.build_snapshot(*id).map(|snapshot| (*id, snapshot)))
            .collect()
    }

    fn build_snapshot(&self, player_id: PlayerId) -> Option<Snapshot> {
        self.players.get(&player_id).map(|slot| {
            Snapshot::new(
                self.tick,
                slot.current_seq,
                slot.state,
                self.config.snapshot_hashes,
            )
        })
    }
}
