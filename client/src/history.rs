//! Bounded client-side histories used for reconciliation.
//!
//! Both buffers are append-only in tick/sequence order and evict their oldest
//! entry once full, so memory stays fixed no matter how long a session runs.

use shared::{InputCommand, Seq, SimState, Tick};
use std::collections::VecDeque;

/// Inputs sent to the server but not yet confirmed by a snapshot.
#[derive(Debug, Clone)]
pub struct InputHistory {
    buffer: VecDeque<InputCommand>,
    capacity: usize,
}

impl InputHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a command, returning the evicted oldest one when full.
    pub fn push(&mut self, cmd: InputCommand) -> Option<InputCommand> {
        self.buffer.push_back(cmd);
        if self.buffer.len() > self.capacity {
            self.buffer.pop_front()
        } else {
            None
        }
    }

    /// Drops every command with `seq <= confirmed`. Returns how many went.
    pub fn prune_through(&mut self, confirmed: Seq) -> usize {
        let before = self.buffer.len();
        while self
            .buffer
            .front()
            .map_or(false, |cmd| cmd.seq <= confirmed)
        {
            self.buffer.pop_front();
        }
        before - self.buffer.len()
    }

    /// Commands still awaiting confirmation after `confirmed`, oldest first.
    pub fn unconfirmed_after(&self, confirmed: Seq) -> impl Iterator<Item = &InputCommand> {
        self.buffer.iter().filter(move |cmd| cmd.seq > confirmed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputCommand> {
        self.buffer.iter()
    }

    pub fn oldest_seq(&self) -> Option<Seq> {
        self.buffer.front().map(|cmd| cmd.seq)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// What the client predicted its state to be at one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedFrame {
    pub tick: Tick,
    pub state: SimState,
}

#[derive(Debug, Clone)]
pub struct FrameHistory {
    buffer: VecDeque<PredictedFrame>,
    capacity: usize,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: PredictedFrame) -> Option<PredictedFrame> {
        self.buffer.push_back(frame);
        if self.buffer.len() > self.capacity {
            self.buffer.pop_front()
        } else {
            None
        }
    }

    pub fn get(&self, tick: Tick) -> Option<&PredictedFrame> {
        self.buffer
            .binary_search_by_key(&tick, |frame| frame.tick)
            .ok()
            .and_then(|index| self.buffer.get(index))
    }

    /// Removes frames at or after `tick`.
    pub fn truncate_from(&mut self, tick: Tick) -> usize {
        let keep = self.buffer.partition_point(|frame| frame.tick < tick);
        let removed = self.buffer.len() - keep;
        self.buffer.truncate(keep);
        removed
    }

    /// Removes frames strictly before `tick`.
    pub fn discard_before(&mut self, tick: Tick) -> usize {
        let stale = self.buffer.partition_point(|frame| frame.tick < tick);
        self.buffer.drain(..stale);
        stale
    }

    pub fn latest(&self) -> Option<&PredictedFrame> {
        self.buffer.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PredictedFrame> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
