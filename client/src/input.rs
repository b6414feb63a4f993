//! Headless input sources for the client loop
//!
//! Rendering and device input live outside this crate, so the binary drives
//! prediction from a scripted pattern sampled once per local step.

use clap::ValueEnum;
use rand::Rng;
use shared::sim::buttons;
use shared::Tick;

/// Movement pattern sampled every local step
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputPattern {
    /// No movement at all
    Idle,
    /// Constant push to the right
    Line,
    /// Steers in a circle
    Circle,
    /// Alternates left and right every second
    Zigzag,
    /// Random axis changes, held for a few ticks
    Random,
}

/// One sampled input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledInput {
    pub move_x: f32,
    pub move_y: f32,
    pub buttons: u8,
}

/// Produces a [`SampledInput`] for each tick of a given pattern
pub struct InputScript {
    pattern: InputPattern,
    tick_rate: u32,
    held: SampledInput,
    hold_remaining: u32,
}

impl InputScript {
    pub fn new(pattern: InputPattern, tick_rate: u32) -> Self {
        Self {
            pattern,
            tick_rate: tick_rate.max(1),
            held: SampledInput {
                move_x: 0.0,
                move_y: 0.0,
                buttons: 0,
            },
            hold_remaining: 0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Follows a tick rate adopted from the server.
    pub fn set_tick_rate(&mut self, tick_rate: u32) {
        self.tick_rate = tick_rate.max(1);
    }

    pub fn sample(&mut self, tick: Tick) -> SampledInput {
        let seconds = tick as f32 / self.tick_rate as f32;

        match self.pattern {
            InputPattern::Idle => SampledInput {
                move_x: 0.0,
                move_y: 0.0,
                buttons: 0,
            },
            InputPattern::Line => SampledInput {
                move_x: 1.0,
                move_y: 0.0,
                buttons: 0,
            },
            InputPattern::Circle => SampledInput {
                move_x: seconds.cos(),
                move_y: seconds.sin(),
                buttons: 0,
            },
            InputPattern::Zigzag => {
                let right = (tick / self.tick_rate) % 2 == 0;
                SampledInput {
                    move_x: if right { 1.0 } else { -1.0 },
                    move_y: 0.0,
                    buttons: if tick % self.tick_rate == 0 {
                        buttons::JUMP
                    } else {
                        0
                    },
                }
            }
            InputPattern::Random => {
                if self.hold_remaining == 0 {
                    let mut rng = rand::thread_rng();
                    self.held = SampledInput {
                        move_x: rng.gen_range(-1.0..=1.0),
                        move_y: rng.gen_range(-1.0..=1.0),
                        buttons: if rng.gen_bool(0.1) { buttons::PRIMARY } else { 0 },
                    };
                    self.hold_remaining = rng.gen_range(5..30);
                }
                self.hold_remaining -= 1;
                self.held
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_and_line() {
        let mut idle = InputScript::new(InputPattern::Idle, 60);
        let mut line = InputScript::new(InputPattern::Line, 60);
        assert_eq!(idle.sample(10).move_x, 0.0);
        assert_eq!(line.sample(10).move_x, 1.0);
    }

    #[test]
    fn test_zigzag_switches_every_second() {
        let mut script = InputScript::new(InputPattern::Zigzag, 60);
        assert_eq!(script.sample(0).move_x, 1.0);
        assert_eq!(script.sample(0).buttons, buttons::JUMP);
        assert_eq!(script.sample(59).move_x, 1.0);
        assert_eq!(script.sample(60).move_x, -1.0);
        assert_eq!(script.sample(120).move_x, 1.0);
    }

    #[test]
    fn test_random_stays_in_range() {
        let mut script = InputScript::new(InputPattern::Random, 60);
        for tick in 0..1_000 {
            let input = script.sample(tick);
            assert!((-1.0..=1.0).contains(&input.move_x));
            assert!((-1.0..=1.0).contains(&input.move_y));
        }
    }

    #[test]
    fn test_tick_rate_change_rescales_zigzag() {
        let mut script = InputScript::new(InputPattern::Zigzag, 60);
        assert_eq!(script.sample(45).move_x, 1.0);

        script.set_tick_rate(30);
        assert_eq!(script.tick_rate(), 30);
        assert_eq!(script.sample(45).move_x, -1.0);

        script.set_tick_rate(0);
        assert_eq!(script.tick_rate(), 1);
    }

    #[test]
    fn test_circle_is_unit_length() {
        let mut script = InputScript::new(InputPattern::Circle, 60);
        let input = script.sample(45);
        let length = (input.move_x * input.move_x + input.move_y * input.move_y).sqrt();
        assert!((length - 1.0).abs() < 1e-5);
    }
}
