//! Envelope generator for volume control.
//!
//! The envelope generator provides automatic volume fade-out for pulse and noise channels.

use serde::{Deserialize, Serialize};

/// Envelope generator component.
///
/// Provides automatic volume control with decay from 15 to 0.
/// Can also be used for constant volume mode, where `speed` is the volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Divider period, or the output volume in constant-volume mode (0-15)
    pub speed: u8,
    /// Constant-volume flag
    pub use_speed_as_volume: bool,
    /// Loop flag (restart decay at 15 when it reaches 0)
    pub loop_mode: bool,
    /// Start flag (set when a note is triggered)
    pub reload_decay: bool,
    /// Divider counter
    pub decay_counter: u8,
    /// Decay level (0-15)
    pub decay_volume: u8,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current output volume (0-15)
    pub fn volume(&self) -> u8 {
        if self.use_speed_as_volume {
            self.speed
        } else {
            self.decay_volume
        }
    }

    /// Quarter-frame clock (~240Hz NTSC)
    pub fn clock(&mut self) {
        if self.reload_decay {
            self.reload_decay = false;
            self.decay_volume = 15;
            self.decay_counter = self.speed;
        } else if self.decay_counter > 0 {
            self.decay_counter -= 1;
        } else {
            self.decay_counter = self.speed;
            if self.decay_volume > 0 {
                self.decay_volume -= 1;
            } else if self.loop_mode {
                self.decay_volume = 15;
            }
        }
    }

    /// Register write helper: `--LC VVVV`
    pub fn write(&mut self, data: u8) {
        self.speed = data & 0x0F;
        self.use_speed_as_volume = data & 0x10 != 0;
        self.loop_mode = data & 0x20 != 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_restart_sets_level_to_15() {
        let mut env = Envelope::new();
        env.speed = 1;
        env.reload_decay = true;
        env.clock();
        assert_eq!(env.volume(), 15);
        assert!(!env.reload_decay);
    }

    #[test]
    fn envelope_decays_to_zero() {
        let mut env = Envelope::new();
        env.reload_decay = true;
        env.clock();

        for _ in 0..16 {
            env.clock();
        }
        assert_eq!(env.volume(), 0);
    }

    #[test]
    fn envelope_loops_when_flag_set() {
        let mut env = Envelope::new();
        env.loop_mode = true;
        env.reload_decay = true;

        env.clock();
        assert_eq!(env.volume(), 15);

        for expected in (0..15).rev() {
            env.clock();
            assert_eq!(env.volume(), expected);
        }

        env.clock();
        assert_eq!(env.volume(), 15);
    }

    #[test]
    fn envelope_speed_controls_decay_rate() {
        let mut env = Envelope::new();
        env.speed = 2;
        env.reload_decay = true;
        env.clock(); // level = 15, divider = 2

        env.clock();
        assert_eq!(env.volume(), 15);
        env.clock();
        assert_eq!(env.volume(), 15);
        env.clock();
        assert_eq!(env.volume(), 14);
    }

    #[test]
    fn constant_volume_ignores_decay() {
        let mut env = Envelope::new();
        env.write(0x17); // constant volume 7
        env.reload_decay = true;
        for _ in 0..100 {
            env.clock();
            assert_eq!(env.volume(), 7);
        }
    }

    #[test]
    fn decay_is_monotonic_without_loop() {
        let mut env = Envelope::new();
        env.write(0x03);
        env.reload_decay = true;
        let mut last = 15;
        for _ in 0..200 {
            env.clock();
            assert!(env.volume() <= last);
            last = env.volume();
        }
        assert_eq!(last, 0);
    }
}
