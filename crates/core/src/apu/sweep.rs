//! Frequency sweep unit for the pulse channels.
//!
//! The sweep unit owns the pulse channel's 11-bit timer period. It can shift
//! the period up or down every few half frames, and it mutes the channel
//! whenever the current period is too low or the next target would overflow.

use serde::{Deserialize, Serialize};

/// Sweep unit that automatically adjusts the pulse period over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sweep {
    /// Shift amount (0-7)
    pub shift: u8,
    /// Negate flag: false = raise period (lower pitch), true = lower it
    pub decrement: bool,
    /// Divider period (0-7)
    pub period: u8,
    /// Divider counter
    pub counter: u8,
    /// Whether sweep is enabled
    pub enable: bool,
    /// Reload flag, set by every $4001/$4005 write
    pub reload: bool,
    /// The channel's 11-bit timer period
    pub pulse_period: u16,
}

impl Default for Sweep {
    fn default() -> Self {
        Self::new()
    }
}

impl Sweep {
    pub fn new() -> Self {
        Self {
            shift: 0,
            decrement: false,
            period: 0,
            counter: 1,
            enable: false,
            reload: false,
            pulse_period: 0,
        }
    }

    /// Register write: `EPPP NSSS`
    pub fn write(&mut self, data: u8) {
        self.shift = data & 0x07;
        self.decrement = data & 0x08 != 0;
        self.period = (data >> 4) & 0x07;
        self.enable = data & 0x80 != 0;
        self.reload = true;
    }

    /// False when the channel must be muted.
    pub fn check_period(&self) -> bool {
        if self.pulse_period < 0x008 {
            return false;
        }
        if !self.decrement {
            let target = self.pulse_period + (self.pulse_period >> self.shift);
            if target & 0x800 != 0 {
                return false;
            }
        }
        true
    }

    /// Half-frame clock. `channel` is 0 for pulse 1, whose negate is one's
    /// complement, and 1 for pulse 2.
    pub fn clock(&mut self, channel: u32) {
        self.counter = self.counter.wrapping_sub(1);
        if self.counter == 0 {
            self.counter = self.period + 1;
            if self.enable && self.shift > 0 && self.check_period() {
                let delta = self.pulse_period >> self.shift;
                if self.decrement {
                    self.pulse_period -= delta;
                    if channel == 0 {
                        self.pulse_period = self.pulse_period.wrapping_sub(1);
                    }
                } else {
                    self.pulse_period += delta;
                }
                self.pulse_period &= 0x7FF;
            }
        }

        if self.reload {
            self.reload = false;
            self.counter = self.period + 1;
        }
    }
}
