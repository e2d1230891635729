//! Length counter used by pulse, triangle, and noise channels.
//!
//! The length counter provides automatic note duration control. Writes to the
//! halt flag or the reload index that land on the same cycle as a half-frame
//! clock are buffered and committed after that clock, as on hardware.

use serde::{Deserialize, Serialize};

/// NES length counter lookup table.
///
/// This table is indexed by a 5-bit value (0-31) and returns the length counter value.
/// The counter is clocked at half the frame counter rate (~120Hz NTSC, ~100Hz PAL).
pub const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

/// Length counter component.
///
/// Automatically decrements and can be halted. When it reaches zero,
/// the associated channel is silenced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LengthCounter {
    /// Current counter value
    pub counter: u8,
    /// Halt flag (when true, counter doesn't decrement)
    pub halt: bool,
    /// Enabled flag (when false, counter is held at 0)
    pub enable: bool,

    delay_halt: bool,
    new_halt: bool,

    delay_counter: bool,
    counter_index: u8,
}

impl LengthCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Power-on / reset. Both clear the counter and any pending write.
    pub fn power(&mut self) {
        *self = Self::new();
    }

    /// Half-frame clock: count down unless halted or disabled.
    pub fn main(&mut self) {
        if !self.halt && self.enable && self.counter > 0 {
            self.counter -= 1;
        }
    }

    /// Commit writes that raced a half-frame clock. Called once per cycle,
    /// after the frame counter has run.
    pub fn commit(&mut self) {
        if self.delay_halt {
            self.delay_halt = false;
            self.halt = self.new_halt;
        }
        if self.delay_counter {
            self.delay_counter = false;
            self.load(self.counter_index);
        }
    }

    /// $4015 enable bit. Disabling clears the counter immediately.
    pub fn set_enable(&mut self, enable: bool) {
        self.enable = enable;
        if !enable {
            self.counter = 0;
        }
    }

    pub fn set_halt(&mut self, length_clocking: bool, halt: bool) {
        if length_clocking {
            self.delay_halt = true;
            self.new_halt = halt;
        } else {
            self.halt = halt;
        }
    }

    /// Reload from `LENGTH_TABLE`; `index` is the top five bits of the write.
    pub fn set_counter(&mut self, length_clocking: bool, index: u8) {
        if !self.enable {
            return;
        }
        if length_clocking {
            self.delay_counter = true;
            self.counter_index = index & 0x1F;
        } else {
            self.load(index);
        }
    }

    fn load(&mut self, index: u8) {
        if self.enable {
            self.counter = LENGTH_TABLE[(index & 0x1F) as usize];
        }
    }

    /// Check if the counter is non-zero (channel should be active)
    pub fn is_active(&self) -> bool {
        self.counter > 0
    }
}
