//! Frame counter that drives envelope, length counter, and sweep units.
//!
//! The frame counter operates at approximately 240Hz (NTSC) or 200Hz (PAL)
//! and provides timing signals for the other APU components.

use serde::{Deserialize, Serialize};

use super::timing::TimingMode;

/// Frame counter component.
///
/// Provides timing signals for:
/// - Envelope generators and the triangle linear counter (quarter frames)
/// - Length counters and sweep units (half frames)
///
/// Supports two modes, each a six-entry schedule of step lengths:
/// - 4-step: Q H Q - H - with the frame IRQ raised on the last three steps
/// - 5-step: Q H Q - H - with no IRQ, and a longer fourth step
///
/// A $4017 write changes mode and IRQ inhibit immediately, but resets the
/// sequence one or two cycles later depending on CPU/APU cycle parity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameCounter {
    pub irq_inhibit: bool,
    /// false = 4-step, true = 5-step
    pub five_step: bool,
    pub irq_pending: bool,
    /// Step that fires when `counter` reaches zero (0-5)
    step: u8,
    counter: u16,
    odd: bool,
    delay: bool,
    delay_counter: u8,
}

impl FrameCounter {
    /// Create a new frame counter for the specified timing mode
    pub fn new(timing: TimingMode) -> Self {
        Self {
            irq_inhibit: false,
            five_step: false,
            irq_pending: false,
            step: 0,
            counter: timing.frame_period(false, 0),
            odd: false,
            delay: false,
            delay_counter: 0,
        }
    }

    pub fn power(&mut self, timing: TimingMode) {
        *self = Self::new(timing);
    }

    /// True when a half-frame clock lands on this cycle, so a length
    /// counter write must wait until after it.
    pub fn length_clocking(&self) -> bool {
        self.counter == 1 && (self.step == 1 || self.step == 4)
    }

    fn raise_irq(&mut self) {
        if !self.five_step && !self.irq_inhibit {
            self.irq_pending = true;
        }
    }

    /// Clock the frame counter for one CPU cycle.
    /// Returns (quarter_frame, half_frame) signals; a half frame also
    /// clocks everything a quarter frame does.
    pub fn main(&mut self, timing: TimingMode) -> (bool, bool) {
        let mut quarter = false;
        let mut half = false;

        if self.delay && self.delay_counter <= 1 {
            self.delay = false;
            self.delay_counter = 0;
            self.step = 0;
            self.counter = timing.frame_period(self.five_step, 0);
            if self.five_step {
                quarter = true;
                half = true;
            }
        } else {
            if self.delay {
                self.delay_counter -= 1;
            }

            self.counter = self.counter.wrapping_sub(1);
            if self.counter == 0 {
                match self.step {
                    0 | 2 => quarter = true,
                    1 => half = true,
                    3 | 5 => self.raise_irq(),
                    _ => {
                        half = true;
                        self.raise_irq();
                    }
                }
                self.step = if self.step >= 5 { 0 } else { self.step + 1 };
                self.counter = timing.frame_period(self.five_step, self.step);
            }
        }

        self.odd = !self.odd;
        (quarter || half, half)
    }

    /// Write to the frame counter control register ($4017)
    pub fn write(&mut self, value: u8) {
        self.five_step = (value & 0x80) != 0;
        self.irq_inhibit = (value & 0x40) != 0;

        if self.irq_inhibit {
            self.irq_pending = false;
        }

        self.delay = true;
        self.delay_counter = if self.odd { 2 } else { 1 };
    }

    /// Check if IRQ is pending
    pub fn is_irq_pending(&self) -> bool {
        self.irq_pending
    }

    /// Clear the IRQ flag ($4015 read)
    pub fn clear_irq(&mut self) {
        self.irq_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cycle numbers (1-based) of quarter-only, half and IRQ-raising cycles.
    fn schedule(fc: &mut FrameCounter, cycles: u32) -> (Vec<u32>, Vec<u32>, Vec<u32>) {
        let (mut quarters, mut halves, mut irqs) = (Vec::new(), Vec::new(), Vec::new());
        for cycle in 1..=cycles {
            let (q, h) = fc.main(TimingMode::Ntsc);
            if h {
                halves.push(cycle);
            } else if q {
                quarters.push(cycle);
            }
            if fc.irq_pending {
                irqs.push(cycle);
                fc.clear_irq();
            }
        }
        (quarters, halves, irqs)
    }

    #[test]
    fn four_step_ntsc_schedule() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        let (q, h, irq) = schedule(&mut fc, 29830 + 7457);
        assert_eq!(q, vec![7457, 22371, 29830 + 7457]);
        assert_eq!(h, vec![14913, 29829]);
        assert_eq!(irq, vec![29828, 29829, 29830]);
    }

    #[test]
    fn irq_inhibit_suppresses_and_clears() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        for _ in 0..29830 {
            fc.main(TimingMode::Ntsc);
        }
        assert!(fc.is_irq_pending());

        fc.write(0x40);
        assert!(!fc.is_irq_pending());
        let (_, _, irq) = schedule(&mut fc, 40000);
        assert!(irq.is_empty());
    }

    #[test]
    fn five_step_write_clocks_immediately() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        fc.write(0x80);
        // Even cycle: the reset lands on the next clock.
        assert_eq!(fc.main(TimingMode::Ntsc), (true, true));

        let (q, h, irq) = schedule(&mut fc, 37282);
        assert_eq!(q, vec![7457, 22371]);
        assert_eq!(h, vec![14913, 37281]);
        assert!(irq.is_empty());
    }

    #[test]
    fn write_on_odd_cycle_waits_an_extra_clock() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        fc.main(TimingMode::Ntsc);
        fc.write(0x80);
        assert_eq!(fc.main(TimingMode::Ntsc), (false, false));
        assert_eq!(fc.main(TimingMode::Ntsc), (true, true));
    }

    #[test]
    fn four_step_write_does_not_clock() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        fc.write(0x00);
        assert_eq!(fc.main(TimingMode::Ntsc), (false, false));
    }

    #[test]
    fn length_clocking_flags_the_cycle_before_a_half_frame() {
        let mut fc = FrameCounter::new(TimingMode::Ntsc);
        for cycle in 1..=29830u32 {
            let flagged = fc.length_clocking();
            let (_, half) = fc.main(TimingMode::Ntsc);
            assert_eq!(flagged, half, "cycle {cycle}");
        }
    }

    #[test]
    fn pal_steps_are_longer() {
        let mut fc = FrameCounter::new(TimingMode::Pal);
        let mut first = 0;
        for cycle in 1..=10_000u32 {
            if fc.main(TimingMode::Pal).0 {
                first = cycle;
                break;
            }
        }
        assert_eq!(first, 8313);
    }
}
