//! Per-channel transcription state.
//!
//! Each channel keeps a desired MIDI state (`note_*`, recomputed every cycle
//! by the channel's `calculate_midi`) and the last state actually sent
//! (`last_*`, only touched by `generate_midi`). Emission is the diff between
//! the two, paced by a per-channel rate limiter.

use serde::{Deserialize, Serialize};

use super::tuning::MidiTuning;

/// Pitch-bend centre (no bend).
pub const WHEEL_CENTER: u16 = 8192;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MidiState {
    /// Force a re-articulation even if note and velocity are unchanged.
    pub note_new: bool,
    pub note_on: u8,
    pub note_chan: u8,
    pub note_vel: u8,
    /// 14-bit pitch bend
    pub note_wheel: u16,
    /// Continuous pitch in MIDI semitones
    pub note_freq: f64,
    pub note_duty: u8,
    pub clocks_since_note_on: u32,

    pub chan_program: u8,
    pub chan_volume: u8,

    pub last_note_on: u8,
    pub last_chan: u8,
    pub last_vel: u8,
    pub last_wheel: u16,
    pub last_freq: f64,

    pub period_write_countdown: u32,

    pub last_period: u8,
    pub last_cycle_volume: u8,

    pub last_address_latch: u8,
    pub last_length_latch: u8,
    pub last_length_counter: u16,

    pub triggered: bool,
    pub triggered_stop: bool,

    /// MIDI channel per pulse duty cycle; slot 0 for single-channel voices
    pub chans: [u8; 4],

    /// Messages sent in the last emission burst
    pub messages: u32,
    /// Cycles since the last emission burst
    pub clocks: u32,
}

impl MidiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the channel must stay quiet to pay for its last burst.
    ///
    /// A burst of `messages` messages buys `cycles_per_message * messages`
    /// cycles of silence.
    pub fn rate_limit(&mut self, cycles_per_message: u32) -> bool {
        let clocks = self.clocks;
        self.clocks = self.clocks.saturating_add(1);
        clocks < cycles_per_message.saturating_mul(self.messages)
    }

    /// Close an emission burst of `emitted` messages and restart the window.
    pub fn rate_control(&mut self, emitted: u32) {
        self.messages = emitted;
        self.clocks = 0;
    }

    /// Choose the MIDI note and pitch bend for continuous pitch `n`.
    ///
    /// A sounding note is kept, and the difference expressed as bend, until
    /// the pitch jumps by `retrigger_threshold` or drifts outside the bend
    /// range.
    pub fn apply_note_wheel(&mut self, n: f64, tuning: &MidiTuning) {
        let mut k = n.round();
        if self.note_on != 0 {
            let held = self.note_on as f64;
            if (n - self.note_freq).abs() < tuning.retrigger_threshold
                && (n - held).abs() < tuning.bend_range
            {
                k = held;
            }
        }

        let mut bend = n - k;
        if bend.abs() < tuning.bend_deadband {
            bend = 0.0;
        }

        self.note_on = k.clamp(0.0, 127.0) as u8;
        let wheel = WHEEL_CENTER as f64 + bend * (WHEEL_CENTER as f64 / tuning.bend_range);
        self.note_wheel = (wheel.clamp(0.0, 16383.0) as u16) & 0x3FFF;
        self.note_freq = n;
    }
}
