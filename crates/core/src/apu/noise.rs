//! Noise channel with Linear Feedback Shift Register (LFSR).
//!
//! The noise channel generates pseudo-random noise for percussion and sound
//! effects. Its MIDI side does not attempt a pitch: each period index is
//! mapped onto a General MIDI drum.

use serde::{Deserialize, Serialize};

use super::envelope::Envelope;
use super::length_counter::LengthCounter;
use super::timing::TimingMode;
use crate::midi::message::{NOTE_OFF, NOTE_ON};
use crate::midi::{MidiOut, MidiSink, MidiState, MidiTuning};

/// Noise channel that generates pseudo-random noise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseChannel {
    pub length: LengthCounter,
    pub envelope: Envelope,
    /// Period index (0-15) into the region's period table
    pub period: u8,
    /// Short mode: feedback from bit 6 instead of bit 1 (93-step sequence)
    pub short_mode: bool,
    period_counter: u16,
    /// 15-bit Linear Feedback Shift Register
    lfsr: u16,
    pub midi: MidiState,
}

impl NoiseChannel {
    pub fn new() -> Self {
        Self {
            length: LengthCounter::new(),
            envelope: Envelope::new(),
            period: 0,
            short_mode: false,
            period_counter: 1,
            lfsr: 1,
            midi: MidiState::new(),
        }
    }

    pub fn power(&mut self) {
        self.length.power();
        self.envelope = Envelope::new();
        self.period_counter = 1;
        self.period = 0;
        self.short_mode = false;
        self.lfsr = 1;
    }

    /// Clock one CPU cycle, returning the raw 4-bit output.
    pub fn clock(&mut self, timing: TimingMode) -> u8 {
        if self.length.counter == 0 {
            return 0;
        }

        let result = if self.lfsr & 1 != 0 {
            self.envelope.volume()
        } else {
            0
        };

        self.period_counter = self.period_counter.wrapping_sub(1);
        if self.period_counter == 0 {
            self.step_lfsr();
            self.period_counter = timing.noise_period(self.period);
        }

        result
    }

    fn step_lfsr(&mut self) {
        let tap = if self.short_mode { 6 } else { 1 };
        let feedback = (self.lfsr ^ (self.lfsr >> tap)) & 1;
        self.lfsr = (self.lfsr >> 1) | (feedback << 14);
    }

    /// $400C: `--LC VVVV`
    pub fn write_control(&mut self, data: u8, length_clocking: bool) {
        self.envelope.write(data);
        self.length.set_halt(length_clocking, data & 0x20 != 0);
    }

    /// $400E: `M--- PPPP`
    pub fn write_period(&mut self, data: u8) {
        self.period = data & 0x0F;
        self.short_mode = data & 0x80 != 0;
    }

    /// $400F: `LLLL L---`
    pub fn write_length(&mut self, data: u8, length_clocking: bool) {
        self.envelope.reload_decay = true;
        self.length.set_counter(length_clocking, data >> 3);
    }

    /// General MIDI drum for a period index. With `alternate` the period's
    /// parity picks between two bass drums and two snares.
    fn drum_note(&self, alternate: bool) -> u8 {
        let p = self.period;
        let odd = if alternate { p & 1 } else { 0 };
        match p {
            0x0B..=0x0F => 35 + odd,        // bass drum
            0x06..=0x0A => 38 + (odd << 1), // snare
            0x04..=0x05 if p & 1 != 0 => 49,    // crash
            0x04..=0x05 => 57,
            0x02..=0x03 => 42, // closed hi-hat
            _ if self.envelope.use_speed_as_volume => 81,
            _ => 46, // open hi-hat
        }
    }

    /// Trigger a drum when the period changes or the volume rises; a decaying
    /// envelope alone never re-triggers.
    pub fn calculate_midi(&mut self, tuning: &MidiTuning) {
        let volume = self.envelope.volume();
        if self.length.counter == 0 || volume == 0 {
            let m = &mut self.midi;
            m.note_new = false;
            m.note_on = 0;
            m.note_vel = 0;
            m.last_period = self.period;
            m.last_cycle_volume = 0;
            return;
        }

        let note = self.drum_note(tuning.alternate_drums);
        let m = &mut self.midi;
        let trigger = self.period != m.last_period || volume > m.last_cycle_volume;
        m.last_period = self.period;
        m.last_cycle_volume = volume;
        if !trigger {
            return;
        }

        m.note_new = true;
        m.note_on = note;
        m.note_chan = m.chans[0];
        m.note_vel = tuning.noise_velocity(volume);
    }

    pub fn generate_midi<M: MidiSink>(&mut self, out: &mut MidiOut<M>, tuning: &MidiTuning) {
        let m = &mut self.midi;
        if m.rate_limit(tuning.cycles_per_message) {
            return;
        }
        let before = out.messages();

        if m.last_note_on != 0 && m.note_vel == 0 && m.last_vel != 0 {
            out.emit(NOTE_OFF | m.last_chan, m.last_note_on, 0);
            m.last_note_on = 0;
            m.last_vel = 0;
        }

        if m.note_on != m.last_note_on || m.note_vel != m.last_vel || m.note_new {
            if m.last_note_on != 0 {
                out.emit(NOTE_OFF | m.note_chan, m.last_note_on, 0);
                m.last_note_on = 0;
                m.last_vel = 0;
            }
            if m.note_on != 0 && m.note_vel != 0 {
                out.emit(NOTE_ON | m.note_chan, m.note_on, m.note_vel);
                m.last_chan = m.note_chan;
                m.last_note_on = m.note_on;
                m.last_vel = m.note_vel;
                m.note_new = false;
            }
        }

        m.rate_control(out.messages().wrapping_sub(before));
    }
}

impl Default for NoiseChannel {
    fn default() -> Self {
        Self::new()
    }
}
