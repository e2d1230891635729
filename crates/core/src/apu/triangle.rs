//! Triangle wave generator.
//!
//! The triangle channel produces a quantized triangle wave with 32 steps and
//! has no volume control. It is gated by both the length counter and its own
//! linear counter; when either runs out the sequencer freezes and keeps
//! outputting its current step.

use serde::{Deserialize, Serialize};

use super::length_counter::LengthCounter;
use crate::midi::message::{NOTE_OFF, NOTE_ON, PITCH_BEND};
use crate::midi::{period_to_note, MidiOut, MidiSink, MidiState, MidiTuning};

/// Triangle channel that generates triangle wave samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleChannel {
    pub length: LengthCounter,
    /// Linear counter reload value (7-bit)
    pub linear_length: u8,
    pub linear_length_counter: u8,
    pub reload_linear: bool,
    /// 11-bit timer period
    pub period: u16,
    period_counter: u16,
    /// Position in the 32-step sequence
    step_counter: u8,
    pub midi: MidiState,
}

impl TriangleChannel {
    pub fn new() -> Self {
        Self {
            length: LengthCounter::new(),
            linear_length: 0,
            linear_length_counter: 0,
            reload_linear: false,
            period: 0,
            period_counter: 1,
            step_counter: 16,
            midi: MidiState::new(),
        }
    }

    pub fn power(&mut self) {
        self.length.power();
        self.period_counter = 1;
        self.linear_length = 0;
        self.period = 0;
        self.step_counter = 16;
        self.linear_length_counter = 0;
        self.reload_linear = false;
    }

    /// Quarter-frame clock of the linear counter.
    pub fn clock_linear_length(&mut self) {
        if self.reload_linear {
            self.linear_length_counter = self.linear_length;
        } else if self.linear_length_counter > 0 {
            self.linear_length_counter -= 1;
        }

        // The control flag doubles as length halt and keeps the reload armed.
        if !self.length.halt {
            self.reload_linear = false;
        }
    }

    /// Clock one CPU cycle, returning the raw 4-bit output.
    pub fn clock(&mut self) -> u8 {
        let mut result = self.step_counter & 0x0F;
        if self.step_counter & 0x10 == 0 {
            result ^= 0x0F;
        }
        if self.length.counter == 0 || self.linear_length_counter == 0 {
            return result;
        }

        self.period_counter = self.period_counter.wrapping_sub(1);
        if self.period_counter == 0 {
            self.step_counter = (self.step_counter + 1) & 0x1F;
            self.period_counter = self.period + 1;
        }

        result
    }

    /// $4008: `CRRR RRRR`
    pub fn write_linear(&mut self, data: u8, length_clocking: bool) {
        self.linear_length = data & 0x7F;
        self.length.set_halt(length_clocking, data & 0x80 != 0);
    }

    /// $400A
    pub fn write_timer_low(&mut self, data: u8, settle: u32) {
        self.period = (self.period & 0x0700) | data as u16;
        self.midi.period_write_countdown = settle;
    }

    /// $400B
    pub fn write_timer_high(&mut self, data: u8, length_clocking: bool, settle: u32) {
        self.period = (self.period & 0x00FF) | (((data & 7) as u16) << 8);
        self.midi.period_write_countdown = settle;

        self.reload_linear = true;
        self.length.set_counter(length_clocking, data >> 3);
    }

    pub fn calculate_midi(&mut self, tuning: &MidiTuning) {
        let m = &mut self.midi;
        if m.period_write_countdown > 0 {
            m.period_write_countdown -= 1;
            return;
        }

        m.note_chan = m.chans[0];
        m.note_vel = tuning.triangle_velocity;

        if self.length.counter == 0 || self.linear_length_counter == 0 || self.period <= 1 {
            m.note_on = 0;
            return;
        }

        let n = period_to_note(32.0, self.period);
        if n > 127.0 {
            m.note_on = 0;
            return;
        }
        m.apply_note_wheel(n, tuning);
    }

    /// Note on/off and pitch bend only; the triangle has no volume to follow.
    pub fn generate_midi<M: MidiSink>(&mut self, out: &mut MidiOut<M>, tuning: &MidiTuning) {
        let m = &mut self.midi;
        if m.rate_limit(tuning.cycles_per_message) {
            return;
        }
        let before = out.messages();

        if m.note_on != m.last_note_on {
            if m.last_note_on != 0 {
                out.emit(NOTE_OFF | m.note_chan, m.last_note_on, 0);
                m.last_note_on = 0;
                m.last_freq = 0.0;
            }
            if m.note_on != 0 {
                out.emit(NOTE_ON | m.note_chan, m.note_on, tuning.note_on_velocity);
                m.last_note_on = m.note_on;
                m.last_chan = m.note_chan;
                m.last_freq = m.note_freq;
            }
        }

        if m.note_on != 0 && m.note_wheel != m.last_wheel {
            out.emit(
                PITCH_BEND | m.note_chan,
                (m.note_wheel & 0x7F) as u8,
                ((m.note_wheel >> 7) & 0x7F) as u8,
            );
            m.last_wheel = m.note_wheel;
            m.last_freq = m.note_freq;
        }

        m.rate_control(out.messages().wrapping_sub(before));
    }
}

impl Default for TriangleChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiMessage;

    fn sounding(period: u16) -> TriangleChannel {
        let mut t = TriangleChannel::new();
        t.length.set_enable(true);
        t.write_linear(0xFF, false); // control set, linear 127
        t.write_timer_low((period & 0xFF) as u8, 0);
        t.write_timer_high(0x08 | (period >> 8) as u8, false, 0);
        t.clock_linear_length();
        t.midi.chans[0] = 8;
        t
    }

    #[test]
    fn triangle_sequence_is_a_32_step_staircase() {
        let mut t = sounding(3);
        let mut seq = vec![t.clock()];
        for _ in 0..31 {
            let v = t.clock();
            for _ in 0..3 {
                assert_eq!(t.clock(), v);
            }
            seq.push(v);
        }
        let expected: Vec<u8> = (0..16).chain((0..16).rev()).collect();
        assert_eq!(seq, expected);
    }

    #[test]
    fn sequencer_freezes_without_linear_counter() {
        let mut t = sounding(0);
        for _ in 0..5 {
            t.clock();
        }
        let frozen = t.clock();
        t.linear_length_counter = 0;
        for _ in 0..100 {
            assert_eq!(t.clock(), t.clock());
        }
        assert_eq!(t.clock(), frozen + 1);
    }

    #[test]
    fn linear_counter_reload_and_countdown() {
        let mut t = TriangleChannel::new();
        t.write_linear(0x05, false); // control clear
        t.reload_linear = true;
        t.clock_linear_length();
        assert_eq!(t.linear_length_counter, 5);
        assert!(!t.reload_linear);
        t.clock_linear_length();
        assert_eq!(t.linear_length_counter, 4);
    }

    #[test]
    fn control_flag_keeps_reloading() {
        let mut t = TriangleChannel::new();
        t.write_linear(0x85, false);
        t.reload_linear = true;
        for _ in 0..10 {
            t.clock_linear_length();
            assert_eq!(t.linear_length_counter, 5);
        }
    }

    #[test]
    fn a4_on_channel_8() {
        let tuning = MidiTuning::default();
        let mut t = sounding(126);
        let mut out = MidiOut::new(Vec::<MidiMessage>::new());
        t.calculate_midi(&tuning);
        assert_eq!(t.midi.note_on, 69);
        assert_eq!(t.midi.note_vel, 96);

        t.generate_midi(&mut out, &tuning);
        assert_eq!(
            out.sink().as_slice(),
            &[
                MidiMessage::short(0x98, 69, 96),
                MidiMessage::short(0xE8, 0x00, 0x40),
            ]
        );
    }

    #[test]
    fn tiny_periods_are_silent() {
        let tuning = MidiTuning::default();
        for period in [0, 1, 2] {
            let mut t = sounding(period);
            t.calculate_midi(&tuning);
            assert_eq!(t.midi.note_on, 0, "period {period}");
        }
    }

    #[test]
    fn length_expiry_sends_note_off() {
        let tuning = MidiTuning {
            cycles_per_message: 0,
            ..MidiTuning::default()
        };
        let mut t = sounding(126);
        let mut out = MidiOut::new(Vec::<MidiMessage>::new());
        t.calculate_midi(&tuning);
        t.generate_midi(&mut out, &tuning);

        t.length.set_enable(false);
        t.calculate_midi(&tuning);
        t.generate_midi(&mut out, &tuning);
        assert_eq!(out.sink().last(), Some(&MidiMessage::short(0x88, 69, 0)));
    }
}
