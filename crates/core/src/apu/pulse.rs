//! Pulse (square wave) channel.
//!
//! Two of these sit in the APU. Each combines an envelope, a sweep unit (which
//! also holds the 11-bit timer period) and a length counter with an 8-step
//! duty sequencer.
//!
//! Alongside the waveform the channel tracks the MIDI note it corresponds to.
//! The duty cycle selects one of four MIDI channels, each patched to a
//! different lead sound, so a duty change is audible as a timbre change on the
//! synthesizer too.

use serde::{Deserialize, Serialize};

use super::envelope::Envelope;
use super::length_counter::LengthCounter;
use super::sweep::Sweep;
use crate::midi::message::{CC_VOLUME, CONTROL_CHANGE, NOTE_OFF, NOTE_ON, PITCH_BEND};
use crate::midi::{period_to_note, MidiOut, MidiSink, MidiState, MidiTuning};

/// Duty sequences, stepped from index 0 downwards (0, 7, 6, ... 1).
const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1], // 12.5%
    [0, 0, 0, 0, 0, 0, 1, 1], // 25%
    [0, 0, 0, 0, 1, 1, 1, 1], // 50%
    [1, 1, 1, 1, 1, 1, 0, 0], // 25% negated
];

/// Pulse channel that generates square wave samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseChannel {
    pub length: LengthCounter,
    pub envelope: Envelope,
    pub sweep: Sweep,
    /// Duty cycle (0-3): 12.5%, 25%, 50%, 75%
    pub duty: u8,
    /// Position in the duty sequence (0-7)
    pub duty_counter: u8,
    period_counter: u16,
    pub midi: MidiState,
}

impl PulseChannel {
    pub fn new() -> Self {
        Self {
            length: LengthCounter::new(),
            envelope: Envelope::new(),
            sweep: Sweep::new(),
            duty: 0,
            duty_counter: 0,
            period_counter: 1,
            midi: MidiState::new(),
        }
    }

    /// Power-on / reset. MIDI state is owned by the APU's `midi_init`.
    pub fn power(&mut self) {
        self.length.power();
        self.envelope = Envelope::new();
        self.sweep = Sweep::new();
        self.period_counter = 1;
        self.duty = 0;
        self.duty_counter = 0;
    }

    /// Clock one CPU cycle, returning the raw 4-bit output.
    pub fn clock(&mut self) -> u8 {
        if !self.sweep.check_period() || self.length.counter == 0 {
            return 0;
        }

        let high = DUTY_TABLE[(self.duty & 3) as usize][(self.duty_counter & 7) as usize] != 0;
        let result = if high { self.envelope.volume() } else { 0 };

        self.period_counter = self.period_counter.wrapping_sub(1);
        if self.period_counter == 0 {
            self.period_counter = (self.sweep.pulse_period + 1) * 2;
            self.duty_counter = self.duty_counter.wrapping_sub(1) & 7;
        }

        result
    }

    /// $4000/$4004: `DDLC VVVV`
    pub fn write_control(&mut self, data: u8, length_clocking: bool) {
        self.envelope.write(data);
        self.length.set_halt(length_clocking, data & 0x20 != 0);
        self.duty = data >> 6;
    }

    /// $4001/$4005
    pub fn write_sweep(&mut self, data: u8) {
        self.sweep.write(data);
    }

    /// $4002/$4006: timer low byte
    pub fn write_timer_low(&mut self, data: u8, settle: u32) {
        self.sweep.pulse_period = (self.sweep.pulse_period & 0x0700) | data as u16;
        self.midi.period_write_countdown = settle;
    }

    /// $4003/$4007: `LLLL LHHH`, restarts the sequencer and envelope
    pub fn write_timer_high(&mut self, data: u8, length_clocking: bool, settle: u32) {
        self.sweep.pulse_period = (self.sweep.pulse_period & 0x00FF) | (((data & 7) as u16) << 8);
        self.midi.period_write_countdown = settle;

        self.duty_counter = 0;
        self.envelope.reload_decay = true;
        self.length.set_counter(length_clocking, data >> 3);
    }

    /// Recompute the desired MIDI note, velocity and channel.
    pub fn calculate_midi(&mut self, tuning: &MidiTuning) {
        let m = &mut self.midi;

        // Period writes are split across two registers; let them settle.
        if m.period_write_countdown > 0 {
            m.period_write_countdown -= 1;
            return;
        }

        if !self.sweep.check_period() || self.length.counter == 0 {
            m.note_on = 0;
            m.clocks_since_note_on = 0;
            return;
        }

        let n = period_to_note(16.0, self.sweep.pulse_period);
        if n > 127.0 {
            m.note_on = 0;
            m.clocks_since_note_on = 0;
            return;
        }

        let held = m.note_on;
        m.apply_note_wheel(n, tuning);
        m.note_vel = tuning.pulse_velocity(self.envelope.volume());

        // Duty (and so MIDI channel) follows the register only for a while
        // after note-on, then switches at most once.
        if m.clocks_since_note_on > 0 {
            m.clocks_since_note_on = m.clocks_since_note_on.saturating_add(1);
        }
        if held == 0 || m.note_on != held {
            m.note_duty = self.duty & 3;
            m.note_chan = m.chans[m.note_duty as usize];
            m.clocks_since_note_on = 1;
        }

        if m.clocks_since_note_on < tuning.duty_hysteresis_cycles {
            m.note_duty = self.duty & 3;
        } else {
            m.note_chan = m.chans[m.note_duty as usize];
        }
    }

    /// Emit whatever moves the receiver from the last sent state to the
    /// desired one, unless the channel is still paying for its last burst.
    pub fn generate_midi<M: MidiSink>(&mut self, out: &mut MidiOut<M>, tuning: &MidiTuning) {
        let m = &mut self.midi;
        if m.rate_limit(tuning.cycles_per_message) {
            return;
        }
        let before = out.messages();
        let last_chan = m.last_chan;

        if m.last_note_on != 0 && m.note_vel == 0 && m.last_vel != 0 {
            out.emit(NOTE_OFF | m.last_chan, m.last_note_on, 0);
            m.last_note_on = 0;
            m.last_freq = 0.0;
            m.last_vel = 0;
        }

        if m.note_on != m.last_note_on || m.note_chan != m.last_chan {
            if m.last_note_on != 0 {
                out.emit(NOTE_OFF | m.last_chan, m.last_note_on, 0);
                m.last_note_on = 0;
                m.last_freq = 0.0;
            }
            if m.note_on != 0 && m.note_vel != 0 {
                out.emit(NOTE_ON | m.note_chan, m.note_on, tuning.note_on_velocity);
                m.last_note_on = m.note_on;
                m.last_chan = m.note_chan;
                m.last_freq = m.note_freq;
            }
        }

        if m.note_on != 0 && m.note_vel != 0 {
            if m.note_wheel != m.last_wheel || m.note_chan != last_chan {
                out.emit(
                    PITCH_BEND | m.note_chan,
                    (m.note_wheel & 0x7F) as u8,
                    ((m.note_wheel >> 7) & 0x7F) as u8,
                );
                m.last_wheel = m.note_wheel;
                m.last_freq = m.note_freq;
            }

            // Loudness travels as channel volume so it can change mid-note.
            if m.note_vel != m.last_vel || m.note_chan != last_chan {
                out.emit(CONTROL_CHANGE | m.note_chan, CC_VOLUME, m.note_vel);
                m.last_vel = m.note_vel;
            }
        }

        m.rate_control(out.messages().wrapping_sub(before));
    }
}

impl Default for PulseChannel {
    fn default() -> Self {
        Self::new()
    }
}
