//! Empirically tuned constants of the transcription heuristics.
//!
//! None of these come from the hardware. They trade MIDI bandwidth against
//! how closely the transcription tracks the chip, and can be overridden from a
//! JSON file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiTuning {
    /// APU cycles one 3-byte message occupies on a 31.25 kbaud cable.
    pub cycles_per_message: u32,
    /// Cycles to wait after a period register write before sampling the period.
    pub period_write_settle: u32,
    /// Cycles after note-on during which the pulse duty (and so the MIDI
    /// channel) is still allowed to follow the register.
    pub duty_hysteresis_cycles: u32,
    /// Cycles after a DMC start before the sample is hashed.
    pub dmc_settle_cycles: u32,
    /// Pitch movement in semitones that forces a new note.
    pub retrigger_threshold: f64,
    /// Pitch-bend range in semitones either side of the sounding note.
    pub bend_range: f64,
    /// Bends smaller than this many semitones are snapped to zero.
    pub bend_deadband: f64,
    /// Velocity byte of pulse and triangle note-ons; loudness travels in CC 7.
    pub note_on_velocity: u8,
    pub triangle_velocity: u8,
    pub pulse_velocity_offset: f64,
    pub pulse_velocity_scale: f64,
    pub noise_velocity_scale: f64,
    /// Let odd noise periods pick the second bass drum (36) and snare (40).
    pub alternate_drums: bool,
}

impl Default for MidiTuning {
    fn default() -> Self {
        Self {
            cycles_per_message: 1715,
            period_write_settle: 256,
            duty_hysteresis_cycles: 131_072,
            dmc_settle_cycles: 16,
            retrigger_threshold: 0.8,
            bend_range: 2.0,
            bend_deadband: 0.15,
            note_on_velocity: 96,
            triangle_velocity: 96,
            pulse_velocity_offset: 24.0,
            pulse_velocity_scale: 384.0,
            noise_velocity_scale: 384.0,
            alternate_drums: false,
        }
    }
}

impl MidiTuning {
    /// Pulse velocity from envelope volume, following the pulse DAC curve.
    pub fn pulse_velocity(&self, volume: u8) -> u8 {
        if volume == 0 {
            return 0;
        }
        let v = self.pulse_velocity_offset
            + self.pulse_velocity_scale * 95.88 / (8128.0 / (volume as f64 * 2.0) + 100.0);
        v.clamp(0.0, 127.0) as u8
    }

    /// Noise velocity from envelope volume, following the noise DAC curve.
    pub fn noise_velocity(&self, volume: u8) -> u8 {
        if volume == 0 {
            return 0;
        }
        let v = self.noise_velocity_scale * 159.79
            / (100.0 + 1.0 / (volume as f64 / 12241.0));
        v.clamp(0.0, 127.0) as u8
    }
}
