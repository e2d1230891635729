//! Famicom APU emulation with live MIDI transcription.
//!
//! The [`apu`] module is a cycle-stepped model of the console's sound chip.
//! The [`midi`] module turns its register state into a MIDI stream as it
//! plays.

pub mod apu;
pub mod logging;
pub mod midi;

pub use apu::{Apu, ApuBus, ApuConfig, MemoryBus, StateError, TimingMode};
pub use midi::{MidiMessage, MidiSink, MidiTuning, NullMidiSink, SampleLibrary};
