//! MIDI transcription of the APU's register state.
//!
//! Every channel recomputes the note it *should* be playing each cycle
//! (`calculate_midi`) and separately diffs that against what it last sent
//! (`generate_midi`). Output is paced so that the stream fits a real
//! 31.25 kbaud MIDI cable.
//!
//! ## Components
//!
//! - **message**: status constants, `MidiMessage`, the `MidiSink` trait
//! - **emitter**: `MidiOut`, the redundancy-filtering path to the sink
//! - **state**: `MidiState`, per-channel desired/last-sent bookkeeping
//! - **tuning**: `MidiTuning`, the empirically chosen constants
//! - **samples**: `SampleLibrary`, DMC sample hash to instrument mapping

pub mod emitter;
pub mod message;
pub mod samples;
pub mod state;
pub mod tuning;

pub use emitter::MidiOut;
pub use message::{MidiMessage, MidiSink, NullMidiSink};
pub use samples::{SampleDescriptor, SampleLibrary, SampleLibraryError};
pub use state::{MidiState, WHEEL_CENTER};
pub use tuning::MidiTuning;

/// Clock the pitch formulas are expressed against. The transcription uses
/// the NTSC clock for both regions.
pub const PITCH_CLOCK_HZ: f64 = 1_789_773.0;

/// Continuous MIDI pitch (A0 = 21 = 27.5 Hz) of a timer that divides the CPU
/// clock by `divider * (period + 1)`. Pulse uses 16, triangle 32.
pub fn period_to_note(divider: f64, period: u16) -> f64 {
    let f = PITCH_CLOCK_HZ / (divider * (period as f64 + 1.0));
    12.0 * (f / 27.5).log2() + 21.0
}
