//! Famicom/NES APU (Audio Processing Unit) components.
//!
//! The sound half of the RP2A03 (NTSC) and RP2A07 (PAL): two pulse channels,
//! a triangle, a noise channel and the delta modulation channel, clocked by a
//! shared frame counter and summed by a non-linear mixer.
//!
//! ## Components
//!
//! - **Pulse Channel**: Square wave generator with duty cycle control
//! - **Triangle Channel**: Triangle wave generator
//! - **Noise Channel**: Pseudo-random noise generator using LFSR
//! - **DMC**: Delta-modulated sample playback via DMA
//! - **Length Counter**: Automatic note duration control
//! - **Envelope**: Volume envelope generator with decay
//! - **Sweep**: Pulse period sweep unit
//! - **Frame Counter**: Timing controller for envelope and length counter units
//! - **Mixer**: Resistor-ladder DAC tables
//!
//! ## Timing Support
//!
//! All components support both NTSC and PAL timing modes for accurate emulation
//! of regional console variants.

pub mod bus;
pub mod controller;
pub mod dmc;
pub mod envelope;
pub mod frame_counter;
pub mod length_counter;
pub mod mixer;
pub mod noise;
pub mod pulse;
pub mod sweep;
pub mod timing;
pub mod triangle;

pub use bus::{ApuBus, MemoryBus};
pub use controller::{Apu, ApuConfig, StateError};
pub use dmc::DmcChannel;
pub use envelope::Envelope;
pub use frame_counter::FrameCounter;
pub use length_counter::{LengthCounter, LENGTH_TABLE};
pub use mixer::Mixer;
pub use noise::NoiseChannel;
pub use pulse::PulseChannel;
pub use sweep::Sweep;
pub use timing::TimingMode;
pub use triangle::TriangleChannel;
