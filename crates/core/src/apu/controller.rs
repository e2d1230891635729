//! The APU proper: five channels, the frame counter and the mixer behind the
//! $4000-$4017 register window, plus the MIDI transcription that runs
//! alongside the audio.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::bus::ApuBus;
use super::dmc::DmcChannel;
use super::frame_counter::FrameCounter;
use super::mixer::Mixer;
use super::noise::NoiseChannel;
use super::pulse::PulseChannel;
use super::timing::TimingMode;
use super::triangle::TriangleChannel;
use crate::logging::{log, LogCategory, LogLevel};
use crate::midi::message::{
    CC_ALL_NOTES_OFF, CC_PAN, CC_RESET_ALL_CONTROLLERS, CC_VOLUME, NOTE_OFF,
};
use crate::midi::{MidiOut, MidiSink, MidiState, MidiTuning, SampleLibrary};

const STATE_VERSION: u64 = 1;
const STATE_SYSTEM: &str = "famicom-apu";

/// Cycles between MIDI bandwidth reports.
const BPS_REPORT_CYCLES: u32 = 1_789_773;

/// General MIDI programs for the four pulse duty cycles.
const DUTY_PROGRAMS: [u8; 4] = [81, 63, 80, 87];

const PULSE1_PAN: u8 = 0x28;
const PULSE2_PAN: u8 = 0x58;

const TRIANGLE_CHANNEL: u8 = 8;
const TRIANGLE_PROGRAM: u8 = 33;
const TRIANGLE_VOLUME: u8 = 0x48;
const NOISE_CHANNEL: u8 = 9;
const NOISE_VOLUME: u8 = 0x60;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("unsupported save state version {0}")]
    Version(u64),
    #[error("save state belongs to {0:?}")]
    System(String),
    #[error("save state is missing {0:?}")]
    MissingField(&'static str),
    #[error("malformed save state: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApuConfig {
    pub timing: TimingMode,
    pub tuning: MidiTuning,
    /// Where unmapped DMC samples are written as PCM, if anywhere.
    pub sample_dump_dir: Option<PathBuf>,
}

/// Famicom APU with MIDI transcription.
///
/// The host calls [`Apu::main`] once per CPU cycle and routes $4000-$4017
/// through [`Apu::read_io`] / [`Apu::write_io`]. Everything the APU needs from
/// the host comes in through the `ApuBus` argument of those calls.
pub struct Apu<M: MidiSink> {
    pub pulse1: PulseChannel,
    pub pulse2: PulseChannel,
    pub triangle: TriangleChannel,
    pub noise: NoiseChannel,
    pub dmc: DmcChannel,
    pub frame: FrameCounter,
    mixer: Mixer,
    midi: MidiOut<M>,
    samples: SampleLibrary,
    tuning: MidiTuning,
    timing: TimingMode,
    sample_dump_dir: Option<PathBuf>,
    irq_line: bool,
    bps_cycles: u32,
}

impl<M: MidiSink> Apu<M> {
    pub fn new(config: ApuConfig, sink: M) -> Self {
        let mut samples = SampleLibrary::new();
        samples.set_dump_dir(config.sample_dump_dir.clone());
        Self {
            pulse1: PulseChannel::new(),
            pulse2: PulseChannel::new(),
            triangle: TriangleChannel::new(),
            noise: NoiseChannel::new(),
            dmc: DmcChannel::new(config.timing),
            frame: FrameCounter::new(config.timing),
            mixer: Mixer::new(),
            midi: MidiOut::new(sink),
            samples,
            tuning: config.tuning,
            timing: config.timing,
            sample_dump_dir: config.sample_dump_dir,
            irq_line: false,
            bps_cycles: 0,
        }
    }

    pub fn timing(&self) -> TimingMode {
        self.timing
    }

    pub fn tuning(&self) -> &MidiTuning {
        &self.tuning
    }

    pub fn set_tuning(&mut self, tuning: MidiTuning) {
        self.tuning = tuning;
    }

    pub fn samples(&self) -> &SampleLibrary {
        &self.samples
    }

    /// Replace the DMC sample library. The configured dump directory carries
    /// over.
    pub fn set_samples(&mut self, mut library: SampleLibrary) {
        library.set_dump_dir(self.sample_dump_dir.clone());
        self.samples = library;
    }

    /// Load the DMC sample library from a JSON file. A missing or malformed
    /// file is logged and leaves the DMC without MIDI; audio is unaffected.
    pub fn load_samples<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let path = path.as_ref();
        match SampleLibrary::load(path) {
            Ok(library) => {
                let count = library.len();
                log(LogCategory::DMC, LogLevel::Info, || {
                    format!("dmc: {count} samples loaded from {}", path.display())
                });
                self.set_samples(library);
                true
            }
            Err(e) => {
                log(LogCategory::DMC, LogLevel::Warn, || {
                    format!("dmc: no sample library from {}: {e}", path.display())
                });
                self.set_samples(SampleLibrary::new());
                false
            }
        }
    }

    pub fn midi_out(&self) -> &MidiOut<M> {
        &self.midi
    }

    pub fn midi_out_mut(&mut self) -> &mut MidiOut<M> {
        &mut self.midi
    }

    pub fn sink(&self) -> &M {
        self.midi.sink()
    }

    pub fn sink_mut(&mut self) -> &mut M {
        self.midi.sink_mut()
    }

    pub fn into_sink(self) -> M {
        self.midi.into_sink()
    }

    /// Level of the IRQ output as last driven onto the bus.
    pub fn irq_line(&self) -> bool {
        self.irq_line
    }

    /// Power-on: every unit back to its initial state, MIDI receiver
    /// re-initialised, IRQ line driven low.
    pub fn power<B: ApuBus + ?Sized>(&mut self, bus: &mut B) {
        self.pulse1.power();
        self.pulse2.power();
        self.triangle.power();
        self.noise.power();
        self.dmc.power(self.timing);
        self.frame.power(self.timing);

        self.midi_init();
        self.bps_cycles = 0;
        self.midi.take_bps_messages();

        self.irq_line = self.frame.irq_pending || self.dmc.irq_pending;
        bus.apu_line(self.irq_line);

        let timing = self.timing;
        let samples = self.samples.len();
        log(LogCategory::APU, LogLevel::Info, || {
            format!("apu: power ({timing:?}, {samples} dmc samples mapped)")
        });
    }

    /// Silence the receiver before the APU goes away.
    pub fn unload(&mut self) {
        self.midi_reset();
    }

    /// Run one CPU cycle and return the mixed sample.
    pub fn main<B: ApuBus + ?Sized>(&mut self, bus: &mut B) -> f64 {
        let pulse1 = self.pulse1.clock();
        let pulse2 = self.pulse2.clock();
        let triangle = self.triangle.clock();
        let noise = self.noise.clock(self.timing);
        let dmc = self.dmc.clock(self.timing, bus);

        let (quarter, half) = self.frame.main(self.timing);
        if half {
            self.clock_half_frame();
        } else if quarter {
            self.clock_quarter_frame();
        }

        // Length writes that raced the half-frame clock land now.
        self.pulse1.length.commit();
        self.pulse2.length.commit();
        self.triangle.length.commit();
        self.noise.length.commit();

        self.update_irq(bus);

        let sample = self.mixer.mix(pulse1, pulse2, triangle, noise, dmc);

        self.generate_midi(bus);

        self.bps_cycles += 1;
        if self.bps_cycles >= BPS_REPORT_CYCLES {
            self.bps_cycles = 0;
            let messages = self.midi.take_bps_messages();
            log(LogCategory::MIDI, LogLevel::Debug, || {
                format!("midi: {} bps", messages as u64 * 30)
            });
        }

        sample
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.envelope.clock();
        self.pulse2.envelope.clock();
        self.triangle.clock_linear_length();
        self.noise.envelope.clock();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.length.main();
        self.pulse1.sweep.clock(0);
        self.pulse2.length.main();
        self.pulse2.sweep.clock(1);
        self.triangle.length.main();
        self.noise.length.main();

        self.clock_quarter_frame();
    }

    fn update_irq<B: ApuBus + ?Sized>(&mut self, bus: &mut B) {
        let level = self.frame.irq_pending || self.dmc.irq_pending;
        if level != self.irq_line {
            self.irq_line = level;
            bus.apu_line(level);
        }
    }

    /// Register read. Only $4015 is readable; it acknowledges the frame IRQ.
    pub fn read_io<B: ApuBus + ?Sized>(&mut self, addr: u16, bus: &mut B) -> u8 {
        if addr != 0x4015 {
            log(LogCategory::Bus, LogLevel::Trace, || {
                format!("apu: read of write-only ${addr:04X}")
            });
            return bus.open_bus();
        }

        let mut data = 0u8;
        data |= self.pulse1.length.is_active() as u8;
        data |= (self.pulse2.length.is_active() as u8) << 1;
        data |= (self.triangle.length.is_active() as u8) << 2;
        data |= (self.noise.length.is_active() as u8) << 3;
        data |= ((self.dmc.length_counter > 0) as u8) << 4;
        data |= (self.frame.irq_pending as u8) << 6;
        data |= (self.dmc.irq_pending as u8) << 7;

        self.frame.clear_irq();
        self.update_irq(bus);

        data
    }

    /// Register write.
    pub fn write_io<B: ApuBus + ?Sized>(&mut self, addr: u16, data: u8, bus: &mut B) {
        let lc = self.frame.length_clocking();
        let settle = self.tuning.period_write_settle;

        match addr {
            0x4000 => self.pulse1.write_control(data, lc),
            0x4001 => self.pulse1.write_sweep(data),
            0x4002 => self.pulse1.write_timer_low(data, settle),
            0x4003 => self.pulse1.write_timer_high(data, lc, settle),

            0x4004 => self.pulse2.write_control(data, lc),
            0x4005 => self.pulse2.write_sweep(data),
            0x4006 => self.pulse2.write_timer_low(data, settle),
            0x4007 => self.pulse2.write_timer_high(data, lc, settle),

            0x4008 => self.triangle.write_linear(data, lc),
            0x400A => self.triangle.write_timer_low(data, settle),
            0x400B => self.triangle.write_timer_high(data, lc, settle),

            0x400C => self.noise.write_control(data, lc),
            0x400E => self.noise.write_period(data),
            0x400F => self.noise.write_length(data, lc),

            0x4010 => {
                self.dmc.write_control(data);
                self.update_irq(bus);
            }
            0x4011 => self.dmc.write_dac(data),
            0x4012 => self.dmc.write_address(data),
            0x4013 => self.dmc.write_length(data),

            0x4015 => {
                self.pulse1.length.set_enable(data & 0x01 != 0);
                self.pulse2.length.set_enable(data & 0x02 != 0);
                self.triangle.length.set_enable(data & 0x04 != 0);
                self.noise.length.set_enable(data & 0x08 != 0);
                if data & 0x10 != 0 {
                    self.dmc.start();
                } else {
                    self.dmc.stop();
                }
                self.dmc.irq_pending = false;
                self.update_irq(bus);
            }

            0x4017 => {
                log(LogCategory::FrameCounter, LogLevel::Trace, || {
                    format!(
                        "frame: {}-step, irq {}",
                        if data & 0x80 != 0 { 5 } else { 4 },
                        if data & 0x40 != 0 { "inhibited" } else { "enabled" }
                    )
                });
                self.frame.write(data);
                self.update_irq(bus);
            }

            _ => log(LogCategory::Bus, LogLevel::Trace, || {
                format!("apu: ignored write ${addr:04X} = {data:02X}")
            }),
        }
    }

    /// Address the host's DMA unit should read next.
    pub fn dmc_dma_address(&self) -> u16 {
        self.dmc.dma_address()
    }

    /// Hand the DMC the byte its last DMA request fetched.
    pub fn set_dma_buffer<B: ApuBus + ?Sized>(&mut self, data: u8, bus: &mut B) {
        self.dmc.set_dma_buffer(data);
        self.update_irq(bus);
    }

    /// Recompute every channel's desired note, then let each emit in
    /// priority order so percussion is not starved by the melodic voices.
    pub fn generate_midi<B: ApuBus + ?Sized>(&mut self, bus: &mut B) {
        let tuning = &self.tuning;

        self.pulse1.calculate_midi(tuning);
        self.pulse2.calculate_midi(tuning);
        self.triangle.calculate_midi(tuning);
        self.noise.calculate_midi(tuning);
        self.dmc
            .calculate_midi(bus, &mut self.samples, &self.mixer, tuning);

        self.dmc.generate_midi(&mut self.midi, tuning);
        self.noise.generate_midi(&mut self.midi, tuning);
        self.triangle.generate_midi(&mut self.midi, tuning);
        self.pulse1.generate_midi(&mut self.midi, tuning);
        self.pulse2.generate_midi(&mut self.midi, tuning);
    }

    /// Silence the receiver and assign each voice its channels, programs,
    /// volumes and pans.
    pub fn midi_init(&mut self) {
        self.midi_reset();

        self.pulse1.midi = MidiState::new();
        self.pulse2.midi = MidiState::new();
        self.triangle.midi = MidiState::new();
        self.noise.midi = MidiState::new();
        self.dmc.midi = MidiState::new();
        self.midi.clear_cache();

        let out = &mut self.midi;
        for (duty, &program) in DUTY_PROGRAMS.iter().enumerate() {
            let chan1 = duty as u8;
            let chan2 = duty as u8 + 4;
            self.pulse1.midi.chans[duty] = chan1;
            self.pulse2.midi.chans[duty] = chan2;

            for (chan, pan) in [(chan1, PULSE1_PAN), (chan2, PULSE2_PAN)] {
                out.delay();
                out.program(chan, program);
                out.delay();
                out.cc(chan, CC_VOLUME, 0);
                out.delay();
                out.cc(chan, CC_PAN, pan);
            }
        }

        self.triangle.midi.chans[0] = TRIANGLE_CHANNEL;
        out.delay();
        out.program(TRIANGLE_CHANNEL, TRIANGLE_PROGRAM);
        out.delay();
        out.cc(TRIANGLE_CHANNEL, CC_VOLUME, TRIANGLE_VOLUME);
        out.delay();
        out.cc(TRIANGLE_CHANNEL, CC_PAN, 0x40);

        self.noise.midi.chans[0] = NOISE_CHANNEL;
        out.delay();
        out.program(NOISE_CHANNEL, 0);
        out.delay();
        out.cc(NOISE_CHANNEL, CC_VOLUME, NOISE_VOLUME);

        out.reset_messages();
    }

    /// Note-off for whatever is sounding, then all-notes-off and
    /// reset-all-controllers on every channel.
    pub fn midi_reset(&mut self) {
        let out = &mut self.midi;

        for pulse in [&mut self.pulse1.midi, &mut self.pulse2.midi] {
            if pulse.last_note_on != 0 {
                for &chan in &pulse.chans {
                    out.emit(NOTE_OFF | chan, pulse.last_note_on, 0);
                }
                pulse.last_note_on = 0;
            }
        }
        for voice in [&mut self.triangle.midi, &mut self.noise.midi] {
            if voice.last_note_on != 0 {
                out.emit(NOTE_OFF | voice.note_chan, voice.last_note_on, 0);
                voice.last_note_on = 0;
            }
        }
        let dmc = &mut self.dmc.midi;
        if dmc.last_note_on != 0 {
            out.emit(NOTE_OFF | dmc.last_chan, dmc.last_note_on, 0);
            dmc.last_note_on = 0;
        }

        // The receiver's state is unknown from here on.
        out.clear_cache();
        for chan in 0..16 {
            out.delay();
            out.cc(chan, CC_ALL_NOTES_OFF, 0);
            out.delay();
        }
        for chan in 0..16 {
            out.delay();
            out.cc(chan, CC_RESET_ALL_CONTROLLERS, 0);
            out.delay();
            out.delay();
            out.delay();
        }

        out.reset_messages();
    }

    /// Register and counter state as JSON. DAC tables, the MIDI emitter
    /// cache and the sample library are rebuilt rather than saved.
    pub fn save_state(&self) -> Value {
        serde_json::json!({
            "version": STATE_VERSION,
            "system": STATE_SYSTEM,
            "timing": self.timing,
            "pulse1": self.pulse1,
            "pulse2": self.pulse2,
            "triangle": self.triangle,
            "noise": self.noise,
            "dmc": self.dmc,
            "frame": self.frame,
            "irq_line": self.irq_line,
        })
    }

    /// Restore a state written by [`Apu::save_state`] and drive the restored
    /// IRQ level onto `bus`. Nothing changes unless the whole state parses.
    pub fn load_state<B: ApuBus + ?Sized>(
        &mut self,
        v: &Value,
        bus: &mut B,
    ) -> Result<(), StateError> {
        let version = v["version"].as_u64().unwrap_or(0);
        if version != STATE_VERSION {
            return Err(StateError::Version(version));
        }
        let system = v["system"].as_str().unwrap_or("");
        if system != STATE_SYSTEM {
            return Err(StateError::System(system.to_string()));
        }

        let timing: TimingMode = field(v, "timing")?;
        let pulse1: PulseChannel = field(v, "pulse1")?;
        let pulse2: PulseChannel = field(v, "pulse2")?;
        let triangle: TriangleChannel = field(v, "triangle")?;
        let noise: NoiseChannel = field(v, "noise")?;
        let dmc: DmcChannel = field(v, "dmc")?;
        let frame: FrameCounter = field(v, "frame")?;
        let irq_line: bool = field(v, "irq_line")?;

        self.timing = timing;
        self.pulse1 = pulse1;
        self.pulse2 = pulse2;
        self.triangle = triangle;
        self.noise = noise;
        self.dmc = dmc;
        self.frame = frame;
        self.irq_line = irq_line;
        bus.apu_line(irq_line);
        self.midi.clear_cache();
        Ok(())
    }
}

fn field<T: DeserializeOwned>(v: &Value, name: &'static str) -> Result<T, StateError> {
    let value = v.get(name).ok_or(StateError::MissingField(name))?;
    Ok(serde_json::from_value(value.clone())?)
}
