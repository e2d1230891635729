//! Delta Modulation Channel (DMC).
//!
//! The DMC plays 1-bit delta-encoded samples fetched from CPU memory by DMA.
//!
//! ## Features
//!
//! - 7-bit output level (0-127), stepped by ±2 per sample bit
//! - Sample playback from $C000-$FFFF via DMA requests to the host
//! - 16 sample rates per region
//! - Loop support
//! - IRQ on sample completion
//!
//! ## Register Interface
//!
//! - **$4010**: `IL-- RRRR` IRQ enable, loop, rate index
//! - **$4011**: `-DDD DDDD` direct load of the output level
//! - **$4012**: sample address ($C000 + address * 64)
//! - **$4013**: sample length (length * 16 + 1 bytes)
//!
//! ## MIDI
//!
//! A DMC sample is an arbitrary recording, so there is no pitch to extract.
//! Instead every freshly started sample is hashed (FNV-1a over its bytes) and
//! looked up in the `SampleLibrary`, which names the instrument and note.

use serde::{Deserialize, Serialize};

use super::bus::ApuBus;
use super::mixer::Mixer;
use super::timing::TimingMode;
use crate::logging::{log, LogCategory, LogLevel};
use crate::midi::message::{CC_VOLUME, NOTE_OFF, NOTE_ON};
use crate::midi::samples::fnv1a64;
use crate::midi::{MidiOut, MidiSink, MidiState, MidiTuning, SampleLibrary};

/// One delta-modulation bit applied to the 7-bit output level: a set bit
/// climbs by 2, a clear bit falls by 2, and steps that would leave 0..=127
/// are dropped.
pub fn delta_step(level: u8, bit: bool) -> u8 {
    if bit {
        if level <= 125 {
            level + 2
        } else {
            level
        }
    } else if level >= 2 {
        level - 2
    } else {
        level
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmcChannel {
    /// Bytes left to fetch; zero means idle
    pub length_counter: u16,
    pub irq_pending: bool,

    /// Rate index (0-15)
    pub period: u8,
    period_counter: u16,
    pub irq_enable: bool,
    pub loop_mode: bool,

    /// Output level (7-bit)
    pub dac_latch: u8,
    pub address_latch: u8,
    pub length_latch: u8,

    /// 15-bit offset of the next fetch within $8000-$FFFF
    read_address: u16,
    bit_counter: u8,

    dma_buffer_valid: bool,
    dma_buffer: u8,
    sample_valid: bool,
    sample: u8,

    dma_delay_counter: u8,
    clocks_since_start: u32,

    pub midi: MidiState,
}

impl DmcChannel {
    pub fn new(timing: TimingMode) -> Self {
        Self {
            length_counter: 0,
            irq_pending: false,
            period: 0,
            period_counter: timing.dmc_period(0),
            irq_enable: false,
            loop_mode: false,
            dac_latch: 0,
            address_latch: 0,
            length_latch: 0,
            read_address: 0,
            bit_counter: 0,
            dma_buffer_valid: false,
            dma_buffer: 0,
            sample_valid: false,
            sample: 0,
            dma_delay_counter: 0,
            clocks_since_start: 0,
            midi: MidiState::new(),
        }
    }

    pub fn power(&mut self, timing: TimingMode) {
        let midi = std::mem::take(&mut self.midi);
        *self = Self::new(timing);
        self.midi = midi;
    }

    fn sample_start(&self) -> u16 {
        0x4000u16.wrapping_add((self.address_latch as u16) << 6)
    }

    fn sample_length(&self) -> u16 {
        ((self.length_latch as u16) << 4) + 1
    }

    /// $4015 bit 4 set. Restarts the sample only if the channel is idle.
    pub fn start(&mut self) {
        if self.length_counter != 0 {
            return;
        }
        self.read_address = self.sample_start() & 0x7FFF;
        self.length_counter = self.sample_length();
        if self.length_counter > 1 {
            self.midi.triggered = true;
            self.clocks_since_start = 1;
        }

        if !self.dma_buffer_valid {
            self.dma_delay_counter = if self.period_counter & 1 != 0 { 2 } else { 3 };
        }
    }

    /// $4015 bit 4 clear.
    pub fn stop(&mut self) {
        if self.length_counter != 0 {
            self.midi.triggered = false;
            self.midi.triggered_stop = true;
        }
        self.length_counter = 0;
    }

    /// Clock one CPU cycle, returning the 7-bit output level.
    pub fn clock<B: ApuBus + ?Sized>(&mut self, timing: TimingMode, bus: &mut B) -> u8 {
        let result = self.dac_latch;

        if self.clocks_since_start > 0 {
            self.clocks_since_start = self.clocks_since_start.saturating_add(1);
        }

        self.period_counter = self.period_counter.wrapping_sub(1);
        if self.period_counter == 0 {
            if self.sample_valid {
                let bit = (self.sample >> self.bit_counter) & 1 != 0;
                self.dac_latch = delta_step(self.dac_latch, bit);
            }

            self.bit_counter = (self.bit_counter + 1) & 7;
            if self.bit_counter == 0 {
                if self.dma_buffer_valid {
                    self.sample_valid = true;
                    self.sample = self.dma_buffer;
                    self.dma_buffer_valid = false;

                    if self.length_counter > 0 {
                        bus.dmc_dma_pending();
                    }
                } else {
                    self.sample_valid = false;
                }
            }

            self.period_counter = timing.dmc_period(self.period);
        }

        if self.dma_delay_counter > 0 {
            self.dma_delay_counter -= 1;
            if self.dma_delay_counter == 0 {
                bus.dmc_dma_pending();
            }
        }

        result
    }

    /// Address the host should read for the pending DMA.
    pub fn dma_address(&self) -> u16 {
        0x8000 | self.read_address
    }

    /// DMA completion: the byte read from `dma_address`.
    pub fn set_dma_buffer(&mut self, data: u8) {
        self.dma_buffer = data;
        self.dma_buffer_valid = true;
        if self.length_counter == 0 {
            return;
        }

        self.length_counter -= 1;
        self.read_address = (self.read_address + 1) & 0x7FFF;

        if self.length_counter == 0 {
            if self.loop_mode {
                self.read_address = self.sample_start() & 0x7FFF;
                self.length_counter = self.sample_length();
            } else if self.irq_enable {
                self.irq_pending = true;
            }
        }
    }

    /// $4010
    pub fn write_control(&mut self, data: u8) {
        self.period = data & 0x0F;
        self.loop_mode = data & 0x40 != 0;
        self.irq_enable = data & 0x80 != 0;
        self.irq_pending = self.irq_pending && self.irq_enable && !self.loop_mode;
    }

    /// $4011
    pub fn write_dac(&mut self, data: u8) {
        self.dac_latch = data & 0x7F;
    }

    /// $4012
    pub fn write_address(&mut self, data: u8) {
        self.address_latch = data;
    }

    /// $4013
    pub fn write_length(&mut self, data: u8) {
        self.length_latch = data;
    }

    /// The latched sample as the CPU sees it.
    fn sample_bytes<B: ApuBus + ?Sized>(&self, bus: &mut B) -> Vec<u8> {
        let mut addr = self.sample_start();
        (0..self.sample_length())
            .map(|_| {
                let byte = bus.read_debugger(0x8000 | addr);
                addr = addr.wrapping_add(1);
                byte
            })
            .collect()
    }

    fn silence(&mut self) {
        self.midi.note_on = 0;
        self.midi.note_vel = 0;
    }

    pub fn calculate_midi<B: ApuBus + ?Sized>(
        &mut self,
        bus: &mut B,
        library: &mut SampleLibrary,
        mixer: &Mixer,
        tuning: &MidiTuning,
    ) {
        // Wait a few cycles after the start so a latch pair written around
        // the $4015 write has landed before the sample is hashed.
        if self.midi.triggered && self.clocks_since_start > tuning.dmc_settle_cycles {
            self.midi.triggered = false;

            let bytes = self.sample_bytes(bus);
            let hash = fnv1a64(bytes.iter().copied());
            let (a, l, p) = (self.address_latch, self.length_latch, self.period);

            match library.lookup(hash).cloned() {
                Some(desc) if desc.note(p) > 0.0 => {
                    log(LogCategory::DMC, LogLevel::Debug, || {
                        format!("dmc: 0x{hash:016X}: a={a:02X}, l={l:02X}, p={p:X} found")
                    });
                    let m = &mut self.midi;
                    m.note_chan = desc.channel;
                    m.chan_program = desc.program;
                    m.chan_volume = desc.volume;
                    m.note_vel = desc.velocity;
                    m.apply_note_wheel(desc.note(p), tuning);
                    m.note_new = true;
                }
                Some(_) => {
                    log(LogCategory::DMC, LogLevel::Debug, || {
                        format!("dmc: 0x{hash:016X}: no note at rate {p:X}")
                    });
                    self.silence();
                }
                None => {
                    log(LogCategory::DMC, LogLevel::Info, || {
                        format!("dmc: 0x{hash:016X}: a={a:02X}, l={l:02X}, p={p:X} NOT found")
                    });
                    library.record_missing(hash, p, &bytes, &mixer.dmc_column());
                    self.silence();
                }
            }

            self.midi.last_address_latch = a;
            self.midi.last_length_latch = l;
            self.midi.last_period = p;
        }

        if !self.loop_mode && self.length_counter == 0 && self.midi.last_length_counter != 0 {
            self.silence();
        }
        if self.midi.triggered_stop {
            self.silence();
        }

        self.midi.triggered_stop = false;
        self.midi.last_length_counter = self.length_counter;
    }

    /// Trigger: note-off, program change, channel volume, note-on. The
    /// emitter drops the program and volume if the channel already has them.
    pub fn generate_midi<M: MidiSink>(&mut self, out: &mut MidiOut<M>, tuning: &MidiTuning) {
        let m = &mut self.midi;
        if m.rate_limit(tuning.cycles_per_message) {
            return;
        }
        let before = out.messages();

        if m.note_on != m.last_note_on || m.note_vel != m.last_vel || m.note_new {
            if m.last_note_on != 0 {
                out.emit(NOTE_OFF | m.last_chan, m.last_note_on, 0);
                m.last_note_on = 0;
            }
            if m.note_on != 0 && m.note_vel != 0 {
                out.program(m.note_chan, m.chan_program);
                out.cc(m.note_chan, CC_VOLUME, m.chan_volume);
                out.emit(NOTE_ON | m.note_chan, m.note_on, m.note_vel);
                m.last_chan = m.note_chan;
                m.last_note_on = m.note_on;
            }
            m.last_vel = m.note_vel;
            m.note_new = false;
        }

        m.rate_control(out.messages().wrapping_sub(before));
    }
}
