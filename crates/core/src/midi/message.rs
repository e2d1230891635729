//! MIDI short messages and the sink they are delivered to.

use serde::{Deserialize, Serialize};

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const PITCH_BEND: u8 = 0xE0;

pub const CC_VOLUME: u8 = 0x07;
pub const CC_PAN: u8 = 0x0A;
pub const CC_RESET_ALL_CONTROLLERS: u8 = 121;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// One unit of outbound MIDI traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    /// A three-byte channel message. Program change carries a dummy `data2`.
    Short { status: u8, data1: u8, data2: u8 },
    /// Ask the transport to pause briefly before the next message.
    Delay,
}

impl MidiMessage {
    pub fn short(status: u8, data1: u8, data2: u8) -> Self {
        MidiMessage::Short {
            status,
            data1,
            data2,
        }
    }

    /// High nibble of the status byte, or `None` for a delay marker.
    pub fn kind(&self) -> Option<u8> {
        match self {
            MidiMessage::Short { status, .. } => Some(status & 0xF0),
            MidiMessage::Delay => None,
        }
    }

    /// Low nibble of the status byte.
    pub fn channel(&self) -> Option<u8> {
        match self {
            MidiMessage::Short { status, .. } => Some(status & 0x0F),
            MidiMessage::Delay => None,
        }
    }

    /// Wire bytes. Program change is sent as two bytes; delays produce nothing.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::Short {
                status,
                data1,
                data2,
            } => {
                if status & 0xF0 == PROGRAM_CHANGE {
                    vec![status, data1]
                } else {
                    vec![status, data1, data2]
                }
            }
            MidiMessage::Delay => Vec::new(),
        }
    }
}

/// Receiver of transcribed MIDI traffic (the MIDI transport).
///
/// Delivery is best-effort: the APU never waits on the sink and never retries.
pub trait MidiSink {
    fn write_short(&mut self, status: u8, data1: u8, data2: u8);

    fn delay(&mut self) {}
}

impl MidiSink for Vec<MidiMessage> {
    fn write_short(&mut self, status: u8, data1: u8, data2: u8) {
        self.push(MidiMessage::short(status, data1, data2));
    }

    fn delay(&mut self) {
        self.push(MidiMessage::Delay);
    }
}

/// Discards everything; for hosts without a MIDI device.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMidiSink;

impl MidiSink for NullMidiSink {
    fn write_short(&mut self, _status: u8, _data1: u8, _data2: u8) {}
}
