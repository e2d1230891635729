//! Outbound MIDI path shared by all five channels.
//!
//! `MidiOut` sits between the channel state machines and the `MidiSink`. It
//! masks data bytes to seven bits, drops control and program changes that
//! would not change the receiver's state, and counts what actually went out so
//! the per-channel rate limiters can charge for it.

use super::message::{MidiSink, CONTROL_CHANGE, PROGRAM_CHANGE};

const UNKNOWN: u8 = 0xFF;

#[derive(Debug, Clone)]
pub struct MidiOut<M: MidiSink> {
    sink: M,
    chan_program: [u8; 16],
    chan_cc: [[u8; 128]; 16],
    messages: u32,
    bps_messages: u32,
}

impl<M: MidiSink> MidiOut<M> {
    pub fn new(sink: M) -> Self {
        Self {
            sink,
            chan_program: [UNKNOWN; 16],
            chan_cc: [[UNKNOWN; 128]; 16],
            messages: 0,
            bps_messages: 0,
        }
    }

    pub fn emit(&mut self, status: u8, data1: u8, data2: u8) {
        let data1 = data1 & 0x7F;
        let data2 = data2 & 0x7F;
        let chan = (status & 0x0F) as usize;

        match status & 0xF0 {
            CONTROL_CHANGE => {
                if self.chan_cc[chan][data1 as usize] == data2 {
                    return;
                }
                self.chan_cc[chan][data1 as usize] = data2;
            }
            PROGRAM_CHANGE => {
                if self.chan_program[chan] == data1 {
                    return;
                }
                self.chan_program[chan] = data1;
            }
            _ => {}
        }

        self.sink.write_short(status, data1, data2);
        self.messages = self.messages.wrapping_add(1);
        self.bps_messages = self.bps_messages.wrapping_add(1);
    }

    pub fn program(&mut self, chan: u8, program: u8) {
        self.emit(PROGRAM_CHANGE | (chan & 0x0F), program, 0);
    }

    pub fn cc(&mut self, chan: u8, controller: u8, value: u8) {
        self.emit(CONTROL_CHANGE | (chan & 0x0F), controller, value);
    }

    pub fn delay(&mut self) {
        self.sink.delay();
    }

    /// Forget what the receiver is believed to hold.
    pub fn clear_cache(&mut self) {
        self.chan_program = [UNKNOWN; 16];
        self.chan_cc = [[UNKNOWN; 128]; 16];
    }

    /// Running count of messages delivered to the sink.
    pub fn messages(&self) -> u32 {
        self.messages
    }

    pub fn reset_messages(&mut self) {
        self.messages = 0;
    }

    /// Messages since the last call, for the bandwidth report.
    pub fn take_bps_messages(&mut self) -> u32 {
        std::mem::take(&mut self.bps_messages)
    }

    pub fn sink(&self) -> &M {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut M {
        &mut self.sink
    }

    pub fn into_sink(self) -> M {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::message::MidiMessage;

    #[test]
    fn repeated_cc_is_suppressed() {
        let mut out = MidiOut::new(Vec::<MidiMessage>::new());
        out.cc(2, 7, 100);
        out.cc(2, 7, 100);
        out.cc(2, 7, 101);
        out.cc(3, 7, 100);
        assert_eq!(out.sink().len(), 3);
        assert_eq!(out.messages(), 3);
    }

    #[test]
    fn repeated_program_is_suppressed_until_cache_cleared() {
        let mut out = MidiOut::new(Vec::<MidiMessage>::new());
        out.program(0, 81);
        out.program(0, 81);
        assert_eq!(out.sink().len(), 1);
        out.clear_cache();
        out.program(0, 81);
        assert_eq!(out.sink().len(), 2);
    }

    #[test]
    fn notes_are_never_filtered_and_data_is_masked() {
        let mut out = MidiOut::new(Vec::<MidiMessage>::new());
        out.emit(0x90, 0xC5, 0xFF);
        out.emit(0x90, 0xC5, 0xFF);
        assert_eq!(
            out.sink().as_slice(),
            &[
                MidiMessage::short(0x90, 0x45, 0x7F),
                MidiMessage::short(0x90, 0x45, 0x7F)
            ]
        );
    }

    #[test]
    fn delays_do_not_count_as_messages() {
        let mut out = MidiOut::new(Vec::<MidiMessage>::new());
        out.delay();
        out.emit(0x80, 60, 0);
        assert_eq!(out.messages(), 1);
        assert_eq!(out.take_bps_messages(), 1);
        assert_eq!(out.take_bps_messages(), 0);
    }
}
