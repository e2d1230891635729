//! Recording the MIDI stream and writing it out as a Standard MIDI File.

use std::io::{self, Write};

use famidi_core::{MidiMessage, MidiSink};

/// Ticks per quarter note.
const DIVISION: u16 = 480;
/// Microseconds per quarter note (120 bpm), so one tick is 1/960 s.
const TEMPO: u32 = 500_000;
const TICKS_PER_SECOND: f64 = DIVISION as f64 * 1_000_000.0 / TEMPO as f64;

/// Sink that remembers the APU cycle each message was sent on.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub now: u64,
    pub events: Vec<(u64, MidiMessage)>,
}

impl MidiSink for RecordingSink {
    fn write_short(&mut self, status: u8, data1: u8, data2: u8) {
        self.events
            .push((self.now, MidiMessage::short(status, data1, data2)));
    }

    fn delay(&mut self) {
        self.events.push((self.now, MidiMessage::Delay));
    }
}

fn write_vlq(track: &mut Vec<u8>, mut value: u32) {
    let mut bytes = [0u8; 5];
    let mut n = 0;
    loop {
        bytes[n] = (value & 0x7F) as u8;
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let more = if i > 0 { 0x80 } else { 0 };
        track.push(bytes[i] | more);
    }
}

/// Format 0 file of `events`, timed against a CPU clock of `cpu_hz`. Each
/// delay marker pushes everything after it back by one tick.
pub fn write_smf<W: Write>(w: &mut W, events: &[(u64, MidiMessage)], cpu_hz: f64) -> io::Result<()> {
    let mut track = Vec::new();

    write_vlq(&mut track, 0);
    track.extend_from_slice(&[0xFF, 0x51, 0x03]);
    track.extend_from_slice(&TEMPO.to_be_bytes()[1..]);

    let mut delays: u64 = 0;
    let mut last_tick: u64 = 0;
    for (cycle, message) in events {
        if *message == MidiMessage::Delay {
            delays += 1;
            continue;
        }
        let tick = (*cycle as f64 * TICKS_PER_SECOND / cpu_hz).round() as u64 + delays;
        let delta = tick.saturating_sub(last_tick).min(0x0FFF_FFFF);
        last_tick = last_tick.max(tick);
        write_vlq(&mut track, delta as u32);
        track.extend_from_slice(&message.to_bytes());
    }

    write_vlq(&mut track, 0);
    track.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    w.write_all(b"MThd")?;
    w.write_all(&6u32.to_be_bytes())?;
    w.write_all(&0u16.to_be_bytes())?;
    w.write_all(&1u16.to_be_bytes())?;
    w.write_all(&DIVISION.to_be_bytes())?;
    w.write_all(b"MTrk")?;
    w.write_all(&(track.len() as u32).to_be_bytes())?;
    w.write_all(&track)
}
