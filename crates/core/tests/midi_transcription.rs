//! End-to-end tests of the register interface and the MIDI stream it
//! produces.

use famidi_core::apu::{Apu, ApuBus, ApuConfig, MemoryBus};
use famidi_core::midi::message::{CONTROL_CHANGE, NOTE_ON, PROGRAM_CHANGE};
use famidi_core::midi::samples::fnv1a64;
use famidi_core::midi::{MidiMessage, MidiSink, SampleDescriptor, SampleLibrary};

fn powered<M: MidiSink>(sink: M) -> (Apu<M>, MemoryBus) {
    let mut bus = MemoryBus::new();
    let mut apu = Apu::new(ApuConfig::default(), sink);
    apu.power(&mut bus);
    (apu, bus)
}

fn step<M: MidiSink>(apu: &mut Apu<M>, bus: &mut MemoryBus) -> f64 {
    let sample = apu.main(bus);
    while bus.dma_requests > 0 {
        bus.dma_requests -= 1;
        let byte = bus.read_debugger(apu.dmc_dma_address());
        apu.set_dma_buffer(byte, bus);
    }
    sample
}

fn run<M: MidiSink>(apu: &mut Apu<M>, bus: &mut MemoryBus, cycles: u32) {
    for _ in 0..cycles {
        step(apu, bus);
    }
}

fn note_ons(messages: &[MidiMessage]) -> Vec<MidiMessage> {
    messages
        .iter()
        .copied()
        .filter(|m| m.kind() == Some(NOTE_ON))
        .collect()
}

/// Sink that stamps every message with the cycle it was emitted on.
#[derive(Default)]
struct StampedSink {
    now: u64,
    sent: Vec<(u64, u8)>,
}

impl MidiSink for StampedSink {
    fn write_short(&mut self, status: u8, _data1: u8, _data2: u8) {
        self.sent.push((self.now, status));
    }
}

#[test]
fn pulse_a4_from_silence_is_one_note_on() {
    let (mut apu, mut bus) = powered(Vec::<MidiMessage>::new());
    apu.sink_mut().clear();

    apu.write_io(0x4015, 0x01, &mut bus);
    apu.write_io(0x4000, 0x1A, &mut bus); // duty 0, constant volume 10
    apu.write_io(0x4002, 0xFF, &mut bus);
    apu.write_io(0x4003, 0x08, &mut bus);
    run(&mut apu, &mut bus, 20_000);

    let ons = note_ons(apu.sink());
    assert_eq!(ons, vec![MidiMessage::short(NOTE_ON, 69, 96)]);
    assert!(apu
        .sink()
        .contains(&MidiMessage::short(CONTROL_CHANGE, 7, 96)));
}

#[test]
fn unchanged_state_emits_nothing_more() {
    let (mut apu, mut bus) = powered(Vec::<MidiMessage>::new());
    apu.write_io(0x4015, 0x01, &mut bus);
    apu.write_io(0x4000, 0x1A, &mut bus);
    apu.write_io(0x4002, 0xFF, &mut bus);
    apu.write_io(0x4003, 0x08, &mut bus);
    run(&mut apu, &mut bus, 5_000);

    let sent = apu.sink().len();
    let before = apu.pulse1.midi.clone();
    let tuning = apu.tuning().clone();
    for _ in 0..10 {
        apu.pulse1.calculate_midi(&tuning);
    }
    let after = &apu.pulse1.midi;
    assert_eq!(after.last_note_on, before.last_note_on);
    assert_eq!(after.last_vel, before.last_vel);
    assert_eq!(after.last_wheel, before.last_wheel);
    assert_eq!(after.last_chan, before.last_chan);

    for _ in 0..10_000 {
        apu.generate_midi(&mut bus);
    }
    assert_eq!(apu.sink().len(), sent);
}

#[test]
fn one_byte_sample_raises_irq_exactly_once() {
    let (mut apu, mut bus) = powered(Vec::<MidiMessage>::new());
    apu.write_io(0x4017, 0x40, &mut bus);
    apu.write_io(0x4010, 0x8F, &mut bus);
    apu.write_io(0x4013, 0x00, &mut bus);
    apu.write_io(0x4015, 0x10, &mut bus);
    assert_eq!(apu.dmc.length_counter, 1);

    run(&mut apu, &mut bus, 5_000);

    assert_eq!(apu.dmc.length_counter, 0);
    let rising = bus
        .irq_history
        .windows(2)
        .filter(|w| !w[0] && w[1])
        .count();
    assert_eq!(rising, 1);
    assert!(bus.irq);
    assert!(note_ons(apu.sink()).is_empty());
}

#[test]
fn pulse_below_period_eight_is_silent() {
    let (mut apu, mut bus) = powered(Vec::<MidiMessage>::new());
    apu.sink_mut().clear();
    apu.write_io(0x4015, 0x01, &mut bus);
    apu.write_io(0x4000, 0xDF, &mut bus);
    apu.write_io(0x4002, 0x05, &mut bus);
    apu.write_io(0x4003, 0x08, &mut bus);
    assert!(apu.pulse1.length.is_active());

    for _ in 0..10_000 {
        assert_eq!(step(&mut apu, &mut bus), 0.0);
    }
    assert!(note_ons(apu.sink()).is_empty());
}

#[test]
fn rate_limiter_spaces_bursts_by_cable_time() {
    let (mut apu, mut bus) = powered(StampedSink::default());
    let cycles_per_message = apu.tuning().cycles_per_message as u64;
    apu.sink_mut().sent.clear();

    apu.write_io(0x4015, 0x08, &mut bus);
    apu.write_io(0x400C, 0x3F, &mut bus); // halted length, constant volume 15
    apu.write_io(0x400E, 0x0C, &mut bus);
    apu.write_io(0x400F, 0x08, &mut bus);

    let mut changes = 0u32;
    for cycle in 0..40_000u64 {
        if cycle % 100 == 0 {
            changes += 1;
            apu.write_io(0x400E, 0x0C | (changes & 1) as u8, &mut bus);
        }
        apu.sink_mut().now = cycle;
        step(&mut apu, &mut bus);
    }

    let mut bursts: Vec<(u64, u64)> = Vec::new();
    for &(at, status) in &apu.sink().sent {
        if status & 0x0F != 9 {
            continue;
        }
        match bursts.last_mut() {
            Some((last, count)) if *last == at => *count += 1,
            _ => bursts.push((at, 1)),
        }
    }

    assert!(bursts.len() > 1);
    assert!(bursts.len() < changes as usize / 10);
    for pair in bursts.windows(2) {
        let (at, count) = pair[0];
        assert!(
            pair[1].0 - at >= cycles_per_message * count,
            "burst of {count} at {at} followed at {}",
            pair[1].0
        );
    }
}

#[test]
fn mapped_dmc_sample_plays_its_instrument() {
    let (mut apu, mut bus) = powered(Vec::<MidiMessage>::new());
    let sample: Vec<u8> = (0..17u8).map(|i| i.wrapping_mul(29) ^ 0x55).collect();
    bus.load(0xC000, &sample);

    let mut notes = [0.0; 16];
    notes[0xF] = 60.0;
    let mut library = SampleLibrary::new();
    library.insert(
        fnv1a64(sample.iter().copied()),
        SampleDescriptor {
            channel: 10,
            program: 5,
            volume: 100,
            velocity: 110,
            notes,
        },
    );
    apu.set_samples(library);
    apu.sink_mut().clear();

    apu.write_io(0x4010, 0x0F, &mut bus);
    apu.write_io(0x4012, 0x00, &mut bus);
    apu.write_io(0x4013, 0x01, &mut bus);
    apu.write_io(0x4015, 0x10, &mut bus);
    run(&mut apu, &mut bus, 100);

    let sent: Vec<_> = apu
        .sink()
        .iter()
        .copied()
        .filter(|m| m.channel() == Some(10))
        .collect();
    assert_eq!(
        sent,
        vec![
            MidiMessage::short(PROGRAM_CHANGE | 10, 5, 0),
            MidiMessage::short(CONTROL_CHANGE | 10, 7, 100),
            MidiMessage::short(NOTE_ON | 10, 60, 110),
        ]
    );
    assert!(apu.samples().missing().is_empty());
}

#[test]
fn unmapped_dmc_sample_is_recorded_and_silent() {
    let (mut apu, mut bus) = powered(Vec::<MidiMessage>::new());
    let sample = [0xAAu8; 33];
    bus.load(0xC000, &sample);
    apu.sink_mut().clear();

    apu.write_io(0x4010, 0x0A, &mut bus);
    apu.write_io(0x4013, 0x02, &mut bus);
    apu.write_io(0x4015, 0x10, &mut bus);
    run(&mut apu, &mut bus, 100);

    let hash = fnv1a64(sample.iter().copied());
    let missing = apu.samples().missing();
    assert_eq!(missing.len(), 1);
    assert!(missing[&hash].contains(&0x0A));
    assert!(note_ons(apu.sink()).is_empty());
}
