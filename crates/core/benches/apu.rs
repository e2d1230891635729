use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use famidi_core::apu::{Apu, ApuBus, ApuConfig, MemoryBus, TimingMode};
use famidi_core::midi::{MidiMessage, NullMidiSink};
use famidi_core::MidiSink;

/// Cycles in one NTSC 4-step frame.
const FRAME_CYCLES: u32 = 29830;

/// All five channels sounding, DMC looping a sample from $C000.
fn program<M: MidiSink>(apu: &mut Apu<M>, bus: &mut MemoryBus) {
    let writes: [(u16, u8); 17] = [
        (0x4015, 0x1F),
        (0x4000, 0xBF),
        (0x4002, 0xFD),
        (0x4003, 0x08),
        (0x4004, 0x4A),
        (0x4005, 0x9A),
        (0x4006, 0x40),
        (0x4007, 0x09),
        (0x4008, 0xC0),
        (0x400A, 0xA0),
        (0x400B, 0x09),
        (0x400C, 0x0C),
        (0x400E, 0x07),
        (0x400F, 0x08),
        (0x4010, 0x4E),
        (0x4013, 0x04),
        (0x4015, 0x1F),
    ];
    for (addr, data) in writes {
        apu.write_io(addr, data, bus);
    }
}

fn run_frame<M: MidiSink>(apu: &mut Apu<M>, bus: &mut MemoryBus) -> f64 {
    let mut acc = 0.0;
    for _ in 0..FRAME_CYCLES {
        acc += apu.main(bus);
        while bus.dma_requests > 0 {
            bus.dma_requests -= 1;
            let byte = bus.read_debugger(apu.dmc_dma_address());
            apu.set_dma_buffer(byte, bus);
        }
    }
    acc
}

fn bus() -> MemoryBus {
    let mut bus = MemoryBus::new();
    let sample: Vec<u8> = (0..65u32).map(|i| (i * 37) as u8).collect();
    bus.load(0xC000, &sample);
    bus
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("apu_frame");

    for timing in [TimingMode::Ntsc, TimingMode::Pal] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{timing:?}")),
            &timing,
            |b, &timing| {
                let mut bus = bus();
                let config = ApuConfig {
                    timing,
                    ..ApuConfig::default()
                };
                let mut apu = Apu::new(config, NullMidiSink);
                apu.power(&mut bus);
                program(&mut apu, &mut bus);
                b.iter(|| black_box(run_frame(&mut apu, &mut bus)));
            },
        );
    }

    group.finish();
}

fn bench_frame_recording(c: &mut Criterion) {
    c.bench_function("apu_frame_recording_midi", |b| {
        let mut bus = bus();
        let mut apu = Apu::new(ApuConfig::default(), Vec::<MidiMessage>::new());
        apu.power(&mut bus);
        program(&mut apu, &mut bus);
        b.iter(|| {
            apu.sink_mut().clear();
            black_box(run_frame(&mut apu, &mut bus));
        });
    });
}

fn bench_power(c: &mut Criterion) {
    c.bench_function("apu_power", |b| {
        let mut bus = MemoryBus::new();
        let mut apu = Apu::new(ApuConfig::default(), NullMidiSink);
        b.iter(|| {
            apu.power(&mut bus);
            bus.irq_history.clear();
            black_box(apu.irq_line());
        });
    });
}

criterion_group!(benches, bench_frame, bench_frame_recording, bench_power);
criterion_main!(benches);
