mod script;
mod smf;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use famidi_core::logging::{LogCategory, LogConfig, LogLevel};
use famidi_core::{Apu, ApuConfig, MidiTuning, TimingMode};
use log::{debug, info, warn};

use script::{load_script, ImageBus};
use smf::{write_smf, RecordingSink};

const PCM_HZ: f64 = 44_100.0;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Region {
    Ntsc,
    Pal,
}

impl From<Region> for TimingMode {
    fn from(r: Region) -> Self {
        match r {
            Region::Ntsc => TimingMode::Ntsc,
            Region::Pal => TimingMode::Pal,
        }
    }
}

/// Replay APU register writes and transcribe the result to MIDI.
#[derive(Parser)]
struct Args {
    /// JSON array of `{ "cycle", "addr", "data" }` register accesses
    #[arg(long)]
    script: Option<PathBuf>,

    /// 16 or 32 KiB PRG image mapped at $8000, for DMC samples
    #[arg(long)]
    prg: Option<PathBuf>,

    /// CPU cycles to run (default: one emulated second past the last event)
    #[arg(long)]
    cycles: Option<u64>,

    #[arg(long, value_enum, default_value_t = Region::Ntsc)]
    timing: Region,

    /// DMC sample library (JSON)
    #[arg(long)]
    samples: Option<PathBuf>,

    /// Transcription tuning overrides (JSON)
    #[arg(long)]
    tuning: Option<PathBuf>,

    /// Restore this save state before running
    #[arg(long)]
    load: Option<PathBuf>,

    /// Write the transcription as a Standard MIDI File
    #[arg(long, default_value = "out.mid")]
    midi_out: PathBuf,

    /// Write the mixed audio as raw 44.1 kHz signed 16-bit little-endian PCM
    #[arg(long)]
    pcm_out: Option<PathBuf>,

    /// Dump save-state to this file as JSON
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write unmapped DMC samples here as PCM
    #[arg(long)]
    sample_dump_dir: Option<PathBuf>,

    /// Core log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Per-category core log level, e.g. `dmc=info`; repeatable
    #[arg(long = "log")]
    log_categories: Vec<String>,

    /// Send core logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Averages the per-cycle mixer output down to the PCM rate.
struct Resampler {
    cycles_per_sample: f64,
    accum: f64,
    sum: f64,
    count: u32,
    out: Vec<i16>,
}

impl Resampler {
    fn new(cpu_hz: f64) -> Self {
        Self {
            cycles_per_sample: cpu_hz / PCM_HZ,
            accum: 0.0,
            sum: 0.0,
            count: 0,
            out: Vec::new(),
        }
    }

    fn push(&mut self, sample: f64) {
        self.sum += sample;
        self.count += 1;
        self.accum += 1.0;
        if self.accum >= self.cycles_per_sample {
            self.accum -= self.cycles_per_sample;
            let avg = self.sum / self.count as f64;
            self.out.push((avg * 32767.0).clamp(-32768.0, 32767.0) as i16);
            self.sum = 0.0;
            self.count = 0;
        }
    }
}

fn configure_logging(args: &Args) -> Result<()> {
    let config = LogConfig::global();
    let Some(level) = LogLevel::from_str(&args.log_level) else {
        bail!("unknown log level {:?}", args.log_level);
    };
    config.set_global_level(level);

    for entry in &args.log_categories {
        let Some((name, level)) = entry.split_once('=') else {
            bail!("expected CATEGORY=LEVEL, got {entry:?}");
        };
        let category = LogCategory::from_str(name)
            .with_context(|| format!("unknown log category {name:?}"))?;
        let level =
            LogLevel::from_str(level).with_context(|| format!("unknown log level {level:?}"))?;
        config.set_level(category, level);
    }

    if let Some(path) = &args.log_file {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

fn load_tuning(path: &Path) -> Result<MidiTuning> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading tuning {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing tuning {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    configure_logging(&args)?;

    let timing: TimingMode = args.timing.into();
    let tuning = match &args.tuning {
        Some(path) => load_tuning(path)?,
        None => MidiTuning::default(),
    };
    let config = ApuConfig {
        timing,
        tuning,
        sample_dump_dir: args.sample_dump_dir.clone(),
    };
    if let Some(dir) = &config.sample_dump_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating sample dump dir {}", dir.display()))?;
    }

    let mut bus = ImageBus::new();
    if let Some(path) = &args.prg {
        let prg = fs::read(path).with_context(|| format!("reading PRG {}", path.display()))?;
        bus.load_prg(&prg)?;
    }

    let events = match &args.script {
        Some(path) => load_script(path)?,
        None => Vec::new(),
    };
    let cpu_hz = timing.cpu_clock_hz();
    let cycles = args.cycles.unwrap_or_else(|| {
        events.last().map_or(0, |e| e.cycle) + cpu_hz as u64
    });
    info!("{} events, {} cycles at {:?}", events.len(), cycles, timing);

    let mut apu = Apu::new(config, RecordingSink::default());
    if let Some(path) = &args.samples {
        if !apu.load_samples(path) {
            warn!("DMC will play without MIDI: no samples from {}", path.display());
        }
    }
    apu.power(&mut bus);

    if let Some(path) = &args.load {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading state {}", path.display()))?;
        let state: serde_json::Value = serde_json::from_str(&text)?;
        apu.load_state(&state, &mut bus)
            .with_context(|| format!("loading state {}", path.display()))?;
    }

    let mut resampler = args.pcm_out.as_ref().map(|_| Resampler::new(cpu_hz));
    let mut next = events.iter().peekable();
    for cycle in 0..cycles {
        while let Some(e) = next.next_if(|e| e.cycle <= cycle) {
            match e.data {
                Some(data) => apu.write_io(e.addr, data, &mut bus),
                None => {
                    let value = apu.read_io(e.addr, &mut bus);
                    debug!("cycle {}: read ${:04X} = {:02X}", cycle, e.addr, value);
                }
            }
        }

        apu.sink_mut().now = cycle;
        let sample = apu.main(&mut bus);
        if bus.dma_pending {
            bus.dma_pending = false;
            let byte = bus.read(apu.dmc_dma_address());
            apu.set_dma_buffer(byte, &mut bus);
        }
        if let Some(r) = resampler.as_mut() {
            r.push(sample);
        }
    }

    apu.sink_mut().now = cycles;
    apu.unload();

    if let Some(path) = &args.save {
        let state = apu.save_state();
        let mut f = File::create(path)?;
        write!(f, "{}", serde_json::to_string_pretty(&state)?)?;
    }

    let missing = apu.samples().missing().len();
    if missing > 0 {
        warn!("{missing} DMC samples had no mapping");
    }
    info!("{} IRQ assertions", bus.irq_edges);

    if let (Some(path), Some(r)) = (&args.pcm_out, resampler) {
        let mut f = BufWriter::new(File::create(path)?);
        for s in &r.out {
            f.write_all(&s.to_le_bytes())?;
        }
        f.flush()?;
        info!("{} PCM samples written to {}", r.out.len(), path.display());
    }

    let sink = apu.into_sink();
    let mut f = BufWriter::new(
        File::create(&args.midi_out)
            .with_context(|| format!("creating {}", args.midi_out.display()))?,
    );
    write_smf(&mut f, &sink.events, cpu_hz)?;
    f.flush()?;
    info!("{} MIDI events written to {}", sink.events.len(), args.midi_out.display());

    LogConfig::global().clear_log_file();
    Ok(())
}
