//! DMC sample library: maps the content hash of a delta-modulation sample to
//! the General MIDI instrument that should stand in for it.
//!
//! The library is a JSON document, loaded once at power-on:
//!
//! ```json
//! [
//!   { "fnv64a": "0x82A9954CEA45D76A", "channel": 9, "velocity": 96,
//!     "notes": [36, 36, 36, 36, 36, 36, 36, 36, 36, 36, 36, 36, 36, 36, 36, 36] }
//! ]
//! ```
//!
//! `notes` is indexed by the DMC rate register, so a single recording played
//! back at several rates can map to several pitches. Samples that hash to no
//! entry are remembered per rate; optionally they are decoded and written out
//! as raw PCM so they can be auditioned and classified offline.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::apu::dmc::delta_step;
use crate::logging::{log, LogCategory, LogLevel};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Playback rate in Hz of each DMC rate index (NTSC), for the dump sidecar.
const DMC_SAMPLE_RATES: [f64; 16] = [
    4181.71, 4709.93, 5264.04, 5593.04, 6257.95, 7046.35, 7919.35, 8363.42, 9419.86, 11186.1,
    12604.0, 13982.6, 16884.6, 21306.8, 24858.0, 33143.9,
];

/// 64-bit FNV-1a over a byte stream.
pub fn fnv1a64<I: IntoIterator<Item = u8>>(bytes: I) -> u64 {
    bytes.into_iter().fold(FNV_OFFSET_BASIS, |h, b| {
        (h ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Error)]
pub enum SampleLibraryError {
    #[error("failed to read sample library: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed sample library: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid fnv64a hash literal {0:?}")]
    InvalidHash(String),
    #[error("sample {hash:016X} lists {count} notes, expected 16")]
    NoteCount { hash: u64, count: usize },
}

/// What a recognised sample turns into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDescriptor {
    pub channel: u8,
    pub program: u8,
    /// Channel volume (CC 7)
    pub volume: u8,
    pub velocity: u8,
    /// Pitch in MIDI semitones per DMC rate index; 0 means no note
    pub notes: [f64; 16],
}

impl SampleDescriptor {
    pub fn note(&self, period: u8) -> f64 {
        self.notes[(period & 0x0F) as usize]
    }
}

#[derive(Debug, Deserialize)]
struct SampleRecord {
    fnv64a: String,
    #[serde(default = "default_channel")]
    channel: u8,
    #[serde(default)]
    program: u8,
    #[serde(default = "default_volume")]
    volume: u8,
    #[serde(default = "default_velocity")]
    velocity: u8,
    #[serde(default)]
    notes: Vec<f64>,
}

fn default_channel() -> u8 {
    9
}

fn default_volume() -> u8 {
    0x60
}

fn default_velocity() -> u8 {
    96
}

fn parse_hash(literal: &str) -> Result<u64, SampleLibraryError> {
    let trimmed = literal.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|_| SampleLibraryError::InvalidHash(literal.to_string()))
}

/// Hash → instrument table plus the record of samples it could not place.
#[derive(Debug, Clone, Default)]
pub struct SampleLibrary {
    descriptors: HashMap<u64, SampleDescriptor>,
    missing: HashMap<u64, HashSet<u8>>,
    dump_dir: Option<PathBuf>,
}

impl SampleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> Result<Self, SampleLibraryError> {
        let records: Vec<SampleRecord> = serde_json::from_str(text)?;
        let mut library = Self::new();
        for record in records {
            let hash = parse_hash(&record.fnv64a)?;
            let mut notes = [0.0; 16];
            match record.notes.len() {
                0 => {}
                16 => notes.copy_from_slice(&record.notes),
                count => return Err(SampleLibraryError::NoteCount { hash, count }),
            }
            library.insert(
                hash,
                SampleDescriptor {
                    channel: record.channel & 0x0F,
                    program: record.program & 0x7F,
                    volume: record.volume & 0x7F,
                    velocity: record.velocity & 0x7F,
                    notes,
                },
            );
        }
        Ok(library)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SampleLibraryError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn insert(&mut self, hash: u64, descriptor: SampleDescriptor) {
        self.descriptors.insert(hash, descriptor);
    }

    pub fn lookup(&self, hash: u64) -> Option<&SampleDescriptor> {
        self.descriptors.get(&hash)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Write unmapped samples as PCM into `dir`; `None` disables dumping.
    pub fn set_dump_dir(&mut self, dir: Option<PathBuf>) {
        self.dump_dir = dir;
    }

    /// Unmapped hashes and the rate indices they were heard at.
    pub fn missing(&self) -> &HashMap<u64, HashSet<u8>> {
        &self.missing
    }

    /// Note an unmapped sample. Returns true the first time a (hash, period)
    /// pair is seen; that is also when the PCM dump, if enabled, is written.
    pub fn record_missing(&mut self, hash: u64, period: u8, bytes: &[u8], dac: &[u16; 128]) -> bool {
        let period = period & 0x0F;
        if !self.missing.entry(hash).or_default().insert(period) {
            return false;
        }
        if let Some(dir) = self.dump_dir.clone() {
            if let Err(e) = dump_pcm(&dir, hash, period, bytes, dac) {
                log(LogCategory::DMC, LogLevel::Warn, || {
                    format!("dmc: failed to dump sample {hash:016X}.{period:X}: {e}")
                });
            }
        }
        true
    }
}

/// Decode delta-modulation bytes through the DMC output rule into 16-bit PCM.
pub fn decode_pcm(bytes: &[u8], dac: &[u16; 128]) -> Vec<u16> {
    let mut level: u8 = 0;
    let mut pcm = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for bit in 0..8 {
            level = delta_step(level, (byte >> bit) & 1 != 0);
            pcm.push(dac[level as usize]);
        }
    }
    pcm
}

fn dump_pcm(
    dir: &Path,
    hash: u64,
    period: u8,
    bytes: &[u8],
    dac: &[u16; 128],
) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let name = format!("{hash:016X}.{period:X}.pcm");
    let path = dir.join(&name);

    let data: Vec<u8> = decode_pcm(bytes, dac)
        .into_iter()
        .flat_map(u16::to_le_bytes)
        .collect();
    fs::write(&path, data)?;

    let rsrc = format!(
        "SAMPLERATE {}\nCHANNELS 1\nBITSPERSAMPLE 16\nPREFPOS -1\nENDIAN LITTLE\nBYTEOFFS 0\nBYTELEN 0\n",
        DMC_SAMPLE_RATES[period as usize].round() as i64
    );
    fs::write(dir.join(format!("{name}.rsrc.txt")), rsrc)
}
