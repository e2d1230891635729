//! Register-access scripts and the memory image the DMC reads from.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use famidi_core::ApuBus;
use serde::{Deserialize, Deserializer};

/// One scripted register access. `data` absent means a read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptEvent {
    pub cycle: u64,
    #[serde(deserialize_with = "number")]
    pub addr: u16,
    #[serde(default, deserialize_with = "optional_number")]
    pub data: Option<u8>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u64),
    Text(String),
}

impl Number {
    fn value(self) -> Result<u64, String> {
        match self {
            Number::Int(v) => Ok(v),
            Number::Text(s) => {
                let t = s.trim();
                let parsed = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix('$')) {
                    u64::from_str_radix(hex, 16)
                } else {
                    t.parse()
                };
                parsed.map_err(|_| format!("not a number: {s:?}"))
            }
        }
    }
}

fn number<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let v = Number::deserialize(d)?
        .value()
        .map_err(serde::de::Error::custom)?;
    T::try_from(v).map_err(|_| serde::de::Error::custom(format!("{v} out of range")))
}

fn optional_number<'de, D>(d: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    number(d).map(Some)
}

/// Events ordered by cycle; accesses on the same cycle keep file order.
pub fn parse_script(text: &str) -> Result<Vec<ScriptEvent>> {
    let mut events: Vec<ScriptEvent> = serde_json::from_str(text)?;
    for e in &events {
        if !(0x4000..=0x4017).contains(&e.addr) {
            bail!("cycle {}: ${:04X} is not an APU register", e.cycle, e.addr);
        }
    }
    events.sort_by_key(|e| e.cycle);
    Ok(events)
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptEvent>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading script {}", path.display()))?;
    parse_script(&text).with_context(|| format!("parsing script {}", path.display()))
}

/// Flat CPU address space holding the cartridge's PRG image.
pub struct ImageBus {
    memory: Vec<u8>,
    pub dma_pending: bool,
    pub irq: bool,
    pub irq_edges: u32,
}

impl ImageBus {
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x10000],
            dma_pending: false,
            irq: false,
            irq_edges: 0,
        }
    }

    /// Map `prg` at $8000. A 16 KiB image is mirrored into $C000 as well.
    pub fn load_prg(&mut self, prg: &[u8]) -> Result<()> {
        match prg.len() {
            0x4000 => {
                self.memory[0x8000..0xC000].copy_from_slice(prg);
                self.memory[0xC000..0x10000].copy_from_slice(prg);
            }
            0x8000 => self.memory[0x8000..0x10000].copy_from_slice(prg),
            n => bail!("PRG image must be 16 or 32 KiB, got {n} bytes"),
        }
        Ok(())
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }
}

impl Default for ImageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ApuBus for ImageBus {
    fn read_debugger(&mut self, addr: u16) -> u8 {
        self.read(addr)
    }

    fn dmc_dma_pending(&mut self) {
        self.dma_pending = true;
    }

    fn apu_line(&mut self, asserted: bool) {
        if asserted && !self.irq {
            self.irq_edges += 1;
        }
        self.irq = asserted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_accepts_hex_and_decimal() {
        let events = parse_script(
            r#"[
                { "cycle": 10, "addr": "0x4003", "data": 8 },
                { "cycle": 0, "addr": 16405, "data": "$0F" },
                { "cycle": 10, "addr": "$4015" }
            ]"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                ScriptEvent { cycle: 0, addr: 0x4015, data: Some(0x0F) },
                ScriptEvent { cycle: 10, addr: 0x4003, data: Some(8) },
                ScriptEvent { cycle: 10, addr: 0x4015, data: None },
            ]
        );
    }

    #[test]
    fn script_rejects_foreign_addresses() {
        assert!(parse_script(r#"[{ "cycle": 0, "addr": "0x2000", "data": 0 }]"#).is_err());
        assert!(parse_script(r#"[{ "cycle": 0, "addr": "0x4015", "data": 300 }]"#).is_err());
    }

    #[test]
    fn small_prg_is_mirrored() {
        let mut bus = ImageBus::new();
        let mut prg = vec![0u8; 0x4000];
        prg[0] = 0xAB;
        bus.load_prg(&prg).unwrap();
        assert_eq!(bus.read(0x8000), 0xAB);
        assert_eq!(bus.read(0xC000), 0xAB);
        assert!(bus.load_prg(&[0; 100]).is_err());
    }

    #[test]
    fn irq_edges_count_rising_levels() {
        let mut bus = ImageBus::new();
        bus.apu_line(false);
        bus.apu_line(true);
        bus.apu_line(true);
        bus.apu_line(false);
        bus.apu_line(true);
        assert_eq!(bus.irq_edges, 2);
    }
}
