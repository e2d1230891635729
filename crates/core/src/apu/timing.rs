//! APU timing configuration for different console regions.
//!
//! Everything that differs between the NTSC and PAL chips lives here: the CPU
//! clock, the master-clock divider the APU thread steps by, and the period
//! tables used by the noise channel, the DMC and the frame counter.

use serde::{Deserialize, Serialize};

/// Noise channel timer periods in CPU cycles (NTSC).
pub const NOISE_PERIOD_TABLE_NTSC: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

/// Noise channel timer periods in CPU cycles (PAL).
pub const NOISE_PERIOD_TABLE_PAL: [u16; 16] = [
    4, 8, 14, 30, 60, 88, 118, 148, 188, 236, 354, 472, 708, 944, 1890, 3778,
];

/// DMC output-unit periods in CPU cycles (NTSC).
/// Reference: NESdev wiki - APU DMC
pub const DMC_PERIOD_TABLE_NTSC: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

/// DMC output-unit periods in CPU cycles (PAL).
pub const DMC_PERIOD_TABLE_PAL: [u16; 16] = [
    398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50,
];

/// Frame counter step lengths, indexed by `[mode][step]` (NTSC).
///
/// Mode 0 is the 4-step sequence, mode 1 the 5-step sequence. The trailing
/// single-cycle steps spread the 4-step frame IRQ over three cycles.
pub const FRAME_PERIOD_TABLE_NTSC: [[u16; 6]; 2] = [
    [7457, 7456, 7458, 7457, 1, 1],
    [7457, 7456, 7458, 7458, 7452, 1],
];

/// Frame counter step lengths, indexed by `[mode][step]` (PAL).
pub const FRAME_PERIOD_TABLE_PAL: [[u16; 6]; 2] = [
    [8313, 8314, 8312, 8313, 1, 1],
    [8313, 8314, 8312, 8320, 8312, 1],
];

/// Console region timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// NTSC (North America, Japan) - 1.789773 MHz CPU clock
    #[default]
    Ntsc,
    /// PAL (Europe, Australia) - 1.662607 MHz CPU clock
    Pal,
}

impl TimingMode {
    /// Get the CPU clock frequency in Hz for this timing mode
    pub fn cpu_clock_hz(&self) -> f64 {
        match self {
            TimingMode::Ntsc => 1_789_773.0,
            TimingMode::Pal => 1_662_607.0,
        }
    }

    /// Master clocks per APU cycle.
    pub fn apu_rate(&self) -> u32 {
        match self {
            TimingMode::Ntsc => 12,
            TimingMode::Pal => 16,
        }
    }

    pub fn noise_period(&self, index: u8) -> u16 {
        let table = match self {
            TimingMode::Ntsc => &NOISE_PERIOD_TABLE_NTSC,
            TimingMode::Pal => &NOISE_PERIOD_TABLE_PAL,
        };
        table[(index & 0x0F) as usize]
    }

    pub fn dmc_period(&self, index: u8) -> u16 {
        let table = match self {
            TimingMode::Ntsc => &DMC_PERIOD_TABLE_NTSC,
            TimingMode::Pal => &DMC_PERIOD_TABLE_PAL,
        };
        table[(index & 0x0F) as usize]
    }

    /// Length of frame counter `step` in the given mode (false = 4-step, true = 5-step).
    pub fn frame_period(&self, five_step: bool, step: u8) -> u16 {
        let table = match self {
            TimingMode::Ntsc => &FRAME_PERIOD_TABLE_NTSC,
            TimingMode::Pal => &FRAME_PERIOD_TABLE_PAL,
        };
        table[five_step as usize][(step as usize).min(5)]
    }
}
