//! Non-linear output mixer.
//!
//! The console sums its five channels through two resistor ladders, one for
//! the pulse pair and one for triangle, noise and DMC. Both are modelled with
//! lookup tables built once at construction.

const TND_SIZE: usize = 128 * 16 * 16;

#[derive(Debug, Clone)]
pub struct Mixer {
    pulse_dac: [u16; 32],
    /// Indexed `[dmc][triangle][noise]`, flattened.
    dmc_triangle_noise_dac: Box<[u16]>,
}

impl Mixer {
    pub fn new() -> Self {
        let mut pulse_dac = [0u16; 32];
        for (amp, out) in pulse_dac.iter_mut().enumerate().skip(1) {
            *out = (32768.0 * 95.88 / (8128.0 / amp as f64 + 100.0)) as u16;
        }

        let mut tnd = vec![0u16; TND_SIZE];
        for dmc in 0..128usize {
            for triangle in 0..16usize {
                for noise in 0..16usize {
                    if dmc == 0 && triangle == 0 && noise == 0 {
                        continue;
                    }
                    let sum = triangle as f64 / 8227.0
                        + noise as f64 / 12241.0
                        + dmc as f64 / 22638.0;
                    tnd[Self::tnd_index(dmc, triangle, noise)] =
                        (32768.0 * 159.79 / (100.0 + 1.0 / sum)) as u16;
                }
            }
        }

        Self {
            pulse_dac,
            dmc_triangle_noise_dac: tnd.into_boxed_slice(),
        }
    }

    fn tnd_index(dmc: usize, triangle: usize, noise: usize) -> usize {
        ((dmc & 0x7F) << 8) | ((triangle & 0x0F) << 4) | (noise & 0x0F)
    }

    pub fn pulse(&self, amp: u8) -> u16 {
        self.pulse_dac[(amp & 0x1F) as usize]
    }

    pub fn dmc_triangle_noise(&self, dmc: u8, triangle: u8, noise: u8) -> u16 {
        self.dmc_triangle_noise_dac[Self::tnd_index(dmc as usize, triangle as usize, noise as usize)]
    }

    /// DMC-only column of the second ladder, used to render samples as PCM.
    pub fn dmc_column(&self) -> [u16; 128] {
        let mut column = [0u16; 128];
        for (dmc, out) in column.iter_mut().enumerate() {
            *out = self.dmc_triangle_noise_dac[Self::tnd_index(dmc, 0, 0)];
        }
        column
    }

    /// One normalized sample from the raw channel outputs.
    pub fn mix(&self, pulse1: u8, pulse2: u8, triangle: u8, noise: u8, dmc: u8) -> f64 {
        let output = self.pulse(pulse1 + pulse2) as i32
            + self.dmc_triangle_noise(dmc, triangle, noise) as i32;
        output.clamp(i16::MIN as i32, i16::MAX as i32) as f64 / 32768.0
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_zero() {
        let m = Mixer::new();
        assert_eq!(m.pulse(0), 0);
        assert_eq!(m.dmc_triangle_noise(0, 0, 0), 0);
        assert_eq!(m.mix(0, 0, 0, 0, 0), 0.0);
    }

    #[test]
    fn pulse_table_values() {
        let m = Mixer::new();
        // 32768 * 95.88 / (8128 + 100)
        assert_eq!(m.pulse(1), 381);
        assert_eq!(m.pulse(30), 8469);
    }

    #[test]
    fn ladders_are_monotonic() {
        let m = Mixer::new();
        for amp in 1..31 {
            assert!(m.pulse(amp + 1) > m.pulse(amp));
        }
        for dmc in 0..127 {
            assert!(m.dmc_triangle_noise(dmc + 1, 3, 3) > m.dmc_triangle_noise(dmc, 3, 3));
        }
    }

    #[test]
    fn full_scale_stays_below_one() {
        let m = Mixer::new();
        let s = m.mix(15, 15, 15, 15, 127);
        assert!(s > 0.9 && s <= 32767.0 / 32768.0, "{s}");
    }

    #[test]
    fn dmc_column_matches_table() {
        let m = Mixer::new();
        let column = m.dmc_column();
        assert_eq!(column[0], 0);
        assert_eq!(column[64], m.dmc_triangle_noise(64, 0, 0));
    }
}
