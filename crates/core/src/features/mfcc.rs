use super::spectrum::Spectrum;
use std::f32::consts::PI;

pub const MEL_BANDS: usize = 26;
pub const MFCC_COEFFICIENTS: usize = 13;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filters laid over `0..nyquist`, built for one bin layout.
#[derive(Clone, Debug)]
pub struct MelFilterBank {
    num_bins: usize,
    bin_width_hz: f32,
    /// Per band: `(first_bin, weights)`.
    filters: Vec<(usize, Vec<f32>)>,
}

impl MelFilterBank {
    pub fn new(num_bins: usize, bin_width_hz: f32) -> Self {
        let nyquist = num_bins as f32 * bin_width_hz;
        let top = hz_to_mel(nyquist);
        let edges: Vec<f32> = (0..MEL_BANDS + 2)
            .map(|i| mel_to_hz(top * i as f32 / (MEL_BANDS + 1) as f32))
            .collect();

        let filters = edges
            .windows(3)
            .map(|w| {
                let (lo, mid, hi) = (w[0], w[1], w[2]);
                let first = (lo / bin_width_hz).floor() as usize;
                let last = ((hi / bin_width_hz).ceil() as usize).min(num_bins);
                let weights = (first..last)
                    .map(|bin| {
                        let hz = bin as f32 * bin_width_hz;
                        if hz <= lo || hz >= hi {
                            0.0
                        } else if hz <= mid {
                            (hz - lo) / (mid - lo)
                        } else {
                            (hi - hz) / (hi - mid)
                        }
                    })
                    .collect();
                (first, weights)
            })
            .collect();

        Self {
            num_bins,
            bin_width_hz,
            filters,
        }
    }

    pub fn matches(&self, spectrum: &Spectrum) -> bool {
        self.num_bins == spectrum.magnitudes().len() && self.bin_width_hz == spectrum.bin_width_hz()
    }

    /// Cepstral coefficients: DCT-II of the log mel energies.
    pub fn coefficients(&self, spectrum: &Spectrum) -> Vec<f32> {
        let power: Vec<f32> = spectrum.power().collect();
        let log_energies: Vec<f32> = self
            .filters
            .iter()
            .map(|(first, weights)| {
                let energy: f32 = weights
                    .iter()
                    .enumerate()
                    .filter_map(|(i, w)| power.get(first + i).map(|p| p * w))
                    .sum();
                energy.ln_1p()
            })
            .collect();

        let bands = log_energies.len() as f32;
        (0..MFCC_COEFFICIENTS)
            .map(|k| {
                log_energies
                    .iter()
                    .enumerate()
                    .map(|(m, e)| e * (PI * k as f32 * (m as f32 + 0.5) / bands).cos())
                    .sum()
            })
            .collect()
    }
}
