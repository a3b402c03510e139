//! Autocorrelation pitch estimation.
//!
//! The estimator computes a normalised autocorrelation over the lag range
//! implied by the configured pitch band and takes the first peak that reaches
//! [`PEAK_FRACTION`] of the strongest one, so subharmonics at multiples of the
//! period never win. The peak is refined with parabolic interpolation. A return value of `0.0` means no voiced pitch was found; it
//! is the normal outcome for silence and very short frames.

use crate::audio::AudioFrame;
use crate::config::{AnalysisConfig, FrameSize, PitchBand};

/// Share of the strongest peak a shorter-lag peak needs to be chosen.
pub const PEAK_FRACTION: f64 = 0.9;
/// Frames whose best peak stays below this are treated as unvoiced.
pub const VOICING_THRESHOLD: f64 = 0.5;
/// Relative slack allowed past either band edge after interpolation.
pub const BAND_EDGE_TOLERANCE: f32 = 0.02;

#[derive(Clone, Copy, Debug, Default)]
pub struct PitchEstimator {
    band: PitchBand,
    frame_size: FrameSize,
}

impl PitchEstimator {
    pub fn new(band: PitchBand, frame_size: FrameSize) -> Self {
        Self { band, frame_size }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.pitch_band, config.frame_size)
    }

    pub fn band(&self) -> PitchBand {
        self.band
    }

    /// Fundamental frequency in Hz, or 0 when none is found in the band.
    pub fn estimate(&self, frame: &AudioFrame) -> f32 {
        let window = frame.centered_window(self.frame_size.get());
        self.estimate_samples(window, frame.sample_rate_hz())
    }

    fn estimate_samples(&self, x: &[f32], sample_rate_hz: u32) -> f32 {
        let n = x.len();
        if n < 3 || sample_rate_hz == 0 {
            return 0.0;
        }

        let (min_lag, band_max_lag) = self.band.lag_bounds(sample_rate_hz);
        // A period just below `min_hz` floors to `band_max_lag`, so its peak
        // may sit one lag further out.
        let limit = (band_max_lag + 1).min(n - 2);
        if min_lag > limit {
            return 0.0;
        }

        // One extra lag so every candidate has a right-hand neighbour.
        let r = nsdf(x, limit + 1);

        // Skip the zero-lag lobe.
        let mut lag = 1;
        while lag <= limit && r[lag] > 0.0 {
            lag += 1;
        }

        let mut peaks = Vec::new();
        while lag <= limit {
            let val = r[lag];
            if lag >= min_lag && val > 0.0 && val >= r[lag - 1] && val > r[lag + 1] {
                peaks.push(lag);
            }
            lag += 1;
        }

        let top = peaks.iter().map(|&p| r[p]).fold(0.0f64, f64::max);
        if top < VOICING_THRESHOLD {
            return 0.0;
        }
        // The shortest strong period wins over its multiples.
        let Some(best_lag) = peaks.into_iter().find(|&p| r[p] >= PEAK_FRACTION * top) else {
            return 0.0;
        };

        let (y0, y1, y2) = (r[best_lag - 1], r[best_lag], r[best_lag + 1]);
        let denom = y0 - 2.0 * y1 + y2;
        let shift = if denom != 0.0 {
            0.5 * (y0 - y2) / denom
        } else {
            0.0
        };
        let true_lag = best_lag as f64 + shift.clamp(-1.0, 1.0);
        let freq = (f64::from(sample_rate_hz) / true_lag) as f32;

        let low = self.band.min_hz() * (1.0 - BAND_EDGE_TOLERANCE);
        let high = self.band.max_hz() * (1.0 + BAND_EDGE_TOLERANCE);
        if !freq.is_finite() || freq < low || freq > high {
            return 0.0;
        }
        freq
    }
}

/// Normalised square difference for lags `0..=max_lag`, in `[-1, 1]`.
fn nsdf(x: &[f32], max_lag: usize) -> Vec<f64> {
    let n = x.len();
    (0..=max_lag.min(n - 1))
        .map(|lag| {
            let (head, tail) = (&x[..n - lag], &x[lag..]);
            let mut acf = 0.0f64;
            let mut energy = 0.0f64;
            for (a, b) in head.iter().zip(tail) {
                let (a, b) = (f64::from(*a), f64::from(*b));
                acf += a * b;
                energy += a * a + b * b;
            }
            if energy > 0.0 {
                2.0 * acf / energy
            } else {
                0.0
            }
        })
        .collect()
}
