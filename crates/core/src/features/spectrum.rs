use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Magnitude spectrum of one Hann-windowed frame, bins `0..n/2`.
#[derive(Clone, Debug)]
pub struct Spectrum {
    magnitudes: Vec<f32>,
    bin_width_hz: f32,
}

impl Spectrum {
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn bin_width_hz(&self) -> f32 {
        self.bin_width_hz
    }

    /// First moment of the magnitude spectrum, in Hz.
    pub fn centroid_hz(&self) -> f32 {
        let total: f32 = self.magnitudes.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f32 = self
            .magnitudes
            .iter()
            .enumerate()
            .map(|(bin, m)| bin as f32 * m)
            .sum();
        weighted / total * self.bin_width_hz
    }

    /// Frequency below which `fraction` of the total magnitude lies.
    pub fn rolloff_hz(&self, fraction: f32) -> f32 {
        let total: f32 = self.magnitudes.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let threshold = fraction * total;
        let mut running = 0.0;
        for (bin, m) in self.magnitudes.iter().enumerate() {
            running += m;
            if running >= threshold {
                return bin as f32 * self.bin_width_hz;
            }
        }
        (self.magnitudes.len().saturating_sub(1)) as f32 * self.bin_width_hz
    }

    pub fn power(&self) -> impl Iterator<Item = f32> + '_ {
        self.magnitudes.iter().map(|m| m * m)
    }
}

/// Plans one FFT per frame length and reuses it across frames of that length.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f32>,
    plan: Option<(usize, Arc<dyn Fft<f32>>, Arc<[f32]>)>,
    scratch: Vec<Complex32>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            plan: None,
            scratch: Vec::new(),
        }
    }

    pub fn analyze(&mut self, samples: &[f32], sample_rate_hz: u32) -> Spectrum {
        let n = samples.len();
        let (fft, window) = self.plan_for(n);

        self.scratch.clear();
        self.scratch.extend(
            samples
                .iter()
                .zip(window.iter())
                .map(|(s, w)| Complex32::new(s * w, 0.0)),
        );
        fft.process(&mut self.scratch);

        let num_bins = n / 2;
        let magnitudes = self.scratch[..num_bins].iter().map(|c| c.norm()).collect();
        let bin_width_hz = if num_bins == 0 {
            0.0
        } else {
            sample_rate_hz as f32 / (2.0 * num_bins as f32)
        };
        Spectrum {
            magnitudes,
            bin_width_hz,
        }
    }

    fn plan_for(&mut self, n: usize) -> (Arc<dyn Fft<f32>>, Arc<[f32]>) {
        match &self.plan {
            Some((len, fft, window)) if *len == n => (Arc::clone(fft), Arc::clone(window)),
            _ => {
                let fft = self.planner.plan_fft_forward(n);
                let window: Arc<[f32]> = hann(n).into();
                self.plan = Some((n, Arc::clone(&fft), Arc::clone(&window)));
                (fft, window)
            }
        }
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn hann(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1) as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate_hz: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate_hz as f32).sin())
            .collect()
    }

    #[test]
    fn centroid_of_pure_tone_sits_on_the_tone() {
        let mut analyzer = SpectrumAnalyzer::new();
        let spectrum = analyzer.analyze(&tone(1000.0, 16_000, 1024), 16_000);
        assert_eq!(spectrum.magnitudes().len(), 512);
        assert!((spectrum.bin_width_hz() - 15.625).abs() < 1e-4);
        let centroid = spectrum.centroid_hz();
        assert!((centroid - 1000.0).abs() < 50.0, "centroid {centroid}");
    }

    #[test]
    fn rolloff_rises_with_fraction() {
        let mut analyzer = SpectrumAnalyzer::new();
        let mixed: Vec<f32> = tone(300.0, 16_000, 1024)
            .iter()
            .zip(tone(3000.0, 16_000, 1024))
            .map(|(a, b)| 0.5 * a + 0.5 * b)
            .collect();
        let spectrum = analyzer.analyze(&mixed, 16_000);
        let low = spectrum.rolloff_hz(0.3);
        let high = spectrum.rolloff_hz(0.95);
        assert!(low < 500.0, "low rolloff {low}");
        assert!(high > 2900.0, "high rolloff {high}");
    }

    #[test]
    fn silent_spectrum_is_zero() {
        let mut analyzer = SpectrumAnalyzer::new();
        let spectrum = analyzer.analyze(&[0.0; 256], 16_000);
        assert_eq!(spectrum.centroid_hz(), 0.0);
        assert_eq!(spectrum.rolloff_hz(0.85), 0.0);
    }

    #[test]
    fn plan_is_replaced_when_length_changes() {
        let mut analyzer = SpectrumAnalyzer::new();
        assert_eq!(analyzer.analyze(&[0.1; 256], 8_000).magnitudes().len(), 128);
        assert_eq!(analyzer.analyze(&[0.1; 64], 8_000).magnitudes().len(), 32);
    }

    #[test]
    fn window_is_shared_between_equal_frames() {
        let mut analyzer = SpectrumAnalyzer::new();
        let (_, first) = analyzer.plan_for(512);
        let (_, again) = analyzer.plan_for(512);
        assert!(Arc::ptr_eq(&first, &again));
        let (_, other) = analyzer.plan_for(256);
        assert_eq!(other.len(), 256);
    }
}
