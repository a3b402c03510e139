//! Frame-wise energy, spectral and cepstral features.
//!
//! Frames shorter than [`MIN_SPECTRAL_SAMPLES`] still get energy and
//! zero-crossing rate but no spectral or cepstral values, so the resulting
//! vector may be partial (empty MFCC vectors).

mod mfcc;
mod spectrum;
mod stats;

use crate::audio::{AudioClip, AudioFrame};
use crate::config::{AnalysisConfig, FrameSize, RolloffFraction};
use serde::{Deserialize, Serialize};

pub use mfcc::{MelFilterBank, MEL_BANDS, MFCC_COEFFICIENTS};
pub use spectrum::{Spectrum, SpectrumAnalyzer};
pub use stats::{mean_and_variance, FeatureStats};

pub const MIN_SPECTRAL_SAMPLES: usize = 32;

const LOG_TARGET: &str = "features";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub pitch_hz: f32,
    pub volume: f32,
    pub spectral_centroid_hz: f32,
    pub spectral_rolloff_hz: f32,
    pub zero_crossing_rate: f32,
    pub mfcc_means: Vec<f32>,
    pub mfcc_variances: Vec<f32>,
}

impl FeatureVector {
    /// Zero-valued vector without cepstral data.
    pub fn silent() -> Self {
        Self {
            pitch_hz: 0.0,
            volume: 0.0,
            spectral_centroid_hz: 0.0,
            spectral_rolloff_hz: 0.0,
            zero_crossing_rate: 0.0,
            mfcc_means: Vec::new(),
            mfcc_variances: Vec::new(),
        }
    }

    pub fn with_pitch(mut self, pitch_hz: f32) -> Self {
        self.pitch_hz = pitch_hz;
        self
    }

    pub fn has_cepstrum(&self) -> bool {
        !self.mfcc_means.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        [
            self.pitch_hz,
            self.volume,
            self.spectral_centroid_hz,
            self.spectral_rolloff_hz,
            self.zero_crossing_rate,
        ]
        .iter()
        .chain(&self.mfcc_means)
        .chain(&self.mfcc_variances)
        .all(|v| v.is_finite())
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::silent()
    }
}

/// Features of a single frame before aggregation.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameFeatures {
    pub rms: f32,
    pub zero_crossing_rate: f32,
    pub centroid_hz: Option<f32>,
    pub rolloff_hz: Option<f32>,
    pub mfcc: Option<Vec<f32>>,
}

/// Whole-clip statistics on top of the aggregated vector.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClipFeatures {
    pub vector: FeatureVector,
    pub frame_count: usize,
    pub centroid: FeatureStats,
    pub rolloff: FeatureStats,
    pub energy: FeatureStats,
    pub zero_crossing_rate: FeatureStats,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SpectralFeatureExtractor {
    rolloff: RolloffFraction,
    frame_size: FrameSize,
}

impl SpectralFeatureExtractor {
    pub fn new(rolloff: RolloffFraction, frame_size: FrameSize) -> Self {
        Self {
            rolloff,
            frame_size,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.rolloff, config.frame_size)
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size.get()
    }

    pub fn extract_frame(&self, frame: &AudioFrame) -> FeatureVector {
        self.extract(std::slice::from_ref(frame))
    }

    /// Aggregates a frame sequence. Pitch is left at 0 for the caller to fill.
    pub fn extract(&self, frames: &[AudioFrame]) -> FeatureVector {
        let per_frame = self.frame_features(frames);
        aggregate(&per_frame)
    }

    /// Analyzes `start_secs..end_secs` of `clip` with 50% overlapping frames.
    pub fn analyze_clip(&self, clip: &AudioClip, start_secs: f32, end_secs: f32) -> ClipFeatures {
        let span = clip.span(start_secs, end_secs);
        let size = self.frame_size.get();
        let frames: Vec<AudioFrame> =
            AudioClip::frames_of(span, clip.sample_rate_hz(), size, size / 2).collect();
        let per_frame = self.frame_features(&frames);

        let collect = |f: fn(&FrameFeatures) -> Option<f32>| -> Vec<f32> {
            per_frame.iter().filter_map(f).collect()
        };
        let clip_features = ClipFeatures {
            vector: aggregate(&per_frame),
            frame_count: per_frame.len(),
            centroid: FeatureStats::from_values(&collect(|f| f.centroid_hz)),
            rolloff: FeatureStats::from_values(&collect(|f| f.rolloff_hz)),
            energy: FeatureStats::from_values(&collect(|f| Some(f.rms))),
            zero_crossing_rate: FeatureStats::from_values(&collect(|f| Some(f.zero_crossing_rate))),
        };
        tracing::debug!(
            target: LOG_TARGET,
            frames = clip_features.frame_count,
            start_secs,
            end_secs,
            "clip features extracted"
        );
        clip_features
    }

    fn frame_features(&self, frames: &[AudioFrame]) -> Vec<FrameFeatures> {
        let mut analyzer = SpectrumAnalyzer::new();
        let mut bank: Option<MelFilterBank> = None;
        let mut out = Vec::with_capacity(frames.len());

        for frame in frames {
            let samples = frame.centered_window(self.frame_size.get());
            let mut features = FrameFeatures {
                rms: rms(samples),
                zero_crossing_rate: zero_crossing_rate(samples),
                centroid_hz: None,
                rolloff_hz: None,
                mfcc: None,
            };

            if samples.len() >= MIN_SPECTRAL_SAMPLES && frame.sample_rate_hz() > 0 {
                let spectrum = analyzer.analyze(samples, frame.sample_rate_hz());
                features.centroid_hz = Some(spectrum.centroid_hz());
                features.rolloff_hz = Some(spectrum.rolloff_hz(self.rolloff.get()));

                if !bank.as_ref().is_some_and(|b| b.matches(&spectrum)) {
                    bank = Some(MelFilterBank::new(
                        spectrum.magnitudes().len(),
                        spectrum.bin_width_hz(),
                    ));
                }
                features.mfcc = bank.as_ref().map(|b| b.coefficients(&spectrum));
            }
            out.push(features);
        }
        out
    }
}

fn aggregate(frames: &[FrameFeatures]) -> FeatureVector {
    if frames.is_empty() {
        let (mfcc_means, mfcc_variances) = mean_and_variance(&[], MFCC_COEFFICIENTS);
        return FeatureVector {
            mfcc_means,
            mfcc_variances,
            ..FeatureVector::silent()
        };
    }

    let mean_of = |values: Vec<f32>| -> f32 {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f32>() / values.len() as f32
        }
    };
    let cepstra: Vec<Vec<f32>> = frames.iter().filter_map(|f| f.mfcc.clone()).collect();
    let (mfcc_means, mfcc_variances) = if cepstra.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        mean_and_variance(&cepstra, MFCC_COEFFICIENTS)
    };

    FeatureVector {
        pitch_hz: 0.0,
        volume: mean_of(frames.iter().map(|f| f.rms).collect()).clamp(0.0, 1.0),
        spectral_centroid_hz: mean_of(frames.iter().filter_map(|f| f.centroid_hz).collect()),
        spectral_rolloff_hz: mean_of(frames.iter().filter_map(|f| f.rolloff_hz).collect()),
        zero_crossing_rate: mean_of(frames.iter().map(|f| f.zero_crossing_rate).collect()),
        mfcc_means,
        mfcc_variances,
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Fraction of adjacent sample pairs whose sign differs.
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq: f32, amp: f32, sample_rate_hz: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / sample_rate_hz as f32).sin())
            .collect()
    }

    #[test]
    fn rms_and_zero_crossings() {
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert_eq!(zero_crossing_rate(&[1.0, -1.0, 1.0, -1.0, 1.0]), 1.0);
        assert_eq!(zero_crossing_rate(&[0.2, 0.3, 0.4]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn tone_frame_features() {
        let extractor = SpectralFeatureExtractor::default();
        let frame = AudioFrame::new(tone(1000.0, 0.5, 16_000, 2048), 16_000);
        let f = extractor.extract_frame(&frame);
        assert!((f.volume - 0.5 / 2f32.sqrt()).abs() < 1e-2);
        assert!((f.spectral_centroid_hz - 1000.0).abs() < 50.0);
        assert!(f.spectral_rolloff_hz >= 990.0 && f.spectral_rolloff_hz < 1100.0);
        assert!((f.zero_crossing_rate - 0.125).abs() < 0.01);
        assert_eq!(f.mfcc_means.len(), MFCC_COEFFICIENTS);
        assert!(f.mfcc_variances.iter().all(|v| *v == 0.0));
        assert_eq!(f.pitch_hz, 0.0);
    }

    #[test]
    fn empty_frame_set_gives_zero_cepstrum() {
        let f = SpectralFeatureExtractor::default().extract(&[]);
        assert_eq!(f.volume, 0.0);
        assert_eq!(f.mfcc_means, vec![0.0; MFCC_COEFFICIENTS]);
        assert_eq!(f.mfcc_variances, vec![0.0; MFCC_COEFFICIENTS]);
    }

    #[test]
    fn short_frames_yield_partial_vectors() {
        let frame = AudioFrame::new(vec![0.3, -0.3, 0.3, -0.3], 16_000);
        let f = SpectralFeatureExtractor::default().extract_frame(&frame);
        assert!(!f.has_cepstrum());
        assert_eq!(f.spectral_centroid_hz, 0.0);
        assert!((f.volume - 0.3).abs() < 1e-6);
    }

    #[test]
    fn clip_analysis_uses_half_overlap() {
        let extractor = SpectralFeatureExtractor::new(
            RolloffFraction::default(),
            FrameSize::new(1024).expect("valid frame size"),
        );
        let mut samples = tone(500.0, 0.2, 16_000, 8_000);
        samples.extend(tone(500.0, 0.8, 16_000, 8_000));
        let clip = AudioClip::new(samples, 16_000);

        let features = extractor.analyze_clip(&clip, 0.0, 1.0);
        // (16000 - 1024) / 512 + 1
        assert_eq!(features.frame_count, 30);
        assert!(features.energy.min < 0.2 && features.energy.max > 0.5);
        assert!(features.energy.std > 0.0);
        assert!((features.centroid.median - 500.0).abs() < 50.0);
        assert_eq!(features.vector.mfcc_means.len(), MFCC_COEFFICIENTS);
        assert!(features.vector.mfcc_variances[0] > 0.0);

        let first_half = extractor.analyze_clip(&clip, 0.0, 0.5);
        assert!(first_half.energy.max < 0.2);
    }
}
