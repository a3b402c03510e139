use serde::{Deserialize, Serialize};

/// Observed `[min, max]` of a value. Only ever widens.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ObservedRange {
    pub min: f32,
    pub max: f32,
}

impl ObservedRange {
    pub fn point(value: f32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn widen(&mut self, value: f32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Per-user pitch and volume baseline.
///
/// The pitch fields stay unset until a voiced sample (pitch > 0) arrives.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Calibration {
    pub baseline_pitch_hz: Option<f32>,
    pub baseline_volume: Option<f32>,
    pub pitch_range: Option<ObservedRange>,
    pub volume_range: Option<ObservedRange>,
    pub sample_count: u64,
    pub last_updated_ms: Option<u64>,
}

impl Calibration {
    /// Folds one labeled sample in with an exponential moving average.
    /// The first observation of each value seeds its baseline directly.
    pub fn observe(&mut self, pitch_hz: f32, volume: f32, alpha: f32, now_ms: u64) {
        if pitch_hz.is_finite() && pitch_hz > 0.0 {
            self.baseline_pitch_hz = Some(ema(self.baseline_pitch_hz, pitch_hz, alpha));
            widen(&mut self.pitch_range, pitch_hz);
        }
        if volume.is_finite() && volume >= 0.0 {
            self.baseline_volume = Some(ema(self.baseline_volume, volume, alpha));
            widen(&mut self.volume_range, volume);
        }
        self.sample_count += 1;
        self.last_updated_ms = Some(now_ms);
    }
}

fn ema(previous: Option<f32>, value: f32, alpha: f32) -> f32 {
    match previous {
        Some(prev) => prev * (1.0 - alpha) + value * alpha,
        None => value,
    }
}

fn widen(range: &mut Option<ObservedRange>, value: f32) {
    match range {
        Some(r) => r.widen(value),
        None => *range = Some(ObservedRange::point(value)),
    }
}
