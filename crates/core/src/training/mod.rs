//! Online weight training from user-labeled samples.
//!
//! The accuracy figure reported here is a heuristic confidence signal derived
//! from sample counts and trained weights. It is not a measured accuracy and
//! should not be read as ground truth.

mod calibration;

use crate::config::{AnalysisConfig, LearningRates, WeightBounds};
use crate::emotion::{Emotion, EmotionWeights};
use crate::features::FeatureVector;
use crate::util::BoundedHistory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub use calibration::{Calibration, ObservedRange};

const LOG_TARGET: &str = "training";

pub const SESSION_HISTORY_LEN: usize = 100;

const HAPPY_MIN_PITCH_HZ: f32 = 160.0;
const HAPPY_MIN_VOLUME: f32 = 0.4;
const SAD_MAX_PITCH_HZ: f32 = 150.0;
const SAD_MAX_VOLUME: f32 = 0.4;
/// Label that over-triggers and is decayed whenever another label is trained.
const OVER_TRIGGERING: Emotion = Emotion::Nervous;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingSample {
    pub id: String,
    pub emotion: Emotion,
    pub timestamp_ms: u64,
    pub features: FeatureVector,
    pub transcript: Option<String>,
    /// Opaque handle to the audio stored elsewhere.
    pub audio_ref: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LabelStats {
    pub samples: usize,
    pub last_trained_ms: Option<u64>,
    pub accuracy: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStats {
    pub total_samples: u64,
    pub average_accuracy: f32,
    pub recent_accuracy: Vec<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingSnapshot {
    pub samples: Vec<TrainingSample>,
    pub weights: EmotionWeights,
    pub calibration: Calibration,
    pub exported_at_ms: u64,
}

/// Owns trained weights, calibration and samples for one user.
///
/// All mutation goes through `&mut self`; concurrent callers share it through
/// [`crate::store::TrainingHandle`].
#[derive(Clone, Debug)]
pub struct TrainingManager {
    bounds: WeightBounds,
    rates: LearningRates,
    weights: EmotionWeights,
    calibration: Calibration,
    samples: BTreeMap<Emotion, Vec<TrainingSample>>,
    history: BoundedHistory<f32>,
    total_samples: u64,
}

impl TrainingManager {
    pub fn new(bounds: WeightBounds, rates: LearningRates) -> Self {
        Self {
            bounds,
            rates,
            weights: EmotionWeights::default(),
            calibration: Calibration::default(),
            samples: BTreeMap::new(),
            history: BoundedHistory::new(SESSION_HISTORY_LEN),
            total_samples: 0,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.weight_bounds, config.learning)
    }

    /// Replaces weights and calibration with previously persisted state.
    /// Stored weights are clamped into the configured bounds.
    pub fn restore(&mut self, mut weights: EmotionWeights, calibration: Calibration) {
        weights.clamp_all(&self.bounds);
        self.weights = weights;
        self.calibration = calibration;
    }

    pub fn current_weights(&self) -> &EmotionWeights {
        &self.weights
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn record_sample(
        &mut self,
        emotion: Emotion,
        features: FeatureVector,
        transcript: Option<String>,
    ) -> TrainingSample {
        self.record_sample_with_audio(emotion, features, transcript, None)
    }

    /// Appends a sample, nudges weights and calibration, and returns the
    /// stored sample. Never fails: out-of-bound updates are clamped.
    pub fn record_sample_with_audio(
        &mut self,
        emotion: Emotion,
        features: FeatureVector,
        transcript: Option<String>,
        audio_ref: Option<String>,
    ) -> TrainingSample {
        let timestamp_ms = now_ms();
        let sample = TrainingSample {
            id: sample_id(timestamp_ms),
            emotion,
            timestamp_ms,
            features,
            transcript,
            audio_ref,
        };

        self.adjust_weights(emotion, &sample.features);
        self.calibration.observe(
            sample.features.pitch_hz,
            sample.features.volume,
            self.rates.calibration_alpha,
            timestamp_ms,
        );
        self.samples.entry(emotion).or_default().push(sample.clone());
        self.total_samples += 1;

        let accuracy = self.accuracy(emotion);
        self.history.push(accuracy);
        tracing::debug!(
            target: LOG_TARGET,
            %emotion,
            id = %sample.id,
            accuracy,
            "recorded training sample"
        );
        sample
    }

    fn adjust_weights(&mut self, emotion: Emotion, features: &FeatureVector) {
        let step = self.rates.reinforce_step;
        let reinforce = match emotion {
            Emotion::Happy => {
                features.pitch_hz > HAPPY_MIN_PITCH_HZ && features.volume > HAPPY_MIN_VOLUME
            }
            Emotion::Sad => features.pitch_hz < SAD_MAX_PITCH_HZ && features.volume < SAD_MAX_VOLUME,
            _ => false,
        };
        if reinforce {
            self.weights.update(emotion, &self.bounds, |w| {
                w.pitch += step;
                w.volume += step;
            });
        }

        if emotion != OVER_TRIGGERING {
            let decay = self.rates.decay_step;
            self.weights.update(OVER_TRIGGERING, &self.bounds, |w| {
                w.pitch -= decay;
                w.volume -= decay;
            });
        }
    }

    /// Heuristic 0..100 confidence for `emotion`; 0 before any samples.
    pub fn accuracy(&self, emotion: Emotion) -> f32 {
        let count = self.sample_count(emotion);
        if count == 0 {
            return 0.0;
        }
        let w = self.weights.get(emotion);
        let raw = 30.0 + 10.0 * count as f32 + 10.0 * (w.pitch + w.volume);
        raw.min(100.0).clamp(0.0, 100.0)
    }

    pub fn sample_count(&self, emotion: Emotion) -> usize {
        self.samples.get(&emotion).map_or(0, Vec::len)
    }

    pub fn samples(&self, emotion: Emotion) -> &[TrainingSample] {
        self.samples.get(&emotion).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn stats(&self) -> BTreeMap<Emotion, LabelStats> {
        Emotion::ALL
            .iter()
            .map(|emotion| {
                let samples = self.samples(*emotion);
                let stats = LabelStats {
                    samples: samples.len(),
                    last_trained_ms: samples.last().map(|s| s.timestamp_ms),
                    accuracy: self.accuracy(*emotion),
                };
                (*emotion, stats)
            })
            .collect()
    }

    pub fn session(&self) -> SessionStats {
        SessionStats {
            total_samples: self.total_samples,
            average_accuracy: self.history.mean().unwrap_or(0.0),
            recent_accuracy: self.history.iter().copied().collect(),
        }
    }

    /// Drops samples for one label, or everything (weights and calibration
    /// included) when `emotion` is `None`.
    pub fn clear(&mut self, emotion: Option<Emotion>) {
        match emotion {
            Some(emotion) => {
                self.samples.remove(&emotion);
            }
            None => {
                self.samples.clear();
                self.weights = EmotionWeights::default();
                self.calibration = Calibration::default();
                self.history.clear();
                self.total_samples = 0;
            }
        }
        tracing::info!(target: LOG_TARGET, label = ?emotion, "cleared training data");
    }

    pub fn export(&self) -> TrainingSnapshot {
        TrainingSnapshot {
            samples: self.samples.values().flatten().cloned().collect(),
            weights: self.weights.clone(),
            calibration: self.calibration.clone(),
            exported_at_ms: now_ms(),
        }
    }

    /// Replaces all state with `snapshot`.
    pub fn import(&mut self, snapshot: TrainingSnapshot) {
        self.samples.clear();
        for sample in snapshot.samples {
            self.samples.entry(sample.emotion).or_default().push(sample);
        }
        for list in self.samples.values_mut() {
            list.sort_by_key(|s| s.timestamp_ms);
        }
        self.total_samples = self.samples.values().map(|v| v.len() as u64).sum();
        self.history.clear();
        self.restore(snapshot.weights, snapshot.calibration);
        tracing::info!(
            target: LOG_TARGET,
            samples = self.total_samples,
            "imported training snapshot"
        );
    }
}

impl Default for TrainingManager {
    fn default() -> Self {
        Self::new(WeightBounds::default(), LearningRates::default())
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn sample_id(timestamp_ms: u64) -> String {
    format!("{timestamp_ms}-{:08x}", rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn voice(pitch_hz: f32, volume: f32) -> FeatureVector {
        FeatureVector {
            pitch_hz,
            volume,
            ..FeatureVector::silent()
        }
    }

    #[test]
    fn repeated_happy_samples_raise_happy_but_not_sad() {
        let mut manager = TrainingManager::default();
        manager.record_sample(Emotion::Happy, voice(200.0, 0.5), None);
        let after_one = manager.accuracy(Emotion::Happy);
        let sad_before = manager.accuracy(Emotion::Sad);

        for _ in 0..9 {
            manager.record_sample(Emotion::Happy, voice(200.0, 0.5), Some("great".into()));
        }
        assert!(manager.accuracy(Emotion::Happy) > after_one);
        assert!(manager.accuracy(Emotion::Sad) <= sad_before);
        assert_eq!(manager.sample_count(Emotion::Happy), 10);
    }

    #[test]
    fn reinforcement_and_decay_steps() {
        let mut manager = TrainingManager::default();
        manager.record_sample(Emotion::Happy, voice(200.0, 0.5), None);
        let w = manager.current_weights();
        assert!((w.get(Emotion::Happy).pitch - 1.3).abs() < 1e-6);
        assert!((w.get(Emotion::Happy).volume - 1.2).abs() < 1e-6);
        assert!((w.get(Emotion::Nervous).pitch - 0.75).abs() < 1e-6);
        assert!((w.get(Emotion::Nervous).volume - 0.65).abs() < 1e-6);

        // Quiet happy sample is recorded but not reinforced.
        manager.record_sample(Emotion::Happy, voice(200.0, 0.1), None);
        assert!((manager.current_weights().get(Emotion::Happy).pitch - 1.3).abs() < 1e-6);

        // Training the over-triggering label itself does not decay it.
        let before = manager.current_weights().get(Emotion::Nervous);
        manager.record_sample(Emotion::Nervous, voice(200.0, 0.3), None);
        assert_eq!(manager.current_weights().get(Emotion::Nervous), before);
    }

    #[test]
    fn weights_stay_bounded_under_long_training() {
        let mut manager = TrainingManager::default();
        let bounds = WeightBounds::default();
        for i in 0..200 {
            let (emotion, f) = if i % 2 == 0 {
                (Emotion::Happy, voice(250.0, 0.8))
            } else {
                (Emotion::Sad, voice(100.0, 0.1))
            };
            manager.record_sample(emotion, f, None);
            assert!(manager.current_weights().within(&bounds));
        }
        assert_eq!(manager.current_weights().get(Emotion::Happy).pitch, 2.0);
        assert_eq!(manager.current_weights().get(Emotion::Nervous).volume, 0.1);
    }

    #[test]
    fn accuracy_formula() {
        let mut manager = TrainingManager::default();
        assert_eq!(manager.accuracy(Emotion::Calm), 0.0);
        manager.record_sample(Emotion::Calm, voice(150.0, 0.3), None);
        // 30 + 10 * 1 + 10 * (1.0 + 1.0)
        assert!((manager.accuracy(Emotion::Calm) - 60.0).abs() < 1e-4);
    }

    #[test]
    fn samples_get_unique_ids_and_calibration_updates() {
        let mut manager = TrainingManager::default();
        let ids: BTreeSet<String> = (0..20)
            .map(|_| manager.record_sample(Emotion::Calm, voice(150.0, 0.3), None).id)
            .collect();
        assert_eq!(ids.len(), 20);
        assert_eq!(manager.calibration().sample_count, 20);
        let baseline = manager.calibration().baseline_pitch_hz.unwrap_or_default();
        assert!((baseline - 150.0).abs() < 1e-3);
    }

    #[test]
    fn stats_and_session() {
        let mut manager = TrainingManager::default();
        manager.record_sample(Emotion::Sad, voice(120.0, 0.2), None);
        manager.record_sample(Emotion::Angry, voice(300.0, 0.9), None);

        let stats = manager.stats();
        assert_eq!(stats.len(), Emotion::ALL.len());
        assert_eq!(stats[&Emotion::Sad].samples, 1);
        assert!(stats[&Emotion::Sad].last_trained_ms.is_some());
        assert_eq!(stats[&Emotion::Happy].samples, 0);

        let session = manager.session();
        assert_eq!(session.total_samples, 2);
        assert_eq!(session.recent_accuracy.len(), 2);
        assert!(session.average_accuracy > 0.0);
    }

    #[test]
    fn clear_one_label_or_everything() {
        let mut manager = TrainingManager::default();
        manager.record_sample(Emotion::Happy, voice(200.0, 0.5), None);
        manager.record_sample(Emotion::Sad, voice(100.0, 0.2), None);

        manager.clear(Some(Emotion::Happy));
        assert_eq!(manager.sample_count(Emotion::Happy), 0);
        assert_eq!(manager.sample_count(Emotion::Sad), 1);

        manager.clear(None);
        assert_eq!(manager.sample_count(Emotion::Sad), 0);
        assert_eq!(manager.current_weights(), &EmotionWeights::default());
        assert_eq!(manager.session().total_samples, 0);
    }

    #[test]
    fn export_then_import_restores_state() {
        let mut source = TrainingManager::default();
        source.record_sample(Emotion::Happy, voice(200.0, 0.5), Some("love it".into()));
        source.record_sample(Emotion::Sad, voice(100.0, 0.2), None);
        let snapshot = source.export();
        assert_eq!(snapshot.samples.len(), 2);

        let json = serde_json::to_string(&snapshot).expect("serialize");
        let restored: TrainingSnapshot = serde_json::from_str(&json).expect("deserialize");

        let mut target = TrainingManager::default();
        target.import(restored);
        assert_eq!(target.current_weights(), source.current_weights());
        assert_eq!(target.sample_count(Emotion::Happy), 1);
        assert_eq!(target.accuracy(Emotion::Sad), source.accuracy(Emotion::Sad));
        assert_eq!(target.calibration(), source.calibration());
    }
}
