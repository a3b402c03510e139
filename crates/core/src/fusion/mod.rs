//! Weighted fusion of semantic, acoustic, spectral and keyword score sets.

use crate::config::{AnalysisConfig, AngerOverride, FusionWeights};
use crate::emotion::{Emotion, EmotionScoreSet};
use std::collections::BTreeSet;

const LOG_TARGET: &str = "fusion";

/// Centroid at which the spectral heuristic saturates.
pub const SPECTRAL_SATURATION_HZ: f32 = 4000.0;

/// Brightness heuristic: every label gets `min(1, centroid / 4000)`.
pub fn spectral_heuristic(centroid_hz: f32) -> EmotionScoreSet {
    let value = if centroid_hz.is_finite() {
        (centroid_hz / SPECTRAL_SATURATION_HZ).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Emotion::ALL.iter().map(|e| (*e, value)).collect()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FusionEngine {
    weights: FusionWeights,
    anger: AngerOverride,
}

impl FusionEngine {
    pub fn new(weights: FusionWeights, anger: AngerOverride) -> Self {
        Self { weights, anger }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.fusion, config.anger_override)
    }

    /// Fuses unit-scale inputs into a 0..1 distribution over the union of
    /// their labels. A missing label or modality contributes 0.
    pub fn fuse(
        &self,
        semantic: &EmotionScoreSet,
        acoustic: &EmotionScoreSet,
        spectral: &EmotionScoreSet,
        keyword: &EmotionScoreSet,
    ) -> EmotionScoreSet {
        let labels: BTreeSet<Emotion> = [semantic, acoustic, spectral, keyword]
            .into_iter()
            .flat_map(|set| set.labels())
            .collect();

        let w = &self.weights;
        let mut fused: EmotionScoreSet = labels
            .into_iter()
            .map(|e| {
                let value = w.semantic * finite(semantic.get(e))
                    + w.acoustic * finite(acoustic.get(e))
                    + w.spectral * finite(spectral.get(e))
                    + w.keyword * finite(keyword.get(e));
                (e, value)
            })
            .collect();

        if fused.contains(Emotion::Angry) && self.suppress_anger(acoustic, spectral, keyword) {
            let damped = (fused.get(Emotion::Angry) * self.anger.multiplier).min(self.anger.cap);
            tracing::debug!(
                target: LOG_TARGET,
                before = fused.get(Emotion::Angry),
                after = damped,
                "suppressing acoustic-only anger"
            );
            fused.insert(Emotion::Angry, damped);
        }

        fused.map_values(|v| v.clamp(0.0, 1.0))
    }

    fn suppress_anger(
        &self,
        acoustic: &EmotionScoreSet,
        spectral: &EmotionScoreSet,
        keyword: &EmotionScoreSet,
    ) -> bool {
        finite(acoustic.get(Emotion::Angry)) > self.anger.acoustic_above
            && finite(keyword.get(Emotion::Angry)) <= self.anger.keyword_above
            && finite(spectral.get(Emotion::Angry)) <= self.anger.spectral_above
    }
}

fn finite(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
