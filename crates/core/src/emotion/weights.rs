use super::Emotion;
use crate::config::WeightBounds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trainable multipliers for one label, one per feature category.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeatureWeights {
    pub pitch: f32,
    pub volume: f32,
    pub spectral: f32,
    pub keyword: f32,
}

impl FeatureWeights {
    pub const fn new(pitch: f32, volume: f32, spectral: f32, keyword: f32) -> Self {
        Self {
            pitch,
            volume,
            spectral,
            keyword,
        }
    }

    pub fn clamped(self, bounds: &WeightBounds) -> Self {
        Self {
            pitch: bounds.clamp(self.pitch),
            volume: bounds.clamp(self.volume),
            spectral: bounds.clamp(self.spectral),
            keyword: bounds.clamp(self.keyword),
        }
    }

    fn values(&self) -> [f32; 4] {
        [self.pitch, self.volume, self.spectral, self.keyword]
    }

    fn initial(emotion: Emotion) -> Self {
        match emotion {
            Emotion::Happy => Self::new(1.2, 1.1, 1.1, 1.0),
            Emotion::Sad => Self::new(1.1, 1.2, 1.0, 1.0),
            Emotion::Angry => Self::new(1.3, 1.4, 1.3, 1.2),
            Emotion::Excited => Self::new(1.4, 1.3, 1.2, 1.1),
            Emotion::Calm => Self::new(1.0, 1.0, 1.0, 1.0),
            Emotion::Nervous => Self::new(0.8, 0.7, 0.8, 0.9),
            Emotion::Confident => Self::new(1.1, 1.2, 1.1, 1.1),
            Emotion::Surprised => Self::new(1.3, 1.2, 1.2, 1.0),
            Emotion::Neutral => Self::new(1.0, 1.0, 1.0, 1.0),
            Emotion::Frustrated => Self::new(1.1, 1.1, 1.0, 1.0),
        }
    }
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0)
    }
}

/// Per-label trained weights. Every label in `Emotion::ALL` is always present.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(from = "BTreeMap<Emotion, FeatureWeights>", into = "BTreeMap<Emotion, FeatureWeights>")]
pub struct EmotionWeights {
    by_label: BTreeMap<Emotion, FeatureWeights>,
}

impl EmotionWeights {
    pub fn get(&self, emotion: Emotion) -> FeatureWeights {
        self.by_label.get(&emotion).copied().unwrap_or_default()
    }

    /// Applies `f` to one label's weights and clamps the result into `bounds`.
    pub fn update(
        &mut self,
        emotion: Emotion,
        bounds: &WeightBounds,
        f: impl FnOnce(&mut FeatureWeights),
    ) -> FeatureWeights {
        let mut w = self.get(emotion);
        f(&mut w);
        let w = w.clamped(bounds);
        self.by_label.insert(emotion, w);
        w
    }

    pub fn clamp_all(&mut self, bounds: &WeightBounds) {
        for w in self.by_label.values_mut() {
            *w = w.clamped(bounds);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, FeatureWeights)> + '_ {
        self.by_label.iter().map(|(e, w)| (*e, *w))
    }

    pub fn within(&self, bounds: &WeightBounds) -> bool {
        self.by_label
            .values()
            .flat_map(|w| w.values())
            .all(|v| v >= bounds.min() && v <= bounds.max())
    }
}

impl Default for EmotionWeights {
    fn default() -> Self {
        Self {
            by_label: Emotion::ALL
                .iter()
                .map(|e| (*e, FeatureWeights::initial(*e)))
                .collect(),
        }
    }
}

impl From<BTreeMap<Emotion, FeatureWeights>> for EmotionWeights {
    fn from(stored: BTreeMap<Emotion, FeatureWeights>) -> Self {
        let mut weights = Self::default();
        weights.by_label.extend(stored);
        weights
    }
}

impl From<EmotionWeights> for BTreeMap<Emotion, FeatureWeights> {
    fn from(weights: EmotionWeights) -> Self {
        weights.by_label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_label() {
        let w = EmotionWeights::default();
        assert_eq!(w.iter().count(), Emotion::ALL.len());
        assert_eq!(w.get(Emotion::Angry).volume, 1.4);
        assert!(w.within(&WeightBounds::default()));
    }

    #[test]
    fn update_clamps_into_bounds() {
        let bounds = WeightBounds::default();
        let mut w = EmotionWeights::default();
        let updated = w.update(Emotion::Nervous, &bounds, |fw| {
            fw.pitch -= 5.0;
            fw.volume += 5.0;
        });
        assert_eq!(updated.pitch, 0.1);
        assert_eq!(updated.volume, 2.0);
        assert_eq!(w.get(Emotion::Nervous), updated);
    }

    #[test]
    fn partial_stored_weights_fill_missing_labels() {
        let json = r#"{"happy":{"pitch":1.9,"volume":1.0,"spectral":1.0,"keyword":1.0}}"#;
        let w: EmotionWeights = serde_json::from_str(json).expect("deserialize");
        assert_eq!(w.get(Emotion::Happy).pitch, 1.9);
        assert_eq!(w.get(Emotion::Sad).volume, 1.2);
    }
}
