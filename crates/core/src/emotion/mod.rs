mod patterns;
mod scorer;
mod weights;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use patterns::{EmotionPattern, ValueRange};
pub use scorer::{EmotionPatternScorer, EmotionReading, KeywordCues, NEUTRAL_MIN_TRANSCRIPT_CHARS};
pub use weights::{EmotionWeights, FeatureWeights};

/// Fixed label set. Declaration order is the tie-break order for argmax.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Angry,
    Excited,
    Calm,
    Nervous,
    Confident,
    Surprised,
    Frustrated,
}

impl Emotion {
    pub const ALL: [Emotion; 10] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Excited,
        Emotion::Calm,
        Emotion::Nervous,
        Emotion::Confident,
        Emotion::Surprised,
        Emotion::Frustrated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Excited => "excited",
            Emotion::Calm => "calm",
            Emotion::Nervous => "nervous",
            Emotion::Confident => "confident",
            Emotion::Surprised => "surprised",
            Emotion::Frustrated => "frustrated",
        }
    }

    /// Maps a canonical name or a common classifier alias onto the label set.
    pub fn from_label(label: &str) -> Option<Emotion> {
        let emotion = match label.trim().to_lowercase().as_str() {
            "neutral" | "boredom" => Emotion::Neutral,
            "happy" | "joy" | "happiness" => Emotion::Happy,
            "sad" | "sadness" => Emotion::Sad,
            "angry" | "anger" => Emotion::Angry,
            "excited" | "excitement" => Emotion::Excited,
            "calm" => Emotion::Calm,
            "nervous" | "fear" | "scared" | "worried" | "anxious" => Emotion::Nervous,
            "confident" | "confidence" => Emotion::Confident,
            "surprised" | "surprise" => Emotion::Surprised,
            "frustrated" | "frustration" => Emotion::Frustrated,
            _ => return None,
        };
        Some(emotion)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Emotion::from_label(s).ok_or_else(|| UnknownEmotion(s.to_owned()))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown emotion label: {0}")]
pub struct UnknownEmotion(pub String);

/// Per-label scores. Acoustic sources use 0..100, fused output uses 0..1.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EmotionScoreSet(BTreeMap<Emotion, f32>);

impl EmotionScoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from external `(label, score)` pairs, keeping the maximum
    /// per mapped label and dropping labels outside the fixed set.
    pub fn from_labeled<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for (label, score) in pairs {
            match Emotion::from_label(label.as_ref()) {
                Some(emotion) => {
                    let current = set.0.entry(emotion).or_insert(score);
                    if score > *current {
                        *current = score;
                    }
                }
                None => {
                    tracing::debug!(label = label.as_ref(), "dropping unmapped emotion label");
                }
            }
        }
        set
    }

    pub fn insert(&mut self, emotion: Emotion, score: f32) {
        self.0.insert(emotion, score);
    }

    /// Score for `emotion`, 0 when the label is absent.
    pub fn get(&self, emotion: Emotion) -> f32 {
        self.0.get(&emotion).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, emotion: Emotion) -> bool {
        self.0.contains_key(&emotion)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = Emotion> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        self.0.iter().map(|(e, s)| (*e, *s))
    }

    pub fn map_values(&self, f: impl Fn(f32) -> f32) -> Self {
        Self(self.0.iter().map(|(e, s)| (*e, f(*s))).collect())
    }

    /// Rescales a 0..100 set into 0..1.
    pub fn to_unit(&self) -> Self {
        self.map_values(|s| s / 100.0)
    }

    /// Argmax; ties resolve to the earliest label in `Emotion::ALL` order.
    pub fn dominant(&self) -> Option<(Emotion, f32)> {
        let mut best: Option<(Emotion, f32)> = None;
        for (emotion, score) in self.iter() {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((emotion, score)),
            }
        }
        best
    }
}

impl FromIterator<(Emotion, f32)> for EmotionScoreSet {
    fn from_iter<T: IntoIterator<Item = (Emotion, f32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_map_onto_fixed_labels() {
        assert_eq!(Emotion::from_label("Anger"), Some(Emotion::Angry));
        assert_eq!(Emotion::from_label("joy"), Some(Emotion::Happy));
        assert_eq!(Emotion::from_label("fear"), Some(Emotion::Nervous));
        assert_eq!(Emotion::from_label("sarcasm"), None);
        assert_eq!("calm".parse::<Emotion>(), Ok(Emotion::Calm));
    }

    #[test]
    fn from_labeled_keeps_max_and_drops_unknown() {
        let set = EmotionScoreSet::from_labeled([
            ("joy", 0.4),
            ("happy", 0.7),
            ("sarcasm", 0.9),
            ("anger", 0.1),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(Emotion::Happy), 0.7);
        assert_eq!(set.get(Emotion::Angry), 0.1);
        assert_eq!(set.get(Emotion::Sad), 0.0);
    }

    #[test]
    fn dominant_ties_resolve_to_label_order() {
        let set: EmotionScoreSet = [(Emotion::Sad, 50.0), (Emotion::Happy, 50.0), (Emotion::Calm, 10.0)]
            .into_iter()
            .collect();
        assert_eq!(set.dominant(), Some((Emotion::Happy, 50.0)));
        assert_eq!(EmotionScoreSet::new().dominant(), None);
    }

    #[test]
    fn serializes_as_label_map() {
        let set: EmotionScoreSet = [(Emotion::Angry, 0.5)].into_iter().collect();
        let json = serde_json::to_string(&set).expect("serialize");
        assert_eq!(json, r#"{"angry":0.5}"#);
    }
}
