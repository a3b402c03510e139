use super::{Emotion, EmotionScoreSet, EmotionWeights};
use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const PITCH_POINTS: f32 = 30.0;
const VOLUME_POINTS: f32 = 25.0;
const CENTROID_POINTS: f32 = 20.0;
const KEYWORD_POINTS: f32 = 25.0;
const KEYWORD_POINTS_PER_MATCH: f32 = 8.0;
const MAX_POINTS: f32 = PITCH_POINTS + VOLUME_POINTS + CENTROID_POINTS + KEYWORD_POINTS;

pub const NEUTRAL_MIN_TRANSCRIPT_CHARS: usize = 10;
const NEUTRAL_FLOOR: f32 = 40.0;
const CONFIDENCE_FRACTION: f32 = 0.85;

const MFCC_ANGRY_ABOVE: f32 = 100.0;
const MFCC_ANGRY_BONUS: f32 = 8.0;
const MFCC_HAPPY_BELOW: f32 = 30.0;
const MFCC_HAPPY_PENALTY: f32 = 6.0;

const NERVOUS_LOUD_VOLUME: f32 = 0.6;
const NERVOUS_LOW_PITCH_HZ: f32 = 150.0;

/// Keyword match counts per label plus the transcript length they came from.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordCues {
    counts: BTreeMap<Emotion, u32>,
    transcript_chars: usize,
}

impl KeywordCues {
    pub fn new(counts: BTreeMap<Emotion, u32>, transcript_chars: usize) -> Self {
        Self {
            counts,
            transcript_chars,
        }
    }

    /// Counts, per label, how many of its keywords occur in `transcript`
    /// (case-insensitive substring match).
    pub fn from_transcript(transcript: &str) -> Self {
        let lower = transcript.to_lowercase();
        let counts = Emotion::ALL
            .iter()
            .filter_map(|emotion| {
                let hits = emotion
                    .pattern()
                    .keywords
                    .iter()
                    .filter(|kw| lower.contains(*kw))
                    .count() as u32;
                (hits > 0).then_some((*emotion, hits))
            })
            .collect();
        Self {
            counts,
            transcript_chars: transcript.trim().chars().count(),
        }
    }

    pub fn count(&self, emotion: Emotion) -> u32 {
        self.counts.get(&emotion).copied().unwrap_or(0)
    }

    pub fn transcript_chars(&self) -> usize {
        self.transcript_chars
    }

    fn keyword_points(&self, emotion: Emotion) -> f32 {
        let hits = self.count(emotion);
        if hits == 0 {
            return 0.0;
        }
        (hits as f32 * KEYWORD_POINTS_PER_MATCH).min(KEYWORD_POINTS)
    }

    /// Keyword modality for fusion, 0..1 per label.
    pub fn keyword_scores(&self) -> EmotionScoreSet {
        Emotion::ALL
            .iter()
            .map(|e| (*e, self.keyword_points(*e) / KEYWORD_POINTS))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmotionReading {
    pub percentage: f32,
    pub confidence: f32,
}

impl EmotionReading {
    pub fn from_percentage(percentage: f32) -> Self {
        Self {
            percentage,
            confidence: percentage * CONFIDENCE_FRACTION,
        }
    }
}

/// Rule-based scorer over the reference pattern table.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmotionPatternScorer;

impl EmotionPatternScorer {
    pub fn new() -> Self {
        Self
    }

    /// Scores every label in 0..100. Without cues the transcript counts as empty.
    pub fn score(
        &self,
        features: &FeatureVector,
        cues: Option<&KeywordCues>,
        weights: &EmotionWeights,
    ) -> EmotionScoreSet {
        let empty = KeywordCues::default();
        let cues = cues.unwrap_or(&empty);
        Emotion::ALL
            .iter()
            .map(|emotion| (*emotion, self.score_label(*emotion, features, cues, weights)))
            .collect()
    }

    fn score_label(
        &self,
        emotion: Emotion,
        features: &FeatureVector,
        cues: &KeywordCues,
        weights: &EmotionWeights,
    ) -> f32 {
        let pattern = emotion.pattern();
        let w = weights.get(emotion);

        let mut points = 0.0;
        if pattern.pitch_hz.contains(features.pitch_hz) {
            points += PITCH_POINTS * w.pitch;
        }
        if pattern.volume.contains(features.volume) {
            points += VOLUME_POINTS * w.volume;
        }
        if pattern.centroid_hz.contains(features.spectral_centroid_hz) {
            points += CENTROID_POINTS * w.spectral;
        }
        points += cues.keyword_points(emotion) * w.keyword;

        let mut percentage = points / MAX_POINTS * 100.0;

        if let Some(first) = features.mfcc_means.first() {
            let magnitude = first.abs();
            match emotion {
                Emotion::Angry if magnitude > MFCC_ANGRY_ABOVE => {
                    percentage = (percentage + MFCC_ANGRY_BONUS).min(100.0);
                }
                Emotion::Happy if magnitude < MFCC_HAPPY_BELOW => {
                    percentage = (percentage - MFCC_HAPPY_PENALTY).max(0.0);
                }
                _ => {}
            }
        }

        if emotion == Emotion::Neutral && cues.transcript_chars() < NEUTRAL_MIN_TRANSCRIPT_CHARS {
            percentage = percentage.max(NEUTRAL_FLOOR);
        }

        if emotion == Emotion::Nervous
            && (features.volume > NERVOUS_LOUD_VOLUME
                || features.pitch_hz < NERVOUS_LOW_PITCH_HZ
                || cues.count(Emotion::Nervous) == 0)
        {
            let nervous = weights.get(Emotion::Nervous);
            percentage *= nervous.pitch * nervous.volume;
        }

        if percentage.is_finite() {
            percentage.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    pub fn readings(&self, scores: &EmotionScoreSet) -> BTreeMap<Emotion, EmotionReading> {
        scores
            .iter()
            .map(|(e, s)| (e, EmotionReading::from_percentage(s)))
            .collect()
    }
}
