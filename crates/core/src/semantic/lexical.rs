use super::{LabelScore, SemanticClassifier, SemanticError};
use crate::emotion::Emotion;
use futures::future::BoxFuture;
use futures::FutureExt;

const INTENSIFIERS: &[&str] = &[
    "very",
    "extremely",
    "really",
    "so",
    "incredibly",
    "absolutely",
    "totally",
    "completely",
];

const BASE: f32 = 0.4;
const PER_MATCH: f32 = 0.2;
const BASE_CAP: f32 = 0.9;
const INTENSIFIER_BOOST: f32 = 0.15;
const LONG_TEXT_CHARS: usize = 50;
const LONG_TEXT_BOOST: f32 = 0.08;
const MIXED_BOOST: f32 = 0.05;
const NEUTRAL_FALLBACK: f32 = 0.7;

/// Offline keyword classifier used when no remote endpoint is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalClassifier;

impl LexicalClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, text: &str) -> Vec<LabelScore> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();
        let intensifiers = words.iter().filter(|w| INTENSIFIERS.contains(w)).count() as f32;
        let long_text = text.chars().count() > LONG_TEXT_CHARS;

        let mut scores: Vec<LabelScore> = Emotion::ALL
            .iter()
            .filter(|e| **e != Emotion::Neutral)
            .filter_map(|emotion| {
                let matches = emotion
                    .pattern()
                    .keywords
                    .iter()
                    .filter(|kw| lower.contains(*kw))
                    .count();
                if matches == 0 {
                    return None;
                }
                let mut score = (BASE + PER_MATCH * matches as f32).min(BASE_CAP);
                score += INTENSIFIER_BOOST * intensifiers;
                if long_text {
                    score += LONG_TEXT_BOOST;
                }
                Some(LabelScore::new(emotion.as_str(), score))
            })
            .collect();

        if scores.is_empty() {
            return vec![LabelScore::new(Emotion::Neutral.as_str(), NEUTRAL_FALLBACK)];
        }
        let mixed = scores.len() > 1;
        for s in &mut scores {
            if mixed {
                s.score += MIXED_BOOST;
            }
            s.score = s.score.min(1.0);
        }
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        scores
    }
}

impl SemanticClassifier for LexicalClassifier {
    fn classify(
        &self,
        text: String,
        _locale: String,
    ) -> BoxFuture<'_, Result<Vec<LabelScore>, SemanticError>> {
        let scores = self.classify_text(&text);
        async move { Ok(scores) }.boxed()
    }
}
