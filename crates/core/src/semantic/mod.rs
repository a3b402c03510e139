//! Text-based emotion scoring collaborators.
//!
//! The core treats semantic scoring as an opaque service returning
//! `(label, score)` pairs. Any failure degrades to an empty score set.

mod gate;
mod http;
mod lexical;

use crate::config::SemanticConfig;
use crate::emotion::EmotionScoreSet;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use gate::{GateDecision, SemanticGate, UtteranceToken};
pub use http::HttpSemanticClassifier;
pub use lexical::LexicalClassifier;

const LOG_TARGET: &str = "semantic";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SemanticError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),
}

pub trait SemanticClassifier: Send + Sync {
    /// Scores `text` per label, highest first, each in 0..1.
    fn classify(
        &self,
        text: String,
        locale: String,
    ) -> BoxFuture<'_, Result<Vec<LabelScore>, SemanticError>>;
}

/// The HTTP classifier when an endpoint is configured, otherwise the
/// offline lexical one.
pub fn classifier_from_config(
    config: &SemanticConfig,
) -> Result<Arc<dyn SemanticClassifier>, SemanticError> {
    match HttpSemanticClassifier::from_config(config)? {
        Some(http) => {
            tracing::info!(target: LOG_TARGET, endpoint = %http.endpoint(), "using remote semantic classifier");
            Ok(Arc::new(http))
        }
        None => {
            tracing::info!(target: LOG_TARGET, "no semantic endpoint configured, using lexical classifier");
            Ok(Arc::new(LexicalClassifier::new()))
        }
    }
}

/// Runs `classifier` and maps the result onto the fixed label set. Failures
/// and blank text produce an empty set.
pub async fn classify_or_empty(
    classifier: &dyn SemanticClassifier,
    text: &str,
    locale: &str,
) -> EmotionScoreSet {
    if text.trim().is_empty() {
        return EmotionScoreSet::new();
    }
    match classifier.classify(text.to_owned(), locale.to_owned()).await {
        Ok(scores) => EmotionScoreSet::from_labeled(
            scores
                .into_iter()
                .map(|s| (s.label, s.score.clamp(0.0, 1.0))),
        ),
        Err(e) => {
            tracing::warn!(target: LOG_TARGET, error = %e, "semantic scoring failed");
            EmotionScoreSet::new()
        }
    }
}
