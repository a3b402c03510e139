use super::{LabelScore, SemanticClassifier, SemanticError, LOG_TARGET};
use crate::config::{ApiKey, SemanticConfig};
use crate::emotion::Emotion;
use crate::util::{is_http_retryable, retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Zero-shot classifier behind a HuggingFace-style inference endpoint.
#[derive(Clone)]
pub struct HttpSemanticClassifier {
    client: Client,
    endpoint: Url,
    api_key: Option<ApiKey>,
    retry: RetryConfig,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
    parameters: ClassifyParameters,
}

#[derive(Serialize)]
struct ClassifyParameters {
    candidate_labels: Vec<&'static str>,
    multi_label: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Flat(Vec<LabelScore>),
    Nested(Vec<Vec<LabelScore>>),
    Columns { labels: Vec<String>, scores: Vec<f32> },
}

impl ClassifyResponse {
    fn into_pairs(self) -> Result<Vec<LabelScore>, SemanticError> {
        match self {
            ClassifyResponse::Flat(pairs) => Ok(pairs),
            ClassifyResponse::Nested(rows) => Ok(rows.into_iter().flatten().collect()),
            ClassifyResponse::Columns { labels, scores } => {
                if labels.len() != scores.len() {
                    return Err(SemanticError::InvalidResponse(format!(
                        "{} labels but {} scores",
                        labels.len(),
                        scores.len()
                    )));
                }
                Ok(labels
                    .into_iter()
                    .zip(scores)
                    .map(|(label, score)| LabelScore::new(label, score))
                    .collect())
            }
        }
    }
}

impl HttpSemanticClassifier {
    pub fn new(
        endpoint: Url,
        api_key: Option<ApiKey>,
        timeout: Duration,
    ) -> Result<Self, SemanticError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            retry: RetryConfig::default(),
        })
    }

    /// `None` when no endpoint is configured.
    pub fn from_config(config: &SemanticConfig) -> Result<Option<Self>, SemanticError> {
        match &config.endpoint {
            Some(endpoint) => Ok(Some(Self::new(
                endpoint.clone(),
                config.api_key.clone(),
                config.timeout(),
            )?)),
            None => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn request_once(&self, text: &str, locale: &str) -> Result<Vec<LabelScore>, SemanticError> {
        let body = ClassifyRequest {
            inputs: text,
            parameters: ClassifyParameters {
                candidate_labels: Emotion::ALL.iter().map(|e| e.as_str()).collect(),
                multi_label: true,
            },
        };

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("Accept-Language", locale)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SemanticError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| SemanticError::InvalidResponse(e.to_string()))?;
        parsed.into_pairs()
    }
}

fn is_retryable(e: &SemanticError) -> bool {
    match e {
        SemanticError::Network(e) => e.is_timeout() || e.is_connect(),
        SemanticError::Status { status, .. } => is_http_retryable(*status),
        SemanticError::InvalidResponse(_) => false,
    }
}

/// Maps onto the fixed label set, keeps the best score per label and
/// rescales so the mapped scores sum to 1. Highest first.
fn normalize(pairs: Vec<LabelScore>) -> Vec<LabelScore> {
    let mut best: BTreeMap<Emotion, f32> = BTreeMap::new();
    for pair in pairs {
        let Some(emotion) = Emotion::from_label(&pair.label) else {
            continue;
        };
        if !pair.score.is_finite() || pair.score < 0.0 {
            continue;
        }
        let entry = best.entry(emotion).or_insert(pair.score);
        *entry = entry.max(pair.score);
    }

    let total: f32 = best.values().sum();
    let mut out: Vec<LabelScore> = best
        .into_iter()
        .map(|(emotion, score)| {
            let score = if total > 0.0 { score / total } else { 0.0 };
            LabelScore::new(emotion.as_str(), score)
        })
        .collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    out
}

impl SemanticClassifier for HttpSemanticClassifier {
    fn classify(
        &self,
        text: String,
        locale: String,
    ) -> BoxFuture<'_, Result<Vec<LabelScore>, SemanticError>> {
        async move {
            let (text, locale) = (text.as_str(), locale.as_str());
            let pairs = retry_with_backoff(
                &self.retry,
                || self.request_once(text, locale),
                is_retryable,
            )
            .await?;
            let scores = normalize(pairs);
            tracing::debug!(
                target: LOG_TARGET,
                labels = scores.len(),
                top = scores.first().map(|s| s.label.as_str()).unwrap_or("none"),
                "semantic scores received"
            );
            Ok(scores)
        }
        .boxed()
    }
}
