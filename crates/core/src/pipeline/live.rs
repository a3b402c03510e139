use super::{Analysis, Analyzer, PipelineError, LOG_TARGET};
use crate::audio::AudioFrame;
use crate::config::AnalysisConfig;
use crate::emotion::EmotionScoreSet;
use crate::semantic::{
    classifier_from_config, classify_or_empty, GateDecision, SemanticClassifier, SemanticGate,
    UtteranceToken,
};
use crate::store::TrainingHandle;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const INPUT_CAPACITY: usize = 16;

/// One caller tick: the latest frame plus whatever transcript exists so far
/// for the utterance.
#[derive(Clone, Debug)]
pub struct PipelineInput {
    /// Caller-assigned utterance id; must not decrease.
    pub utterance: u64,
    pub frame: AudioFrame,
    pub transcript: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LiveUpdate {
    pub utterance: u64,
    pub analysis: Analysis,
}

type SemanticResult = (UtteranceToken, EmotionScoreSet);

pub struct LivePipeline {
    analyzer: Analyzer,
    training: TrainingHandle,
    classifier: Arc<dyn SemanticClassifier>,
    gate: SemanticGate,
    locale: String,
}

impl LivePipeline {
    pub fn new(
        analyzer: Analyzer,
        training: TrainingHandle,
        classifier: Arc<dyn SemanticClassifier>,
        gate: SemanticGate,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            analyzer,
            training,
            classifier,
            gate,
            locale: locale.into(),
        }
    }

    pub fn from_config(
        config: &AnalysisConfig,
        training: TrainingHandle,
    ) -> Result<Self, PipelineError> {
        let classifier = classifier_from_config(&config.semantic)?;
        Ok(Self::new(
            Analyzer::new(config),
            training,
            classifier,
            SemanticGate::new(config.semantic.debounce()),
            config.semantic.locale.clone(),
        ))
    }

    pub fn spawn(self) -> PipelineHandle {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let (update_tx, update_rx) = watch::channel(None);
        let task = tokio::spawn(self.into_loop(update_tx).run(input_rx));
        PipelineHandle {
            inputs: input_tx,
            updates: update_rx,
            task,
        }
    }

    fn into_loop(self, updates: watch::Sender<Option<LiveUpdate>>) -> LiveLoop {
        let (results_tx, results_rx) = mpsc::channel(INPUT_CAPACITY);
        LiveLoop {
            pipeline: self,
            semantic: EmotionScoreSet::new(),
            last: None,
            results_tx,
            results_rx,
            updates,
        }
    }
}

/// Caller side of a running [`LivePipeline`].
pub struct PipelineHandle {
    inputs: mpsc::Sender<PipelineInput>,
    updates: watch::Receiver<Option<LiveUpdate>>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    pub async fn submit(&self, input: PipelineInput) -> Result<(), PipelineError> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    pub fn latest(&self) -> Option<LiveUpdate> {
        self.updates.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LiveUpdate>> {
        self.updates.clone()
    }

    /// Stops accepting input and waits for the loop to drain. Semantic calls
    /// still running are left to finish and their results are dropped.
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        drop(self.inputs);
        self.task
            .await
            .map_err(|e| PipelineError::TaskFailed(e.to_string()))
    }
}

struct LiveLoop {
    pipeline: LivePipeline,
    /// Semantic scores for the current utterance.
    semantic: EmotionScoreSet,
    last: Option<LiveUpdate>,
    results_tx: mpsc::Sender<SemanticResult>,
    results_rx: mpsc::Receiver<SemanticResult>,
    updates: watch::Sender<Option<LiveUpdate>>,
}

impl LiveLoop {
    async fn run(mut self, mut inputs: mpsc::Receiver<PipelineInput>) {
        tracing::info!(target: LOG_TARGET, "live pipeline started");
        loop {
            tokio::select! {
                // Apply finished semantic calls before the next tick.
                biased;
                Some((token, scores)) = self.results_rx.recv() => {
                    self.on_semantic(token, scores);
                }
                input = inputs.recv() => {
                    let Some(input) = input else { break };
                    self.on_input(input).await;
                }
            }
        }
        tracing::info!(target: LOG_TARGET, "live pipeline stopped");
    }

    async fn on_input(&mut self, input: PipelineInput) {
        let gate = &mut self.pipeline.gate;
        let previous = gate.current();
        if input.utterance < previous.get() {
            tracing::debug!(
                target: LOG_TARGET,
                utterance = input.utterance,
                current = previous.get(),
                "dropping input for a finished utterance"
            );
            return;
        }
        let token = gate.observe(input.utterance);
        if token != previous {
            self.semantic = EmotionScoreSet::new();
        }

        let weights = self.pipeline.training.weights().await;
        let analysis = self.pipeline.analyzer.analyze_frame(
            &input.frame,
            input.transcript.as_deref(),
            &weights,
            &self.semantic,
        );
        self.publish(LiveUpdate {
            utterance: token.get(),
            analysis,
        });

        if let Some(text) = input.transcript.filter(|t| !t.trim().is_empty()) {
            self.dispatch(token, text);
        }
    }

    fn dispatch(&mut self, token: UtteranceToken, text: String) {
        match self.pipeline.gate.try_dispatch(token) {
            GateDecision::Dispatch => {
                let classifier = self.pipeline.classifier.clone();
                let locale = self.pipeline.locale.clone();
                let results = self.results_tx.clone();
                tracing::debug!(target: LOG_TARGET, utterance = token.get(), "dispatching semantic call");
                tokio::spawn(async move {
                    let scores = classify_or_empty(classifier.as_ref(), &text, &locale).await;
                    // The loop may already be gone.
                    let _ = results.send((token, scores)).await;
                });
            }
            decision => {
                tracing::trace!(target: LOG_TARGET, utterance = token.get(), ?decision, "semantic call skipped");
            }
        }
    }

    fn on_semantic(&mut self, token: UtteranceToken, scores: EmotionScoreSet) {
        if !self.pipeline.gate.complete(token) {
            tracing::debug!(
                target: LOG_TARGET,
                utterance = token.get(),
                "discarding stale semantic result"
            );
            return;
        }
        self.semantic = scores;

        let Some(mut update) = self.last.clone() else {
            return;
        };
        if update.utterance != token.get() {
            return;
        }
        self.pipeline
            .analyzer
            .refuse(&mut update.analysis, self.semantic.clone());
        self.publish(update);
    }

    fn publish(&mut self, update: LiveUpdate) {
        self.last = Some(update.clone());
        self.updates.send_replace(Some(update));
    }
}
