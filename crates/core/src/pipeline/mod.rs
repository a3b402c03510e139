//! One-shot analysis and the live, tick-driven pipeline.

mod live;

use crate::audio::{decode_clip, AudioClip, AudioFrame, DecodeError};
use crate::config::AnalysisConfig;
use crate::emotion::{
    Emotion, EmotionPatternScorer, EmotionScoreSet, EmotionWeights, KeywordCues,
};
use crate::features::{ClipFeatures, FeatureStats, FeatureVector, SpectralFeatureExtractor};
use crate::fusion::{spectral_heuristic, FusionEngine};
use crate::pitch::PitchEstimator;
use crate::semantic::SemanticError;
use serde::{Deserialize, Serialize};

pub use live::{LivePipeline, LiveUpdate, PipelineHandle, PipelineInput};

const LOG_TARGET: &str = "pipeline";

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("semantic classifier setup failed: {0}")]
    Semantic(#[from] SemanticError),
    #[error("internal channel closed")]
    ChannelClosed,
    #[error("pipeline task failed: {0}")]
    TaskFailed(String),
}

/// Whole-clip statistics, including pitch over voiced frames.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClipSummary {
    pub features: ClipFeatures,
    pub pitch: FeatureStats,
    pub voiced_frames: usize,
}

/// Every modality that went into one fused result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub features: FeatureVector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<ClipSummary>,
    /// Pattern scorer output, 0..100.
    pub acoustic: EmotionScoreSet,
    pub keyword: EmotionScoreSet,
    pub spectral: EmotionScoreSet,
    pub semantic: EmotionScoreSet,
    /// Fused distribution, 0..1.
    pub fused: EmotionScoreSet,
    pub dominant: Option<Emotion>,
    pub confidence: f32,
}

#[derive(Clone, Debug, Default)]
pub struct Analyzer {
    pitch: PitchEstimator,
    extractor: SpectralFeatureExtractor,
    scorer: EmotionPatternScorer,
    fusion: FusionEngine,
}

impl Analyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            pitch: PitchEstimator::from_config(config),
            extractor: SpectralFeatureExtractor::from_config(config),
            scorer: EmotionPatternScorer::new(),
            fusion: FusionEngine::from_config(config),
        }
    }

    /// Pitch plus spectral features for one frame. Non-finite results
    /// degrade to a silent vector.
    pub fn frame_features(&self, frame: &AudioFrame) -> FeatureVector {
        let features = self
            .extractor
            .extract_frame(frame)
            .with_pitch(self.pitch.estimate(frame));
        sanitize(features)
    }

    pub fn analyze_frame(
        &self,
        frame: &AudioFrame,
        transcript: Option<&str>,
        weights: &EmotionWeights,
        semantic: &EmotionScoreSet,
    ) -> Analysis {
        let features = self.frame_features(frame);
        self.analyze_features(features, None, transcript, weights, semantic)
    }

    /// Analyzes `start_secs..end_secs` of `clip`. Pitch is the median over
    /// voiced frames.
    pub fn analyze_clip(
        &self,
        clip: &AudioClip,
        start_secs: f32,
        end_secs: f32,
        transcript: Option<&str>,
        weights: &EmotionWeights,
        semantic: &EmotionScoreSet,
    ) -> Analysis {
        let summary = self.clip_summary(clip, start_secs, end_secs);
        let features = sanitize(summary.features.vector.clone().with_pitch(summary.pitch.median));
        self.analyze_features(features, Some(summary), transcript, weights, semantic)
    }

    /// Decodes an encoded WAV/MP3 file and analyzes all of it.
    pub fn analyze_encoded(
        &self,
        bytes: Vec<u8>,
        extension: Option<&str>,
        transcript: Option<&str>,
        weights: &EmotionWeights,
        semantic: &EmotionScoreSet,
    ) -> Result<Analysis, PipelineError> {
        let clip = decode_clip(bytes, extension)?;
        let end = clip.duration().as_secs_f32();
        Ok(self.analyze_clip(&clip, 0.0, end, transcript, weights, semantic))
    }

    pub fn clip_summary(&self, clip: &AudioClip, start_secs: f32, end_secs: f32) -> ClipSummary {
        let features = self.extractor.analyze_clip(clip, start_secs, end_secs);
        let size = self.extractor.frame_size();
        let voiced: Vec<f32> = AudioClip::frames_of(
            clip.span(start_secs, end_secs),
            clip.sample_rate_hz(),
            size,
            size / 2,
        )
        .map(|frame| self.pitch.estimate(&frame))
        .filter(|hz| *hz > 0.0)
        .collect();

        ClipSummary {
            features,
            pitch: FeatureStats::from_values(&voiced),
            voiced_frames: voiced.len(),
        }
    }

    fn analyze_features(
        &self,
        features: FeatureVector,
        clip: Option<ClipSummary>,
        transcript: Option<&str>,
        weights: &EmotionWeights,
        semantic: &EmotionScoreSet,
    ) -> Analysis {
        let cues = KeywordCues::from_transcript(transcript.unwrap_or_default());
        let acoustic = self.scorer.score(&features, Some(&cues), weights);
        let keyword = cues.keyword_scores();
        let spectral = spectral_heuristic(features.spectral_centroid_hz);

        let mut analysis = Analysis {
            features,
            clip,
            acoustic,
            keyword,
            spectral,
            semantic: EmotionScoreSet::new(),
            fused: EmotionScoreSet::new(),
            dominant: None,
            confidence: 0.0,
        };
        self.refuse(&mut analysis, semantic.clone());
        analysis
    }

    /// Replaces the semantic modality of `analysis` and recomputes the fused
    /// distribution.
    pub fn refuse(&self, analysis: &mut Analysis, semantic: EmotionScoreSet) {
        analysis.semantic = semantic;
        analysis.fused = self.fusion.fuse(
            &analysis.semantic,
            &analysis.acoustic.to_unit(),
            &analysis.spectral,
            &analysis.keyword,
        );
        let dominant = analysis.fused.dominant();
        analysis.dominant = dominant.map(|(e, _)| e);
        analysis.confidence = dominant.map_or(0.0, |(_, s)| s);
    }
}

fn sanitize(features: FeatureVector) -> FeatureVector {
    if features.is_finite() {
        return features;
    }
    tracing::warn!(target: LOG_TARGET, "non-finite features, using a silent vector");
    FeatureVector::silent()
}
