use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use url::Url;

pub const DEFAULT_MIN_PITCH_HZ: f32 = 80.0;
pub const DEFAULT_MAX_PITCH_HZ: f32 = 1000.0;
pub const DEFAULT_FRAME_SIZE: usize = 2048;
pub const MAX_FRAME_SIZE: usize = 8192;
pub const DEFAULT_ROLLOFF_FRACTION: f32 = 0.85;
pub const DEFAULT_WEIGHT_MIN: f32 = 0.1;
pub const DEFAULT_WEIGHT_MAX: f32 = 2.0;
pub const DEFAULT_CALIBRATION_ALPHA: f32 = 0.1;
pub const DEFAULT_REINFORCE_STEP: f32 = 0.1;
pub const DEFAULT_DECAY_STEP: f32 = 0.05;
pub const DEFAULT_SEMANTIC_DEBOUNCE_MS: u64 = 1000;
pub const DEFAULT_SEMANTIC_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_LOCALE: &str = "en-US";
pub const DEFAULT_USER_ID: &str = "default";
pub const ENV_SEMANTIC_URL: &str = "VOICE_AFFECT_SEMANTIC_URL";
pub const ENV_SEMANTIC_API_KEY: &str = "VOICE_AFFECT_SEMANTIC_API_KEY";
pub const ENV_STORE_DIR: &str = "VOICE_AFFECT_STORE_DIR";

const FUSION_WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

/// Frequency band searched by the pitch estimator.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawPitchBand")]
pub struct PitchBand {
    min_hz: f32,
    max_hz: f32,
}

#[derive(Deserialize)]
struct RawPitchBand {
    min_hz: f32,
    max_hz: f32,
}

impl TryFrom<RawPitchBand> for PitchBand {
    type Error = ConfigError;

    fn try_from(raw: RawPitchBand) -> Result<Self, Self::Error> {
        Self::new(raw.min_hz, raw.max_hz)
    }
}

impl PitchBand {
    pub fn new(min_hz: f32, max_hz: f32) -> Result<Self, ConfigError> {
        if !min_hz.is_finite() || !max_hz.is_finite() || min_hz <= 0.0 || min_hz >= max_hz {
            return Err(ConfigError::InvalidPitchBand { min_hz, max_hz });
        }
        Ok(Self { min_hz, max_hz })
    }

    pub fn min_hz(&self) -> f32 {
        self.min_hz
    }

    pub fn max_hz(&self) -> f32 {
        self.max_hz
    }

    pub fn contains(&self, hz: f32) -> bool {
        hz >= self.min_hz && hz <= self.max_hz
    }

    /// Autocorrelation lag bounds `(sample_rate / max, sample_rate / min)`.
    pub fn lag_bounds(&self, sample_rate_hz: u32) -> (usize, usize) {
        let sr = sample_rate_hz as f32;
        let min_lag = (sr / self.max_hz).floor() as usize;
        let max_lag = (sr / self.min_hz).floor() as usize;
        (min_lag.max(1), max_lag)
    }
}

impl Default for PitchBand {
    fn default() -> Self {
        Self {
            min_hz: DEFAULT_MIN_PITCH_HZ,
            max_hz: DEFAULT_MAX_PITCH_HZ,
        }
    }
}

/// Upper bound on the samples fed to autocorrelation per tick.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "usize", into = "usize")]
pub struct FrameSize(usize);

impl FrameSize {
    pub fn new(samples: usize) -> Result<Self, ConfigError> {
        if samples < 64 || samples > MAX_FRAME_SIZE {
            return Err(ConfigError::InvalidFrameSize(samples));
        }
        Ok(Self(samples))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl TryFrom<usize> for FrameSize {
    type Error = ConfigError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FrameSize> for usize {
    fn from(value: FrameSize) -> Self {
        value.0
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self(DEFAULT_FRAME_SIZE)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "f32", into = "f32")]
pub struct RolloffFraction(f32);

impl RolloffFraction {
    pub fn new(fraction: f32) -> Result<Self, ConfigError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::InvalidRolloff(fraction));
        }
        Ok(Self(fraction))
    }

    pub fn get(&self) -> f32 {
        self.0
    }
}

impl TryFrom<f32> for RolloffFraction {
    type Error = ConfigError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RolloffFraction> for f32 {
    fn from(value: RolloffFraction) -> Self {
        value.0
    }
}

impl Default for RolloffFraction {
    fn default() -> Self {
        Self(DEFAULT_ROLLOFF_FRACTION)
    }
}

/// Linear fusion weights per modality. Must sum to 1.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawFusionWeights")]
pub struct FusionWeights {
    pub semantic: f32,
    pub acoustic: f32,
    pub spectral: f32,
    pub keyword: f32,
}

#[derive(Deserialize)]
struct RawFusionWeights {
    semantic: f32,
    acoustic: f32,
    spectral: f32,
    keyword: f32,
}

impl TryFrom<RawFusionWeights> for FusionWeights {
    type Error = ConfigError;

    fn try_from(raw: RawFusionWeights) -> Result<Self, Self::Error> {
        Self::new(raw.semantic, raw.acoustic, raw.spectral, raw.keyword)
    }
}

impl FusionWeights {
    pub fn new(semantic: f32, acoustic: f32, spectral: f32, keyword: f32) -> Result<Self, ConfigError> {
        let all = [semantic, acoustic, spectral, keyword];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::NegativeFusionWeight);
        }
        let sum: f32 = all.iter().sum();
        if (sum - 1.0).abs() > FUSION_WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::FusionWeightSum(sum));
        }
        Ok(Self {
            semantic,
            acoustic,
            spectral,
            keyword,
        })
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.45,
            acoustic: 0.25,
            spectral: 0.15,
            keyword: 0.15,
        }
    }
}

/// Inclusive bounds every trained multiplier is clamped into.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawWeightBounds")]
pub struct WeightBounds {
    min: f32,
    max: f32,
}

#[derive(Deserialize)]
struct RawWeightBounds {
    min: f32,
    max: f32,
}

impl TryFrom<RawWeightBounds> for WeightBounds {
    type Error = ConfigError;

    fn try_from(raw: RawWeightBounds) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max)
    }
}

impl WeightBounds {
    pub fn new(min: f32, max: f32) -> Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() || min <= 0.0 || min >= max {
            return Err(ConfigError::InvalidWeightBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_WEIGHT_MIN,
            max: DEFAULT_WEIGHT_MAX,
        }
    }
}

/// Step sizes for the online weight update and the calibration moving average.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawLearningRates")]
pub struct LearningRates {
    pub reinforce_step: f32,
    pub decay_step: f32,
    pub calibration_alpha: f32,
}

#[derive(Deserialize)]
struct RawLearningRates {
    reinforce_step: f32,
    decay_step: f32,
    calibration_alpha: f32,
}

impl TryFrom<RawLearningRates> for LearningRates {
    type Error = ConfigError;

    fn try_from(raw: RawLearningRates) -> Result<Self, Self::Error> {
        Self::new(raw.reinforce_step, raw.decay_step, raw.calibration_alpha)
    }
}

impl LearningRates {
    pub fn new(reinforce_step: f32, decay_step: f32, calibration_alpha: f32) -> Result<Self, ConfigError> {
        if !(reinforce_step >= 0.0 && reinforce_step.is_finite())
            || !(decay_step >= 0.0 && decay_step.is_finite())
        {
            return Err(ConfigError::InvalidLearningStep);
        }
        if !(calibration_alpha > 0.0 && calibration_alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(calibration_alpha));
        }
        Ok(Self {
            reinforce_step,
            decay_step,
            calibration_alpha,
        })
    }
}

impl Default for LearningRates {
    fn default() -> Self {
        Self {
            reinforce_step: DEFAULT_REINFORCE_STEP,
            decay_step: DEFAULT_DECAY_STEP,
            calibration_alpha: DEFAULT_CALIBRATION_ALPHA,
        }
    }
}

/// Thresholds for suppressing acoustic-only anger.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawAngerOverride")]
pub struct AngerOverride {
    pub acoustic_above: f32,
    pub keyword_above: f32,
    pub spectral_above: f32,
    pub multiplier: f32,
    pub cap: f32,
}

#[derive(Deserialize)]
struct RawAngerOverride {
    acoustic_above: f32,
    keyword_above: f32,
    spectral_above: f32,
    multiplier: f32,
    cap: f32,
}

impl TryFrom<RawAngerOverride> for AngerOverride {
    type Error = ConfigError;

    fn try_from(raw: RawAngerOverride) -> Result<Self, Self::Error> {
        Self::new(
            raw.acoustic_above,
            raw.keyword_above,
            raw.spectral_above,
            raw.multiplier,
            raw.cap,
        )
    }
}

impl AngerOverride {
    pub fn new(
        acoustic_above: f32,
        keyword_above: f32,
        spectral_above: f32,
        multiplier: f32,
        cap: f32,
    ) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("acoustic_above", acoustic_above),
            ("keyword_above", keyword_above),
            ("spectral_above", spectral_above),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidAngerOverride(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if !(multiplier >= 0.0 && multiplier.is_finite()) {
            return Err(ConfigError::InvalidAngerOverride(format!(
                "multiplier must be finite and non-negative, got {multiplier}"
            )));
        }
        if !cap.is_finite() {
            return Err(ConfigError::InvalidAngerOverride(format!(
                "cap must be finite, got {cap}"
            )));
        }
        Ok(Self {
            acoustic_above,
            keyword_above,
            spectral_above,
            multiplier,
            cap,
        })
    }
}

impl Default for AngerOverride {
    fn default() -> Self {
        Self {
            acoustic_above: 0.7,
            keyword_above: 0.4,
            spectral_above: 0.6,
            multiplier: 0.35,
            cap: 0.4,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SemanticConfig {
    pub endpoint: Option<Url>,
    pub api_key: Option<ApiKey>,
    pub locale: String,
    pub debounce_ms: u64,
    pub timeout_ms: u64,
}

impl SemanticConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            locale: DEFAULT_LOCALE.to_owned(),
            debounce_ms: DEFAULT_SEMANTIC_DEBOUNCE_MS,
            timeout_ms: DEFAULT_SEMANTIC_TIMEOUT_MS,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub pitch_band: PitchBand,
    pub frame_size: FrameSize,
    pub rolloff: RolloffFraction,
    pub fusion: FusionWeights,
    pub weight_bounds: WeightBounds,
    pub learning: LearningRates,
    pub anger_override: AngerOverride,
    pub semantic: SemanticConfig,
}

impl AnalysisConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("pitch band must satisfy 0 < min < max, got {min_hz}..{max_hz} Hz")]
    InvalidPitchBand { min_hz: f32, max_hz: f32 },
    #[error("frame size must be within 64..=8192 samples, got {0}")]
    InvalidFrameSize(usize),
    #[error("rolloff fraction must be in (0, 1], got {0}")]
    InvalidRolloff(f32),
    #[error("fusion weights must be finite and non-negative")]
    NegativeFusionWeight,
    #[error("fusion weights must sum to 1.0, got {0}")]
    FusionWeightSum(f32),
    #[error("weight bounds must satisfy 0 < min < max, got [{min}, {max}]")]
    InvalidWeightBounds { min: f32, max: f32 },
    #[error("learning steps must be finite and non-negative")]
    InvalidLearningStep,
    #[error("calibration alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f32),
    #[error("invalid anger override: {0}")]
    InvalidAngerOverride(String),
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("invalid semantic endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("config parse error: {0}")]
    Parse(String),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_endpoint(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<Url>, ConfigError> {
    match resolve_optional_string(cli_value, env_key, env) {
        Some(raw) => Url::parse(&raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{raw}: {e}"))),
        None => Ok(None),
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_SEMANTIC_API_KEY, "env-key");
        let key = resolve_api_key(Some("cli-key".to_owned()), ENV_SEMANTIC_API_KEY, &env)
            .expect("valid key")
            .expect("present");
        assert_eq!(key.expose(), "cli-key");
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("secret").expect("valid key");
        assert!(!format!("{key:?}").contains("secret"));
    }

    #[test]
    fn endpoint_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_SEMANTIC_URL, "https://example.test/classify");
        let url = resolve_endpoint(None, ENV_SEMANTIC_URL, &env)
            .expect("valid url")
            .expect("present");
        assert_eq!(url.host_str(), Some("example.test"));
    }

    #[test]
    fn endpoint_rejects_garbage() {
        let env = MapEnv::default();
        let err = resolve_endpoint(Some("not a url".to_owned()), ENV_SEMANTIC_URL, &env)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint(_)));
    }

    #[test]
    fn resolve_string_with_default_default_used_when_both_missing() {
        let env = MapEnv::default();
        let v = resolve_string_with_default(None, ENV_STORE_DIR, &env, "def");
        assert_eq!(v, "def");
    }

    #[test]
    fn rolloff_outside_unit_interval_fails_fast() {
        assert!(RolloffFraction::new(0.0).is_err());
        assert!(RolloffFraction::new(1.2).is_err());
        assert!(RolloffFraction::new(f32::NAN).is_err());
        assert!(RolloffFraction::new(1.0).is_ok());
    }

    #[test]
    fn fusion_weights_must_sum_to_one() {
        assert!(FusionWeights::new(0.5, 0.25, 0.15, 0.15).is_err());
        assert!(FusionWeights::new(0.45, 0.25, 0.15, 0.15).is_ok());
        assert_eq!(
            FusionWeights::new(-0.1, 0.6, 0.25, 0.25).unwrap_err(),
            ConfigError::NegativeFusionWeight
        );
    }

    #[test]
    fn pitch_band_lag_bounds_follow_sample_rate() {
        let band = PitchBand::default();
        assert_eq!(band.lag_bounds(44_100), (44, 551));
        assert!(PitchBand::new(500.0, 100.0).is_err());
    }

    #[test]
    fn weight_bounds_clamp() {
        let b = WeightBounds::default();
        assert_eq!(b.clamp(5.0), 2.0);
        assert_eq!(b.clamp(-1.0), 0.1);
        assert_eq!(b.clamp(f32::NAN), 0.1);
    }

    #[test]
    fn config_json_rejects_invalid_rolloff() {
        let err = AnalysisConfig::from_json(r#"{"rolloff": 1.5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let cfg = AnalysisConfig::from_json(r#"{"rolloff": 0.9}"#).expect("valid config");
        assert_eq!(cfg.rolloff.get(), 0.9);
        assert_eq!(cfg.fusion, FusionWeights::default());
    }

    #[test]
    fn anger_override_is_validated() {
        assert!(AngerOverride::new(0.7, 0.4, 0.6, 0.35, 0.4).is_ok());
        assert!(matches!(
            AngerOverride::new(1.2, 0.4, 0.6, 0.35, 0.4),
            Err(ConfigError::InvalidAngerOverride(_))
        ));
        assert!(AngerOverride::new(0.7, f32::NAN, 0.6, 0.35, 0.4).is_err());
        assert!(AngerOverride::new(0.7, 0.4, -0.1, 0.35, 0.4).is_err());
        assert!(AngerOverride::new(0.7, 0.4, 0.6, -1.0, 0.4).is_err());
        assert!(AngerOverride::new(0.7, 0.4, 0.6, f32::INFINITY, 0.4).is_err());
        assert!(AngerOverride::new(0.7, 0.4, 0.6, 0.35, f32::NAN).is_err());
    }

    #[test]
    fn config_json_rejects_invalid_anger_override() {
        let raw = r#"{"anger_override": {"acoustic_above": 2.0, "keyword_above": 0.4,
            "spectral_above": 0.6, "multiplier": 0.35, "cap": 0.4}}"#;
        let err = AnalysisConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let raw = r#"{"anger_override": {"acoustic_above": 0.8, "keyword_above": 0.4,
            "spectral_above": 0.6, "multiplier": 0.5, "cap": 0.3}}"#;
        let cfg = AnalysisConfig::from_json(raw).expect("valid config");
        assert_eq!(cfg.anger_override.acoustic_above, 0.8);
        assert_eq!(cfg.anger_override.cap, 0.3);
    }
}
