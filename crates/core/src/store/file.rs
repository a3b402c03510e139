use super::{StoreError, TrainingStore, LOG_TARGET};
use crate::emotion::EmotionWeights;
use crate::training::{Calibration, TrainingSample};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const WEIGHTS_FILE: &str = "weights.json";
const CALIBRATION_FILE: &str = "calibration.json";
const SAMPLES_FILE: &str = "samples.jsonl";

/// One directory per user under `root`: JSON documents for weights and
/// calibration, samples appended as JSON lines.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidUser(user_id.to_owned()));
        }
        Ok(self.root.join(user_id))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes through a temporary file so readers never see a partial document.
    async fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(dir).await?;
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, dir.join(name)).await?;
        Ok(())
    }
}

impl TrainingStore for JsonFileStore {
    fn save_training_sample(
        &self,
        user_id: String,
        sample: TrainingSample,
    ) -> BoxFuture<'_, Result<String, StoreError>> {
        async move {
            let dir = self.user_dir(&user_id)?;
            tokio::fs::create_dir_all(&dir).await?;
            let mut line = serde_json::to_vec(&sample)?;
            line.push(b'\n');
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(SAMPLES_FILE))
                .await?;
            file.write_all(&line).await?;
            file.flush().await?;
            Ok(sample.id)
        }
        .boxed()
    }

    fn load_samples(&self, user_id: String) -> BoxFuture<'_, Result<Vec<TrainingSample>, StoreError>> {
        async move {
            let path = self.user_dir(&user_id)?.join(SAMPLES_FILE);
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };
            let mut samples = Vec::new();
            for (line_no, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(line) {
                    Ok(sample) => samples.push(sample),
                    Err(e) => {
                        tracing::warn!(
                            target: LOG_TARGET,
                            path = %path.display(),
                            line = line_no + 1,
                            error = %e,
                            "skipping unreadable sample"
                        );
                    }
                }
            }
            Ok(samples)
        }
        .boxed()
    }

    fn replace_samples(
        &self,
        user_id: String,
        samples: Vec<TrainingSample>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            let dir = self.user_dir(&user_id)?;
            tokio::fs::create_dir_all(&dir).await?;
            let mut bytes = Vec::new();
            for sample in &samples {
                serde_json::to_writer(&mut bytes, sample)?;
                bytes.push(b'\n');
            }
            let tmp = dir.join(format!("{SAMPLES_FILE}.tmp"));
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, dir.join(SAMPLES_FILE)).await?;
            Ok(())
        }
        .boxed()
    }

    fn load_weights(
        &self,
        user_id: String,
    ) -> BoxFuture<'_, Result<Option<EmotionWeights>, StoreError>> {
        async move { Self::read_json(&self.user_dir(&user_id)?.join(WEIGHTS_FILE)).await }.boxed()
    }

    fn save_weights(
        &self,
        user_id: String,
        weights: EmotionWeights,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { Self::write_json(&self.user_dir(&user_id)?, WEIGHTS_FILE, &weights).await }
            .boxed()
    }

    fn load_calibration(
        &self,
        user_id: String,
    ) -> BoxFuture<'_, Result<Option<Calibration>, StoreError>> {
        async move { Self::read_json(&self.user_dir(&user_id)?.join(CALIBRATION_FILE)).await }
            .boxed()
    }

    fn save_calibration(
        &self,
        user_id: String,
        calibration: Calibration,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            Self::write_json(&self.user_dir(&user_id)?, CALIBRATION_FILE, &calibration).await
        }
        .boxed()
    }
}
