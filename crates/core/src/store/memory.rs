use super::{StoreError, TrainingStore};
use crate::emotion::EmotionWeights;
use crate::training::{Calibration, TrainingSample};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Clone, Debug, Default)]
struct UserRecord {
    samples: Vec<TrainingSample>,
    weights: Option<EmotionWeights>,
    calibration: Option<Calibration>,
}

/// Keeps everything in process memory; lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrainingStore for MemoryStore {
    fn save_training_sample(
        &self,
        user_id: String,
        sample: TrainingSample,
    ) -> BoxFuture<'_, Result<String, StoreError>> {
        async move {
            let id = sample.id.clone();
            self.users
                .lock()
                .await
                .entry(user_id)
                .or_default()
                .samples
                .push(sample);
            Ok(id)
        }
        .boxed()
    }

    fn load_samples(&self, user_id: String) -> BoxFuture<'_, Result<Vec<TrainingSample>, StoreError>> {
        async move {
            Ok(self
                .users
                .lock()
                .await
                .get(&user_id)
                .map(|r| r.samples.clone())
                .unwrap_or_default())
        }
        .boxed()
    }

    fn replace_samples(
        &self,
        user_id: String,
        samples: Vec<TrainingSample>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            self.users.lock().await.entry(user_id).or_default().samples = samples;
            Ok(())
        }
        .boxed()
    }

    fn load_weights(
        &self,
        user_id: String,
    ) -> BoxFuture<'_, Result<Option<EmotionWeights>, StoreError>> {
        async move {
            Ok(self
                .users
                .lock()
                .await
                .get(&user_id)
                .and_then(|r| r.weights.clone()))
        }
        .boxed()
    }

    fn save_weights(
        &self,
        user_id: String,
        weights: EmotionWeights,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            self.users.lock().await.entry(user_id).or_default().weights = Some(weights);
            Ok(())
        }
        .boxed()
    }

    fn load_calibration(
        &self,
        user_id: String,
    ) -> BoxFuture<'_, Result<Option<Calibration>, StoreError>> {
        async move {
            Ok(self
                .users
                .lock()
                .await
                .get(&user_id)
                .and_then(|r| r.calibration.clone()))
        }
        .boxed()
    }

    fn save_calibration(
        &self,
        user_id: String,
        calibration: Calibration,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            self.users.lock().await.entry(user_id).or_default().calibration = Some(calibration);
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Emotion;
    use crate::features::FeatureVector;
    use crate::training::TrainingManager;

    #[tokio::test]
    async fn users_are_isolated() {
        let store = MemoryStore::new();
        store
            .save_weights("a".into(), EmotionWeights::default())
            .await
            .expect("save");
        assert!(store.load_weights("a".into()).await.expect("load").is_some());
        assert!(store.load_weights("b".into()).await.expect("load").is_none());
        assert!(store.load_samples("b".into()).await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn replace_drops_earlier_samples() {
        let store = MemoryStore::new();
        let mut manager = TrainingManager::default();
        let old = manager.record_sample(Emotion::Sad, FeatureVector::silent(), None);
        let new = manager.record_sample(Emotion::Calm, FeatureVector::silent(), None);
        store.save_training_sample("a".into(), old).await.expect("save");

        store
            .replace_samples("a".into(), vec![new.clone()])
            .await
            .expect("replace");
        assert_eq!(store.load_samples("a".into()).await.expect("load"), vec![new]);
    }
}
