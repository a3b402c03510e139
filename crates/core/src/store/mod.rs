//! Persistence collaborators for trained state.
//!
//! Store failures never abort training: [`TrainingHandle`] logs them and keeps
//! the in-memory state authoritative for the session. Writes go out from a
//! snapshot taken under the manager lock, so readers are never stuck behind
//! store I/O.

mod file;
mod memory;

use crate::emotion::{Emotion, EmotionWeights};
use crate::features::FeatureVector;
use crate::training::{
    now_ms, Calibration, LabelStats, SessionStats, TrainingManager, TrainingSample,
    TrainingSnapshot,
};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

const LOG_TARGET: &str = "store";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid user id: {0:?}")]
    InvalidUser(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait TrainingStore: Send + Sync {
    /// Persists `sample` and returns its id.
    fn save_training_sample(
        &self,
        user_id: String,
        sample: TrainingSample,
    ) -> BoxFuture<'_, Result<String, StoreError>>;

    fn load_samples(&self, user_id: String) -> BoxFuture<'_, Result<Vec<TrainingSample>, StoreError>>;

    /// Replaces every stored sample of `user_id` with `samples`.
    fn replace_samples(
        &self,
        user_id: String,
        samples: Vec<TrainingSample>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn load_weights(&self, user_id: String)
        -> BoxFuture<'_, Result<Option<EmotionWeights>, StoreError>>;

    fn save_weights(
        &self,
        user_id: String,
        weights: EmotionWeights,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn load_calibration(
        &self,
        user_id: String,
    ) -> BoxFuture<'_, Result<Option<Calibration>, StoreError>>;

    fn save_calibration(
        &self,
        user_id: String,
        calibration: Calibration,
    ) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Weights and calibration as they were when a mutation finished.
struct PersistedState {
    weights: EmotionWeights,
    calibration: Calibration,
}

impl PersistedState {
    fn of(manager: &TrainingManager) -> Self {
        Self {
            weights: manager.current_weights().clone(),
            calibration: manager.calibration().clone(),
        }
    }
}

/// Shared, serialized access to one user's [`TrainingManager`].
#[derive(Clone)]
pub struct TrainingHandle {
    user_id: String,
    manager: Arc<Mutex<TrainingManager>>,
    store: Arc<dyn TrainingStore>,
    // Held across a mutation and its writes so the store sees them in order.
    persist: Arc<Mutex<()>>,
}

impl TrainingHandle {
    /// Seeds `manager` from the store. Anything that fails to load falls back
    /// to the manager's defaults.
    pub async fn load(
        user_id: impl Into<String>,
        mut manager: TrainingManager,
        store: Arc<dyn TrainingStore>,
    ) -> Self {
        let user_id = user_id.into();

        let weights = store
            .load_weights(user_id.clone())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(target: LOG_TARGET, user = %user_id, error = %e, "loading weights failed");
                None
            });
        let calibration = store
            .load_calibration(user_id.clone())
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(target: LOG_TARGET, user = %user_id, error = %e, "loading calibration failed");
                None
            });
        let samples = store.load_samples(user_id.clone()).await.unwrap_or_else(|e| {
            tracing::warn!(target: LOG_TARGET, user = %user_id, error = %e, "loading samples failed");
            Vec::new()
        });

        let current = manager.export();
        manager.import(TrainingSnapshot {
            samples,
            weights: weights.unwrap_or(current.weights),
            calibration: calibration.unwrap_or(current.calibration),
            exported_at_ms: now_ms(),
        });

        Self {
            user_id,
            manager: Arc::new(Mutex::new(manager)),
            store,
            persist: Arc::new(Mutex::new(())),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Records a labeled sample and persists the result. Concurrent calls
    /// are applied one at a time.
    pub async fn record_sample(
        &self,
        emotion: Emotion,
        features: FeatureVector,
        transcript: Option<String>,
        audio_ref: Option<String>,
    ) -> TrainingSample {
        let _writing = self.persist.lock().await;
        let (sample, state) = {
            let mut manager = self.manager.lock().await;
            let sample = manager.record_sample_with_audio(emotion, features, transcript, audio_ref);
            (sample, PersistedState::of(&manager))
        };

        if let Err(e) = self
            .store
            .save_training_sample(self.user_id.clone(), sample.clone())
            .await
        {
            tracing::warn!(target: LOG_TARGET, user = %self.user_id, error = %e, "saving sample failed");
        }
        self.write_state(state).await;
        sample
    }

    async fn write_samples(&self, samples: Vec<TrainingSample>) {
        if let Err(e) = self
            .store
            .replace_samples(self.user_id.clone(), samples)
            .await
        {
            tracing::warn!(target: LOG_TARGET, user = %self.user_id, error = %e, "replacing samples failed");
        }
    }

    async fn write_state(&self, state: PersistedState) {
        if let Err(e) = self
            .store
            .save_weights(self.user_id.clone(), state.weights)
            .await
        {
            tracing::warn!(target: LOG_TARGET, user = %self.user_id, error = %e, "saving weights failed");
        }
        if let Err(e) = self
            .store
            .save_calibration(self.user_id.clone(), state.calibration)
            .await
        {
            tracing::warn!(target: LOG_TARGET, user = %self.user_id, error = %e, "saving calibration failed");
        }
    }

    pub async fn weights(&self) -> EmotionWeights {
        self.manager.lock().await.current_weights().clone()
    }

    pub async fn accuracy(&self, emotion: Emotion) -> f32 {
        self.manager.lock().await.accuracy(emotion)
    }

    pub async fn stats(&self) -> BTreeMap<Emotion, LabelStats> {
        self.manager.lock().await.stats()
    }

    pub async fn session(&self) -> SessionStats {
        self.manager.lock().await.session()
    }

    pub async fn export(&self) -> TrainingSnapshot {
        self.manager.lock().await.export()
    }

    /// Clears in memory and rewrites the store to match: the remaining
    /// samples, plus the reset weights and calibration.
    pub async fn clear(&self, emotion: Option<Emotion>) {
        let _writing = self.persist.lock().await;
        let (samples, state) = {
            let mut manager = self.manager.lock().await;
            manager.clear(emotion);
            (manager.export().samples, PersistedState::of(&manager))
        };
        self.write_samples(samples).await;
        self.write_state(state).await;
    }

    /// Replaces all state with `snapshot`, in memory and in the store.
    pub async fn import(&self, snapshot: TrainingSnapshot) {
        let _writing = self.persist.lock().await;
        let (samples, state) = {
            let mut manager = self.manager.lock().await;
            manager.import(snapshot);
            (manager.export().samples, PersistedState::of(&manager))
        };
        self.write_samples(samples).await;
        self.write_state(state).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightBounds;
    use futures::FutureExt;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct BrokenStore;

    impl TrainingStore for BrokenStore {
        fn save_training_sample(
            &self,
            _user_id: String,
            _sample: TrainingSample,
        ) -> BoxFuture<'_, Result<String, StoreError>> {
            async { Err(StoreError::Unavailable("offline".into())) }.boxed()
        }

        fn load_samples(&self, _user_id: String) -> BoxFuture<'_, Result<Vec<TrainingSample>, StoreError>> {
            async { Err(StoreError::Unavailable("offline".into())) }.boxed()
        }

        fn replace_samples(
            &self,
            _user_id: String,
            _samples: Vec<TrainingSample>,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            async { Err(StoreError::Unavailable("offline".into())) }.boxed()
        }

        fn load_weights(
            &self,
            _user_id: String,
        ) -> BoxFuture<'_, Result<Option<EmotionWeights>, StoreError>> {
            async { Err(StoreError::Unavailable("offline".into())) }.boxed()
        }

        fn save_weights(
            &self,
            _user_id: String,
            _weights: EmotionWeights,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            async { Err(StoreError::Unavailable("offline".into())) }.boxed()
        }

        fn load_calibration(
            &self,
            _user_id: String,
        ) -> BoxFuture<'_, Result<Option<Calibration>, StoreError>> {
            async { Err(StoreError::Unavailable("offline".into())) }.boxed()
        }

        fn save_calibration(
            &self,
            _user_id: String,
            _calibration: Calibration,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            async { Err(StoreError::Unavailable("offline".into())) }.boxed()
        }
    }

    /// Parks every sample save until released.
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        entered: Notify,
        release: Notify,
    }

    impl TrainingStore for GatedStore {
        fn save_training_sample(
            &self,
            user_id: String,
            sample: TrainingSample,
        ) -> BoxFuture<'_, Result<String, StoreError>> {
            async move {
                self.entered.notify_one();
                self.release.notified().await;
                self.inner.save_training_sample(user_id, sample).await
            }
            .boxed()
        }

        fn load_samples(&self, user_id: String) -> BoxFuture<'_, Result<Vec<TrainingSample>, StoreError>> {
            self.inner.load_samples(user_id)
        }

        fn replace_samples(
            &self,
            user_id: String,
            samples: Vec<TrainingSample>,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            self.inner.replace_samples(user_id, samples)
        }

        fn load_weights(
            &self,
            user_id: String,
        ) -> BoxFuture<'_, Result<Option<EmotionWeights>, StoreError>> {
            self.inner.load_weights(user_id)
        }

        fn save_weights(
            &self,
            user_id: String,
            weights: EmotionWeights,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            self.inner.save_weights(user_id, weights)
        }

        fn load_calibration(
            &self,
            user_id: String,
        ) -> BoxFuture<'_, Result<Option<Calibration>, StoreError>> {
            self.inner.load_calibration(user_id)
        }

        fn save_calibration(
            &self,
            user_id: String,
            calibration: Calibration,
        ) -> BoxFuture<'_, Result<(), StoreError>> {
            self.inner.save_calibration(user_id, calibration)
        }
    }

    fn happy_voice() -> FeatureVector {
        FeatureVector {
            pitch_hz: 200.0,
            volume: 0.5,
            ..FeatureVector::silent()
        }
    }

    #[tokio::test]
    async fn store_failures_keep_in_memory_state() {
        let handle = TrainingHandle::load("u1", TrainingManager::default(), Arc::new(BrokenStore)).await;
        handle
            .record_sample(Emotion::Happy, happy_voice(), None, None)
            .await;
        assert_eq!(handle.stats().await[&Emotion::Happy].samples, 1);
        assert!(handle.weights().await.get(Emotion::Happy).pitch > 1.2);
    }

    #[tokio::test]
    async fn concurrent_records_are_serialized() {
        let store = Arc::new(MemoryStore::new());
        let handle = TrainingHandle::load("u1", TrainingManager::default(), store.clone()).await;

        let tasks: Vec<_> = (0..25)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    let emotion = if i % 2 == 0 { Emotion::Happy } else { Emotion::Calm };
                    handle.record_sample(emotion, happy_voice(), None, None).await
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("task");
        }

        assert_eq!(handle.session().await.total_samples, 25);
        assert!(handle.weights().await.within(&WeightBounds::default()));
        let stored = store.load_samples("u1".into()).await.expect("samples");
        assert_eq!(stored.len(), 25);
        let saved = store.load_weights("u1".into()).await.expect("weights");
        assert_eq!(saved, Some(handle.weights().await));
    }

    #[tokio::test]
    async fn reload_restores_previous_session() {
        let store: Arc<dyn TrainingStore> = Arc::new(MemoryStore::new());
        {
            let handle = TrainingHandle::load("u2", TrainingManager::default(), store.clone()).await;
            for _ in 0..3 {
                handle
                    .record_sample(Emotion::Happy, happy_voice(), None, None)
                    .await;
            }
        }
        let handle = TrainingHandle::load("u2", TrainingManager::default(), store).await;
        assert_eq!(handle.stats().await[&Emotion::Happy].samples, 3);
        assert!((handle.weights().await.get(Emotion::Happy).pitch - 1.5).abs() < 1e-5);
    }

    #[tokio::test]
    async fn clear_persists_defaults() {
        let store = Arc::new(MemoryStore::new());
        let handle = TrainingHandle::load("u3", TrainingManager::default(), store.clone()).await;
        handle
            .record_sample(Emotion::Happy, happy_voice(), None, None)
            .await;
        handle.clear(None).await;
        let saved = store.load_weights("u3".into()).await.expect("weights");
        assert_eq!(saved, Some(EmotionWeights::default()));
    }

    #[tokio::test]
    async fn clear_survives_reload() {
        let store: Arc<dyn TrainingStore> = Arc::new(MemoryStore::new());
        let handle = TrainingHandle::load("u4", TrainingManager::default(), store.clone()).await;
        for _ in 0..3 {
            handle
                .record_sample(Emotion::Happy, happy_voice(), None, None)
                .await;
        }
        handle
            .record_sample(Emotion::Sad, FeatureVector::silent(), None, None)
            .await;

        handle.clear(Some(Emotion::Happy)).await;
        let reloaded = TrainingHandle::load("u4", TrainingManager::default(), store.clone()).await;
        let stats = reloaded.stats().await;
        assert_eq!(stats[&Emotion::Happy].samples, 0);
        assert_eq!(stats[&Emotion::Sad].samples, 1);

        handle.clear(None).await;
        let reloaded = TrainingHandle::load("u4", TrainingManager::default(), store).await;
        assert_eq!(reloaded.session().await.total_samples, 0);
        assert_eq!(reloaded.accuracy(Emotion::Happy).await, 0.0);
        assert_eq!(reloaded.weights().await, EmotionWeights::default());
    }

    #[tokio::test]
    async fn import_survives_reload() {
        let mut source = TrainingManager::default();
        for _ in 0..2 {
            source.record_sample(Emotion::Calm, FeatureVector::silent(), None);
        }
        let snapshot = source.export();

        let store: Arc<dyn TrainingStore> = Arc::new(MemoryStore::new());
        let handle = TrainingHandle::load("u5", TrainingManager::default(), store.clone()).await;
        handle
            .record_sample(Emotion::Happy, happy_voice(), None, None)
            .await;
        handle.import(snapshot.clone()).await;

        let stored = store.load_samples("u5".into()).await.expect("samples");
        assert_eq!(stored, snapshot.samples);
        let reloaded = TrainingHandle::load("u5", TrainingManager::default(), store).await;
        assert_eq!(reloaded.session().await.total_samples, 2);
        assert_eq!(reloaded.weights().await, snapshot.weights);
    }

    #[tokio::test]
    async fn reads_are_not_blocked_by_slow_saves() {
        let store = Arc::new(GatedStore::default());
        let handle = TrainingHandle::load("u6", TrainingManager::default(), store.clone()).await;

        let writer = {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle
                    .record_sample(Emotion::Happy, happy_voice(), None, None)
                    .await
            })
        };
        store.entered.notified().await;

        let weights = tokio::time::timeout(Duration::from_secs(1), handle.weights())
            .await
            .expect("weights readable while the save is parked");
        assert!(weights.get(Emotion::Happy).pitch > 1.2);

        store.release.notify_one();
        writer.await.expect("writer");
        let saved = store.load_weights("u6".into()).await.expect("weights");
        assert_eq!(saved, Some(handle.weights().await));
    }
}
