use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::Utc;

use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::embedding_store::EmbeddingStore;
use crate::gallery::domain::identity_key::IdentityKey;
use crate::shared::constants::{MIN_EMBEDDINGS_FOR_TRAINING, MIN_IDENTITIES_FOR_TRAINING};
use crate::training::domain::bundle_repository::BundleRepository;
use crate::training::domain::model_bundle::ModelBundle;
use crate::training::domain::training_status::{
    TrainingOutcome, TrainingState, TrainingStatusReport,
};

pub const SKIP_REASON: &str = "need >=2 identities with >=5 embeddings each";

/// Owns the training state machine and the current model bundle.
///
/// Recognition reads the bundle through [`current_bundle`](Self::current_bundle)
/// without locking; a successful run persists the new bundle first and then
/// swaps the pointer.
pub struct TrainingCoordinator {
    store: Arc<dyn EmbeddingStore>,
    repository: Box<dyn BundleRepository>,
    bundle: ArcSwapOption<ModelBundle>,
    state: TrainingState,
}

impl TrainingCoordinator {
    /// Starts from the persisted bundle, if one can be loaded.
    pub fn new(store: Arc<dyn EmbeddingStore>, repository: Box<dyn BundleRepository>) -> Self {
        let initial = match repository.load_current() {
            Ok(Some(bundle)) => {
                log::info!("Loaded model bundle {}", bundle.version);
                Some(Arc::new(bundle))
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Ignoring unreadable model bundle: {e}");
                None
            }
        };

        Self {
            store,
            repository,
            bundle: ArcSwapOption::new(initial),
            state: TrainingState::new(),
        }
    }

    pub fn current_bundle(&self) -> Option<Arc<ModelBundle>> {
        self.bundle.load_full()
    }

    pub fn status(&self) -> TrainingStatusReport {
        let artifacts_exist = self.bundle.load().is_some() || self.repository.exists();
        self.state.report(artifacts_exist)
    }

    /// Runs one training pass unless another is already in flight.
    pub fn train_if_needed(&self) -> TrainingOutcome {
        let Some(run) = self.state.try_begin() else {
            log::debug!("Training already running; trigger ignored");
            return TrainingOutcome::AlreadyRunning;
        };

        let training_set = match self.eligible_identities() {
            Ok(set) => set,
            Err(e) => {
                let error = format!("failed to read embeddings: {e}");
                log::error!("Training failed: {error}");
                run.finish_error(&error);
                return TrainingOutcome::Failed { error };
            }
        };

        if training_set.len() < MIN_IDENTITIES_FOR_TRAINING {
            log::info!(
                "Training skipped: {} eligible identities",
                training_set.len()
            );
            run.finish_skipped(SKIP_REASON);
            return TrainingOutcome::Skipped {
                reason: SKIP_REASON.to_string(),
            };
        }

        match self.fit_and_publish(&training_set) {
            Ok(bundle) => {
                let samples = training_set.iter().map(|(_, e)| e.len()).sum::<usize>();
                log::info!(
                    "Trained bundle {} on {} identities ({samples} embeddings)",
                    bundle.version,
                    training_set.len()
                );
                run.finish_ok(bundle.trained_at);
                TrainingOutcome::Trained {
                    version: bundle.version.clone(),
                    identities: training_set.len(),
                    samples,
                }
            }
            Err(e) => {
                let error = e.to_string();
                log::error!("Training failed: {error}");
                run.finish_error(&error);
                TrainingOutcome::Failed { error }
            }
        }
    }

    /// Identities with enough embeddings, sorted by key.
    fn eligible_identities(
        &self,
    ) -> Result<Vec<(IdentityKey, Vec<Embedding>)>, Box<dyn std::error::Error>> {
        let mut set = Vec::new();
        for identity in self.store.identities()? {
            let embeddings = self.store.load(&identity)?;
            if embeddings.len() >= MIN_EMBEDDINGS_FOR_TRAINING {
                set.push((identity, embeddings));
            }
        }
        Ok(set)
    }

    fn fit_and_publish(
        &self,
        training_set: &[(IdentityKey, Vec<Embedding>)],
    ) -> Result<Arc<ModelBundle>, Box<dyn std::error::Error>> {
        let bundle = Arc::new(ModelBundle::train(training_set, Utc::now())?);
        self.repository.save(&bundle)?;
        self.bundle.store(Some(bundle.clone()));
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::infrastructure::json_embedding_store::JsonEmbeddingStore;
    use crate::training::domain::training_status::LastStatus;
    use crate::training::infrastructure::json_bundle_repository::JsonBundleRepository;
    use std::sync::Mutex;

    fn key(s: &str) -> IdentityKey {
        IdentityKey::parse(s).unwrap()
    }

    fn samples(axis: usize, n: usize) -> Vec<Embedding> {
        (0..n)
            .map(|i| {
                let mut v = vec![0.0f32; 4];
                v[axis] = 1.0;
                v[3] = i as f32 * 0.01;
                Embedding::new(v)
            })
            .collect()
    }

    fn coordinator(dir: &std::path::Path) -> (TrainingCoordinator, Arc<JsonEmbeddingStore>) {
        let store = Arc::new(JsonEmbeddingStore::new(dir.join("identities")));
        let coordinator = TrainingCoordinator::new(
            store.clone(),
            Box::new(JsonBundleRepository::new(dir.join("models"))),
        );
        (coordinator, store)
    }

    #[test]
    fn test_skipped_with_one_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, store) = coordinator(dir.path());
        store.append(&key("alice"), samples(0, 6)).unwrap();

        let outcome = coordinator.train_if_needed();
        assert_eq!(
            outcome,
            TrainingOutcome::Skipped {
                reason: SKIP_REASON.to_string()
            }
        );
        let status = coordinator.status();
        assert_eq!(status.last_status, LastStatus::Skipped);
        assert_eq!(status.last_error.as_deref(), Some(SKIP_REASON));
        assert!(!status.artifacts_exist);
        assert!(coordinator.current_bundle().is_none());
    }

    #[test]
    fn test_identity_below_minimum_is_not_eligible() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, store) = coordinator(dir.path());
        store.append(&key("alice"), samples(0, 6)).unwrap();
        store.append(&key("bob"), samples(1, 4)).unwrap();

        assert!(matches!(
            coordinator.train_if_needed(),
            TrainingOutcome::Skipped { .. }
        ));
    }

    #[test]
    fn test_trains_with_two_eligible_identities() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, store) = coordinator(dir.path());
        store.append(&key("alice"), samples(0, 6)).unwrap();
        store.append(&key("bob"), samples(1, 5)).unwrap();
        store.append(&key("carol"), samples(2, 2)).unwrap();

        let outcome = coordinator.train_if_needed();
        let TrainingOutcome::Trained {
            identities,
            samples: sample_count,
            ..
        } = &outcome
        else {
            panic!("expected a trained outcome, got {outcome:?}");
        };
        assert_eq!((*identities, *sample_count), (2, 11));

        let status = coordinator.status();
        assert_eq!(status.last_status, LastStatus::Ok);
        assert!(status.artifacts_exist);
        assert!(status.last_trained_at.is_some());

        let bundle = coordinator.current_bundle().unwrap();
        assert_eq!(bundle.labels, vec![key("alice"), key("bob")]);
    }

    #[test]
    fn test_restart_loads_persisted_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let version = {
            let (coordinator, store) = coordinator(dir.path());
            store.append(&key("alice"), samples(0, 5)).unwrap();
            store.append(&key("bob"), samples(1, 5)).unwrap();
            coordinator.train_if_needed();
            coordinator.current_bundle().unwrap().version.clone()
        };

        let (restarted, _) = coordinator(dir.path());
        assert_eq!(restarted.current_bundle().unwrap().version, version);
        assert_eq!(restarted.status().last_status, LastStatus::Never);
        assert!(restarted.status().artifacts_exist);
    }

    #[test]
    fn test_corrupt_bundle_is_ignored_and_replaced_by_retraining() {
        let dir = tempfile::tempdir().unwrap();
        let version = {
            let (coordinator, store) = coordinator(dir.path());
            store.append(&key("alice"), samples(0, 5)).unwrap();
            store.append(&key("bob"), samples(1, 5)).unwrap();
            coordinator.train_if_needed();
            coordinator.current_bundle().unwrap().version.clone()
        };
        let path = dir
            .path()
            .join("models")
            .join("bundles")
            .join(format!("{version}.json"));
        let mut json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        json["labels"].as_array_mut().unwrap().truncate(1);
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let (restarted, _) = coordinator(dir.path());
        assert!(restarted.current_bundle().is_none());
        assert!(matches!(
            restarted.train_if_needed(),
            TrainingOutcome::Trained { .. }
        ));
        assert_eq!(restarted.current_bundle().unwrap().labels.len(), 2);
    }

    struct FailingRepository;

    impl BundleRepository for FailingRepository {
        fn load_current(&self) -> Result<Option<ModelBundle>, Box<dyn std::error::Error>> {
            Ok(None)
        }
        fn save(&self, _bundle: &ModelBundle) -> Result<(), Box<dyn std::error::Error>> {
            Err("disk full".into())
        }
        fn exists(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_persist_failure_keeps_no_bundle_and_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonEmbeddingStore::new(dir.path()));
        store.append(&key("alice"), samples(0, 5)).unwrap();
        store.append(&key("bob"), samples(1, 5)).unwrap();
        let coordinator = TrainingCoordinator::new(store, Box::new(FailingRepository));

        let outcome = coordinator.train_if_needed();
        assert_eq!(
            outcome,
            TrainingOutcome::Failed {
                error: "disk full".into()
            }
        );
        assert!(coordinator.current_bundle().is_none());
        let status = coordinator.status();
        assert_eq!(status.last_status, LastStatus::Error);
        assert!(!status.is_training);
    }

    /// Store whose listing blocks until released, to hold a run open.
    struct GatedStore {
        inner: JsonEmbeddingStore,
        entered: crossbeam_channel::Sender<()>,
        release: Mutex<crossbeam_channel::Receiver<()>>,
    }

    impl EmbeddingStore for GatedStore {
        fn load(&self, identity: &IdentityKey) -> Result<Vec<Embedding>, Box<dyn std::error::Error>> {
            self.inner.load(identity)
        }
        fn append(
            &self,
            identity: &IdentityKey,
            embeddings: Vec<Embedding>,
        ) -> Result<usize, Box<dyn std::error::Error>> {
            self.inner.append(identity, embeddings)
        }
        fn identities(&self) -> Result<Vec<IdentityKey>, Box<dyn std::error::Error>> {
            self.entered.send(())?;
            self.release.lock().unwrap().recv()?;
            self.inner.identities()
        }
        fn faces_dir(&self, identity: &IdentityKey) -> std::path::PathBuf {
            self.inner.faces_dir(identity)
        }
    }

    #[test]
    fn test_concurrent_trigger_returns_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        let store = Arc::new(GatedStore {
            inner: JsonEmbeddingStore::new(dir.path().join("identities")),
            entered: entered_tx,
            release: Mutex::new(release_rx),
        });
        let coordinator = Arc::new(TrainingCoordinator::new(
            store,
            Box::new(JsonBundleRepository::new(dir.path().join("models"))),
        ));

        let first = {
            let coordinator = coordinator.clone();
            std::thread::spawn(move || coordinator.train_if_needed())
        };
        entered_rx.recv().unwrap();

        assert_eq!(coordinator.train_if_needed(), TrainingOutcome::AlreadyRunning);
        assert!(coordinator.status().is_training);

        release_tx.send(()).unwrap();
        assert!(matches!(
            first.join().unwrap(),
            TrainingOutcome::Skipped { .. }
        ));
        assert!(!coordinator.status().is_training);
    }
}
