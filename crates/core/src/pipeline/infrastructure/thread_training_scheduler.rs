use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::pipeline::training_scheduler::TrainingScheduler;
use crate::training::domain::training_status::TrainingOutcome;
use crate::training::training_coordinator::TrainingCoordinator;

/// Spawns one thread per trigger; the coordinator's single-flight guard
/// turns overlapping triggers into no-ops.
pub struct ThreadTrainingScheduler {
    coordinator: Arc<TrainingCoordinator>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadTrainingScheduler {
    pub fn new(coordinator: Arc<TrainingCoordinator>) -> Self {
        Self {
            coordinator,
            handles: Mutex::new(Vec::new()),
        }
    }
}

impl TrainingScheduler for ThreadTrainingScheduler {
    fn schedule(&self) -> bool {
        let coordinator = self.coordinator.clone();
        let spawned = std::thread::Builder::new()
            .name("face-gallery-training".into())
            .spawn(move || match coordinator.train_if_needed() {
                TrainingOutcome::AlreadyRunning => {
                    log::debug!("Background training trigger coalesced")
                }
                outcome => log::debug!("Background training finished: {outcome:?}"),
            });

        match spawned {
            Ok(handle) => {
                if let Ok(mut handles) = self.handles.lock() {
                    handles.retain(|h| !h.is_finished());
                    handles.push(handle);
                }
                true
            }
            Err(e) => {
                log::error!("Failed to spawn training thread: {e}");
                false
            }
        }
    }

    fn wait_idle(&self) {
        let pending: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => return,
        };
        for handle in pending {
            if handle.join().is_err() {
                log::error!("Training thread panicked");
            }
        }
    }
}
