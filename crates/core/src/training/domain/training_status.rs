use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastStatus {
    #[default]
    Never,
    Running,
    Ok,
    Skipped,
    Error,
}

/// Read-only view of the coordinator state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingStatusReport {
    pub is_training: bool,
    pub last_trained_at: Option<DateTime<Utc>>,
    pub last_status: LastStatus,
    pub last_error: Option<String>,
    pub artifacts_exist: bool,
}

/// Result of one `train_if_needed` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrainingOutcome {
    Trained {
        version: String,
        identities: usize,
        samples: usize,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
    AlreadyRunning,
}

#[derive(Clone, Debug, Default)]
struct StatusRecord {
    last_trained_at: Option<DateTime<Utc>>,
    last_status: LastStatus,
    last_error: Option<String>,
}

/// Training state machine: `idle -> running -> {ok, skipped, error} -> idle`.
///
/// Entering `running` is a compare-and-swap, so at most one run is active.
#[derive(Debug, Default)]
pub struct TrainingState {
    running: AtomicBool,
    record: RwLock<StatusRecord>,
}

impl TrainingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the running slot, or `None` if a run is already active.
    pub fn try_begin(&self) -> Option<TrainingRun<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        record.last_status = LastStatus::Running;
        record.last_error = None;
        drop(record);

        Some(TrainingRun {
            state: self,
            finished: false,
        })
    }

    pub fn is_training(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn report(&self, artifacts_exist: bool) -> TrainingStatusReport {
        let record = self.record.read().unwrap_or_else(PoisonError::into_inner);
        TrainingStatusReport {
            is_training: self.is_training(),
            last_trained_at: record.last_trained_at,
            last_status: record.last_status,
            last_error: record.last_error.clone(),
            artifacts_exist,
        }
    }

    fn record_finish(&self, status: LastStatus, error: Option<String>, at: Option<DateTime<Utc>>) {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        record.last_status = status;
        record.last_error = error;
        if at.is_some() {
            record.last_trained_at = at;
        }
    }
}

/// Proof of holding the running slot. Dropping it releases the slot; a run
/// dropped without a `finish_*` call (e.g. on panic) is recorded as an error.
#[derive(Debug)]
pub struct TrainingRun<'a> {
    state: &'a TrainingState,
    finished: bool,
}

impl TrainingRun<'_> {
    pub fn finish_ok(mut self, trained_at: DateTime<Utc>) {
        self.state
            .record_finish(LastStatus::Ok, None, Some(trained_at));
        self.finished = true;
    }

    pub fn finish_skipped(mut self, reason: &str) {
        self.state
            .record_finish(LastStatus::Skipped, Some(reason.to_string()), None);
        self.finished = true;
    }

    pub fn finish_error(mut self, error: &str) {
        self.state
            .record_finish(LastStatus::Error, Some(error.to_string()), None);
        self.finished = true;
    }
}

impl Drop for TrainingRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.record_finish(
                LastStatus::Error,
                Some("training aborted".to_string()),
                None,
            );
        }
        self.state.running.store(false, Ordering::Release);
    }
}
