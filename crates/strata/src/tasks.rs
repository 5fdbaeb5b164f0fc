// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background task tracking and per-user ingestion single-flight.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use strata_core::{StrataError, TaskStatus, UserId};
use tokio_util::task::TaskTracker;
use tracing::{debug, error};
use uuid::Uuid;

/// Tracked background work (post-ingest learning runs).
///
/// Every spawned task gets an id the caller can poll, and shutdown waits
/// for the full set so facts in flight are not lost to process exit.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    statuses: Arc<Mutex<HashMap<String, TaskStatus>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a tracked task and returns its id.
    pub fn spawn<F>(&self, label: &str, work: F) -> String
    where
        F: std::future::Future<Output = Result<(), StrataError>> + Send + 'static,
    {
        let task_id = Uuid::new_v4().to_string();
        self.statuses
            .lock()
            .expect("task status lock poisoned")
            .insert(task_id.clone(), TaskStatus::Pending);

        let statuses = self.statuses.clone();
        let id = task_id.clone();
        let label = label.to_string();
        self.tracker.spawn(async move {
            set_status(&statuses, &id, TaskStatus::Running);
            match work.await {
                Ok(()) => {
                    debug!(task_id = %id, label = %label, "background task done");
                    set_status(&statuses, &id, TaskStatus::Done);
                }
                Err(err) => {
                    error!(task_id = %id, label = %label, error = %err, "background task failed");
                    set_status(&statuses, &id, TaskStatus::Failed);
                }
            }
        });
        task_id
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.statuses
            .lock()
            .expect("task status lock poisoned")
            .get(task_id)
            .copied()
    }

    /// Closes the tracker and waits for every spawned task.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

fn set_status(statuses: &Mutex<HashMap<String, TaskStatus>>, id: &str, status: TaskStatus) {
    statuses
        .lock()
        .expect("task status lock poisoned")
        .insert(id.to_string(), status);
}

/// Per-user ingestion mutual exclusion.
///
/// Two concurrent ingestion runs for one user would race on chunk upserts
/// and double-bill embedding; the second caller is rejected outright
/// instead of queued.
#[derive(Clone, Default)]
pub struct SingleFlight {
    inflight: Arc<Mutex<HashSet<String>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the user's slot. The returned guard releases it on drop.
    pub fn begin(&self, user_id: &UserId) -> Result<SingleFlightGuard, StrataError> {
        let mut inflight = self.inflight.lock().expect("single-flight lock poisoned");
        if !inflight.insert(user_id.0.clone()) {
            return Err(StrataError::IngestInFlight {
                user_id: user_id.0.clone(),
            });
        }
        Ok(SingleFlightGuard {
            inflight: self.inflight.clone(),
            user_id: user_id.0.clone(),
        })
    }
}

pub struct SingleFlightGuard {
    inflight: Arc<Mutex<HashSet<String>>>,
    user_id: String,
}

impl Drop for SingleFlightGuard {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .expect("single-flight lock poisoned")
            .remove(&self.user_id);
    }
}
