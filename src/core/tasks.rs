use crate::core::model::{PipelineOutcome, TaskId, TaskRecord, TaskStatus};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory task bookkeeping for the HTTP front end.
#[derive(Clone, Default)]
pub struct TaskStore {
    tasks: Arc<Mutex<HashMap<TaskId, TaskRecord>>>,
}

impl TaskStore {
    pub async fn create(&self) -> TaskId {
        let id = Uuid::new_v4();
        self.tasks.lock().await.insert(id, TaskRecord::new(id));
        id
    }

    pub async fn get(&self, id: TaskId) -> Option<TaskRecord> {
        self.tasks.lock().await.get(&id).cloned()
    }

    pub async fn set_message(&self, id: TaskId, message: &str) {
        if let Some(t) = self.tasks.lock().await.get_mut(&id) {
            t.message = message.to_string();
        }
    }

    pub async fn complete(&self, id: TaskId, outcome: PipelineOutcome) {
        if let Some(t) = self.tasks.lock().await.get_mut(&id) {
            t.status = TaskStatus::Success;
            t.message = "Process completed successfully".to_string();
            t.result = Some(outcome);
        }
    }

    pub async fn fail(&self, id: TaskId, message: String) {
        if let Some(t) = self.tasks.lock().await.get_mut(&id) {
            t.status = TaskStatus::Error;
            t.message = message;
        }
    }

    /// Drops records older than `retention`. Returns how many were removed.
    pub async fn sweep(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, t| t.start_time > cutoff);
        before - tasks.len()
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }
}
