use crate::core::model::TaskId;
use serde::Serialize;

/// One progress line broadcast to SSE listeners.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Caller-supplied receiver of progress messages. Must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn emit(&self, message: &str) {
        self(message)
    }
}
