use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum QueueStatus {
    Queued,
    Active,
    Skipped,
    Complete { segments_failed: usize },
    Error { exit_code: i32, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueItemInfo {
    pub index: usize,
    pub title: String,
    pub status: QueueStatus,
    pub file_path: Option<String>,
}

/// Receives progress of the bulk stage of a job (segments for HLS, bytes for
/// progressive downloads). Implementations must be cheap; they are called from
/// every worker.
pub trait ProgressSink: Send + Sync {
    fn start(&self, label: &str, total: u64);
    fn advance(&self, delta: u64, message: &str);
    fn finish(&self);
}

pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn start(&self, _label: &str, _total: u64) {}
    fn advance(&self, _delta: u64, _message: &str) {}
    fn finish(&self) {}
}
