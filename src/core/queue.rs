use serde::Serialize;
use udb_core::core::events::{QueueItemInfo, QueueStatus};

use crate::core::error::PipelineError;
use crate::models::job::{DownloadJob, JobOutcome};

pub struct QueueItem {
    pub index: usize,
    pub status: QueueStatus,
    pub job: DownloadJob,
    pub file_path: Option<String>,
}

impl QueueItem {
    pub fn to_info(&self) -> QueueItemInfo {
        QueueItemInfo {
            index: self.index,
            title: self.job.episode_name.clone(),
            status: self.status.clone(),
            file_path: self.file_path.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub complete: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub pending: usize,
}

impl BatchSummary {
    /// 0 when every episode is on disk, 130 when the batch was interrupted,
    /// 1 when at least one episode failed.
    pub fn exit_code(&self) -> i32 {
        if self.pending > 0 || self.cancelled > 0 {
            130
        } else if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

/// Ordered list of the episodes of one batch run and where each one stands.
#[derive(Default)]
pub struct BatchQueue {
    pub items: Vec<QueueItem>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, job: DownloadJob) -> usize {
        let index = self.items.len();
        self.items.push(QueueItem {
            index,
            status: QueueStatus::Queued,
            job,
            file_path: None,
        });
        index
    }

    pub fn next_queued(&self) -> Option<usize> {
        self.items
            .iter()
            .find(|i| i.status == QueueStatus::Queued)
            .map(|i| i.index)
    }

    pub fn job(&self, index: usize) -> Option<&DownloadJob> {
        self.items.get(index).map(|i| &i.job)
    }

    pub fn mark_active(&mut self, index: usize) {
        if let Some(item) = self.items.get_mut(index) {
            item.status = QueueStatus::Active;
        }
    }

    pub fn mark_skipped(&mut self, index: usize) {
        if let Some(item) = self.items.get_mut(index) {
            item.status = QueueStatus::Skipped;
            item.file_path = Some(item.job.output_path().to_string_lossy().into_owned());
        }
    }

    pub fn mark_complete(&mut self, index: usize, outcome: &JobOutcome) {
        let Some(item) = self.items.get_mut(index) else {
            return;
        };
        match &outcome.report {
            Some(report) if outcome.is_success() => {
                item.status = QueueStatus::Complete {
                    segments_failed: report.segments_failed,
                };
                item.file_path = Some(report.output.to_string_lossy().into_owned());
            }
            _ => {
                item.status = QueueStatus::Error {
                    exit_code: outcome.exit_code,
                    message: outcome.message.clone().unwrap_or_default(),
                };
            }
        }
    }

    pub fn get_state(&self) -> Vec<QueueItemInfo> {
        self.items.iter().map(|i| i.to_info()).collect()
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for item in &self.items {
            match item.status {
                QueueStatus::Complete { .. } => summary.complete += 1,
                QueueStatus::Skipped => summary.skipped += 1,
                QueueStatus::Error { exit_code, .. }
                    if exit_code == PipelineError::Cancelled.exit_code() =>
                {
                    summary.cancelled += 1
                }
                QueueStatus::Error { .. } => summary.failed += 1,
                QueueStatus::Queued | QueueStatus::Active => summary.pending += 1,
            }
        }
        summary
    }
}
