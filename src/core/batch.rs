use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use udb_core::core::events::ProgressSink;
use udb_core::models::settings::DownloaderSettings;

use crate::core::downloader::Downloader;
use crate::core::filename::series_folder_name;
use crate::core::queue::{BatchQueue, BatchSummary};
use crate::models::job::{DownloadJob, JobSource, SubtitleTrack};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadType {
    #[default]
    Hls,
    #[serde(alias = "direct", alias = "mp4")]
    Progressive,
}

/// One episode as listed in a batch file.
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeEntry {
    #[serde(alias = "episodeName")]
    pub episode_name: String,
    #[serde(alias = "downloadLink")]
    pub download_link: String,
    #[serde(default, alias = "downloadType")]
    pub download_type: DownloadType,
    #[serde(default)]
    pub subtitles: Vec<SubtitleTrack>,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl EpisodeEntry {
    pub fn source(&self) -> JobSource {
        match self.download_type {
            DownloadType::Hls => JobSource::Hls {
                manifest_url: self.download_link.clone(),
            },
            DownloadType::Progressive => JobSource::Progressive {
                url: self.download_link.clone(),
            },
        }
    }
}

pub fn parse_entries(text: &str) -> anyhow::Result<Vec<EpisodeEntry>> {
    serde_json::from_str(text).context("batch file is not a JSON array of episodes")
}

pub fn load_entries(path: &Path) -> anyhow::Result<Vec<EpisodeEntry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read batch file {}", path.display()))?;
    parse_entries(&text)
}

/// Where a series lands: `<download_dir>/<series>` with a shared
/// `temp_dir` inside it.
#[derive(Debug, Clone)]
pub struct SeriesLayout {
    pub series_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl SeriesLayout {
    pub fn new(settings: &DownloaderSettings, series_title: &str) -> Self {
        let series_dir = settings.download_dir.join(series_folder_name(series_title));
        let temp_dir = series_dir.join(&settings.temp_dir_name);
        Self {
            series_dir,
            temp_dir,
        }
    }

    pub fn job_for(&self, entry: &EpisodeEntry, default_resolution: &str) -> DownloadJob {
        DownloadJob::new(
            &entry.episode_name,
            &self.series_dir,
            &self.temp_dir,
            entry.source(),
        )
        .with_subtitles(entry.subtitles.clone())
        .with_resolution(
            entry
                .resolution
                .clone()
                .or_else(|| Some(default_resolution.to_string())),
        )
    }
}

/// Builds the queue for a batch, marking episodes already on disk as skipped
/// when `skip_existing` is set.
pub fn build_queue(
    entries: &[EpisodeEntry],
    layout: &SeriesLayout,
    settings: &DownloaderSettings,
) -> BatchQueue {
    let mut queue = BatchQueue::new();
    for entry in entries {
        let job = layout.job_for(entry, &settings.resolution);
        let exists = job.output_path().is_file();
        let index = queue.enqueue(job);
        if settings.skip_existing && exists {
            tracing::info!("[batch] skipping {}, already downloaded", entry.episode_name);
            queue.mark_skipped(index);
        }
    }
    queue
}

/// Runs queued episodes one after another. A failed episode does not stop
/// the batch; cancellation stops it after the current episode is abandoned.
pub async fn run_batch(
    downloader: &Downloader,
    queue: &mut BatchQueue,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> BatchSummary {
    let total = queue.items.len();
    while let Some(index) = queue.next_queued() {
        if cancel.is_cancelled() {
            break;
        }
        let Some(job) = queue.job(index).cloned() else {
            break;
        };
        tracing::info!("[batch] ({}/{}) {}", index + 1, total, job.episode_name);
        queue.mark_active(index);

        let outcome = downloader.start(&job, progress, cancel).await;
        if !outcome.is_success() {
            tracing::error!(
                "[batch] {} failed with code {}: {}",
                job.episode_name,
                outcome.exit_code,
                outcome.message.as_deref().unwrap_or("unknown error")
            );
        }
        queue.mark_complete(index, &outcome);
    }

    if cancel.is_cancelled() {
        tracing::warn!("[batch] interrupted; downloaded segments are kept for the next run");
    }

    let summary = queue.summary();
    tracing::info!(
        "[batch] done: {} downloaded, {} skipped, {} failed, {} cancelled, {} not started",
        summary.complete,
        summary.skipped,
        summary.failed,
        summary.cancelled,
        summary.pending
    );
    summary
}
