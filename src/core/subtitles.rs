use std::path::{Path, PathBuf};

use crate::core::error::PipelineError;
use crate::core::filename::sanitize_path_component;
use crate::core::http_client::HttpFetch;
use crate::core::retry::{retry, RetryPolicy};
use crate::models::job::{DownloadJob, SubtitleTrack};

pub fn subtitle_file_name(track: &SubtitleTrack, episode_base: &str) -> String {
    format!(
        "{}_{}.srt",
        sanitize_path_component(&track.label).to_lowercase(),
        episode_base
    )
}

/// Downloads every subtitle track of `job` into its workspace. A track that
/// cannot be fetched is skipped with a warning; returns the files written.
pub async fn download_subtitles(
    fetcher: &dyn HttpFetch,
    policy: RetryPolicy,
    job: &DownloadJob,
) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for track in &job.subtitles {
        let target = job.workspace().join(subtitle_file_name(track, &job.episode_name));
        match fetch_one(fetcher, policy, &track.url, &target).await {
            Ok(()) => {
                tracing::debug!("[subtitles] {} -> {}", track.label, target.display());
                written.push(target);
            }
            Err(e) => tracing::warn!("[subtitles] skipping {}: {}", track.label, e),
        }
    }
    written
}

async fn fetch_one(
    fetcher: &dyn HttpFetch,
    policy: RetryPolicy,
    url: &str,
    target: &Path,
) -> Result<(), PipelineError> {
    let body = retry(policy, url, || fetcher.fetch_bytes(url)).await?;
    tokio::fs::write(target, body)
        .await
        .map_err(|e| PipelineError::io(target, e))
}
