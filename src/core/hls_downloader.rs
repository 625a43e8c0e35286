use std::sync::Arc;

use udb_core::core::events::ProgressSink;
use udb_core::models::settings::DownloaderSettings;

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::ffmpeg::{MuxRequest, Remuxer};
use crate::core::http_client::HttpFetch;
use crate::core::manifest::Manifest;
use crate::core::organizer::{place_output, remove_workspace};
use crate::core::retry::{retry, RetryPolicy};
use crate::core::rewriter::write_local_manifest;
use crate::core::segment_store::SegmentStore;
use crate::core::subtitles::download_subtitles;
use crate::core::url_resolver::{dedup_by_local_name, resolve_url};
use crate::models::job::{DownloadJob, JobReport, JobSource};

pub struct HlsDownloader {
    fetcher: Arc<dyn HttpFetch>,
    muxer: Arc<dyn Remuxer>,
    policy: RetryPolicy,
    workers: usize,
}

impl HlsDownloader {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        muxer: Arc<dyn Remuxer>,
        policy: RetryPolicy,
        workers: usize,
    ) -> Self {
        Self {
            fetcher,
            muxer,
            policy,
            workers: workers.max(1),
        }
    }

    pub fn from_settings(
        fetcher: Arc<dyn HttpFetch>,
        muxer: Arc<dyn Remuxer>,
        settings: &DownloaderSettings,
    ) -> Self {
        Self::new(
            fetcher,
            muxer,
            RetryPolicy::from_settings(settings),
            settings.max_workers as usize,
        )
    }

    /// Runs one HLS episode from manifest to organized output.
    ///
    /// Stages run strictly in order and every segment fetch has finished
    /// before the manifest is rewritten. Unsupported playlists are rejected
    /// before anything but the manifest has been requested and before any
    /// folder is created. On failure the workspace is removed again, except
    /// after a mux error where the segments are kept for the next run.
    pub async fn start(
        &self,
        job: &DownloadJob,
        progress: &dyn ProgressSink,
    ) -> PipelineResult<JobReport> {
        let JobSource::Hls { manifest_url } = &job.source else {
            return Err(PipelineError::UnsupportedStream(format!(
                "{} is not an HLS source",
                job.source.url()
            )));
        };

        tracing::info!("[hls] fetching manifest for {}", job.episode_name);
        let text = retry(self.policy, manifest_url, || {
            self.fetcher.fetch_text(manifest_url)
        })
        .await?;

        let manifest = Manifest::parse(text)?;
        if manifest.segments.is_empty() {
            return Err(PipelineError::Rewrite(
                "manifest has no segment references".into(),
            ));
        }

        prepare_dirs(job).await?;

        match self.download(job, manifest_url, &manifest, progress).await {
            Err(e) if !matches!(e, PipelineError::Mux { .. }) => {
                tracing::debug!("[hls] removing workspace of {}", job.episode_name);
                remove_workspace(job).await;
                Err(e)
            }
            result => result,
        }
    }

    async fn download(
        &self,
        job: &DownloadJob,
        manifest_url: &str,
        manifest: &Manifest,
        progress: &dyn ProgressSink,
    ) -> PipelineResult<JobReport> {
        let store = Arc::new(SegmentStore::new(
            Arc::clone(&self.fetcher),
            job.workspace(),
            self.policy,
        ));

        if let Some(key_uri) = manifest.key_uri() {
            let key_url = resolve_url(manifest_url, key_uri);
            tracing::debug!("[hls] stream is encrypted, fetching key {}", key_url);
            store.fetch_key(&key_url).await?;
        }

        let urls = dedup_by_local_name(
            manifest
                .segments
                .iter()
                .map(|reference| resolve_url(manifest_url, reference)),
        );
        tracing::info!(
            "[hls] downloading {} segments with {} workers",
            urls.len(),
            self.workers
        );

        let fetched = store.fetch_all(urls, self.workers, progress).await;
        if fetched.failed() > 0 {
            tracing::warn!(
                "[hls] {} of {} segments failed; the output may have gaps",
                fetched.failed(),
                fetched.segments.len()
            );
        }

        let local_manifest = write_local_manifest(&manifest.text, job.workspace()).await?;

        if !job.subtitles.is_empty() {
            let written = download_subtitles(self.fetcher.as_ref(), self.policy, job).await;
            tracing::debug!("[hls] {} subtitle file(s) downloaded", written.len());
        }

        let request = MuxRequest {
            manifest: local_manifest,
            subtitles: job.subtitles.clone(),
            output: job.workspace_output(),
            workspace: job.workspace().to_path_buf(),
        };
        tracing::info!("[mux] writing {}", request.output.display());
        self.muxer.mux(&request).await?;

        let placed = place_output(job).await?;

        Ok(JobReport {
            output: job.output_path(),
            segments_total: fetched.segments.len(),
            segments_reused: fetched.reused(),
            segments_failed: fetched.failed(),
            subtitles_placed: placed.subtitles_placed,
        })
    }
}

/// Creates the destination folder, the shared temp folder and the job's own
/// workspace.
pub async fn prepare_dirs(job: &DownloadJob) -> PipelineResult<()> {
    for dir in [&job.out_dir, &job.parent_temp_dir, &job.workspace] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PipelineError::io(dir, e))?;
    }
    Ok(())
}
