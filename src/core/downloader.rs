use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use udb_core::core::events::ProgressSink;
use udb_core::models::settings::{DownloaderSettings, ProxySettings};

use crate::core::direct_downloader::ProgressiveDownloader;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::ffmpeg::{FfmpegMuxer, Remuxer};
use crate::core::hls_downloader::HlsDownloader;
use crate::core::http_client::{build_client, build_stream_client, HttpFetch, ReqwestFetcher};
use crate::models::job::{DownloadJob, JobOutcome, JobReport, JobSource};

/// Entry point for one episode, whatever kind of source it has.
pub struct Downloader {
    hls: HlsDownloader,
    progressive: ProgressiveDownloader,
}

impl Downloader {
    pub fn new(hls: HlsDownloader, progressive: ProgressiveDownloader) -> Self {
        Self { hls, progressive }
    }

    /// Wires the real HTTP client and ffmpeg from settings.
    pub fn from_settings(
        settings: &DownloaderSettings,
        proxy: &ProxySettings,
    ) -> anyhow::Result<Self> {
        let client = build_client(settings, proxy)?;
        let fetcher: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(client, settings));
        let muxer: Arc<dyn Remuxer> = Arc::new(FfmpegMuxer::new(settings.ffmpeg_path.clone()));
        Ok(Self::new(
            HlsDownloader::from_settings(Arc::clone(&fetcher), muxer, settings),
            ProgressiveDownloader::new(build_stream_client(settings, proxy)?, fetcher, settings),
        ))
    }

    pub async fn run(
        &self,
        job: &DownloadJob,
        progress: &dyn ProgressSink,
    ) -> PipelineResult<JobReport> {
        match &job.source {
            JobSource::Hls { .. } => self.hls.start(job, progress).await,
            JobSource::Progressive { .. } => self.progressive.start(job, progress).await,
        }
    }

    /// Runs `job` to completion or until `cancel` fires. Downloaded segments
    /// and partial files stay in the workspace either way.
    pub async fn start(
        &self,
        job: &DownloadJob,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            result = self.run(job, progress) => result,
        };

        match &result {
            Ok(report) => {
                if report.segments_failed > 0 {
                    tracing::warn!(
                        "[download] {} finished with {} failed segment(s)",
                        job.episode_name,
                        report.segments_failed
                    );
                } else {
                    tracing::info!("[download] {} -> {}", job.episode_name, report.output.display());
                }
            }
            Err(e) => tracing::error!("[download] {} failed: {}", job.episode_name, e),
        }
        JobOutcome::from(result)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use udb_core::core::events::NoopProgress;

    use super::*;
    use crate::core::hls_downloader::testing::FakeMuxer;
    use crate::core::http_client::testing::FakeFetcher;
    use crate::core::retry::RetryPolicy;

    const MANIFEST_URL: &str = "https://x.example.com/path/index.m3u8";

    fn downloader(fetcher: FakeFetcher) -> Downloader {
        let fetcher: Arc<dyn HttpFetch> = Arc::new(fetcher);
        let settings = DownloaderSettings {
            max_retries: 1,
            retry_base_delay_ms: 1,
            ..Default::default()
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        Downloader::new(
            HlsDownloader::new(
                Arc::clone(&fetcher),
                Arc::new(FakeMuxer::default()),
                RetryPolicy::new(1, Duration::from_millis(1)),
                2,
            ),
            ProgressiveDownloader::new(client, fetcher, &settings),
        )
    }

    fn hls_job(root: &Path) -> DownloadJob {
        DownloadJob::new(
            "Episode 1",
            root.join("out"),
            root.join("tmp"),
            JobSource::Hls {
                manifest_url: MANIFEST_URL.into(),
            },
        )
    }

    #[tokio::test]
    async fn hls_job_succeeds_with_exit_code_zero() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\na.ts\n#EXT-X-ENDLIST\n";
        let fetcher = FakeFetcher::new()
            .with(MANIFEST_URL, manifest.as_bytes().to_vec())
            .with("https://x.example.com/path/a.ts", vec![0u8; 8]);

        let outcome = downloader(fetcher)
            .start(&hls_job(dir.path()), &NoopProgress, &CancellationToken::new())
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.message);
        assert_eq!(outcome.report.unwrap().segments_total, 1);
    }

    #[tokio::test]
    async fn unreachable_manifest_is_a_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = downloader(FakeFetcher::new())
            .start(&hls_job(dir.path()), &NoopProgress, &CancellationToken::new())
            .await;
        assert_eq!(outcome.exit_code, 2);
        assert!(outcome.message.unwrap().contains(MANIFEST_URL));
    }

    #[tokio::test]
    async fn cancelled_job_reports_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = downloader(FakeFetcher::new())
            .start(&hls_job(dir.path()), &NoopProgress, &cancel)
            .await;

        assert_eq!(outcome.exit_code, PipelineError::Cancelled.exit_code());
    }
}
