use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use udb_core::core::events::ProgressSink;
use udb_core::models::settings::DownloaderSettings;

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::hls_downloader::prepare_dirs;
use crate::core::http_client::HttpFetch;
use crate::core::organizer::place_output;
use crate::core::retry::{retry, RetryPolicy};
use crate::core::segment_store::part_path_for;
use crate::core::subtitles::download_subtitles;
use crate::models::job::{DownloadJob, JobReport, JobSource};

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

struct ProbeResult {
    content_length: Option<u64>,
    accept_ranges: bool,
}

/// Single-file downloads (a plain MP4 link instead of a playlist). Partial
/// data is kept in `<output>.part` and resumed with a `Range` request when the
/// server allows it.
pub struct ProgressiveDownloader {
    client: reqwest::Client,
    fetcher: Arc<dyn HttpFetch>,
    referer: Option<String>,
    policy: RetryPolicy,
    response_timeout: Duration,
    stall_timeout: Duration,
}

impl ProgressiveDownloader {
    pub fn new(
        client: reqwest::Client,
        fetcher: Arc<dyn HttpFetch>,
        settings: &DownloaderSettings,
    ) -> Self {
        Self {
            client,
            fetcher,
            referer: settings.referer.clone(),
            policy: RetryPolicy::from_settings(settings),
            response_timeout: Duration::from_secs(settings.request_timeout_secs),
            stall_timeout: Duration::from_secs(settings.segment_timeout_secs),
        }
    }

    pub async fn start(
        &self,
        job: &DownloadJob,
        progress: &dyn ProgressSink,
    ) -> PipelineResult<JobReport> {
        let JobSource::Progressive { url } = &job.source else {
            return Err(PipelineError::UnsupportedStream(format!(
                "{} is not a progressive source",
                job.source.url()
            )));
        };

        prepare_dirs(job).await?;

        tracing::info!("[direct] downloading {}", job.episode_name);
        let size = self.download(url, &job.workspace_output(), progress).await?;
        tracing::debug!("[direct] {} bytes written", size);

        if !job.subtitles.is_empty() {
            download_subtitles(self.fetcher.as_ref(), self.policy, job).await;
        }

        let placed = place_output(job).await?;
        Ok(JobReport {
            output: job.output_path(),
            subtitles_placed: placed.subtitles_placed,
            ..Default::default()
        })
    }

    /// Downloads `url` to `output`, retrying transient failures. Returns the
    /// final file size.
    pub async fn download(
        &self,
        url: &str,
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> PipelineResult<u64> {
        let result = retry(self.policy, url, || self.attempt(url, output, progress)).await;
        progress.finish();
        result
    }

    async fn probe(&self, url: &str) -> ProbeResult {
        let mut request = self.client.head(url);
        if let Some(referer) = &self.referer {
            request = request.header(reqwest::header::REFERER, referer);
        }
        match tokio::time::timeout(PROBE_TIMEOUT, request.send()).await {
            Ok(Ok(resp)) if resp.status().is_success() => {
                let headers = resp.headers();
                let content_length = headers
                    .get(reqwest::header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                let accept_ranges = headers
                    .get(reqwest::header::ACCEPT_RANGES)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.contains("bytes"))
                    .unwrap_or(false);
                ProbeResult {
                    content_length,
                    accept_ranges,
                }
            }
            _ => ProbeResult {
                content_length: None,
                accept_ranges: false,
            },
        }
    }

    async fn attempt(
        &self,
        url: &str,
        output: &Path,
        progress: &dyn ProgressSink,
    ) -> PipelineResult<u64> {
        let part_path = part_path_for(output);
        let probe = self.probe(url).await;

        let existing = match tokio::fs::metadata(&part_path).await {
            Ok(m) if m.len() > 0 && probe.accept_ranges => m.len(),
            _ => 0,
        };

        self.stream_to(url, &part_path, existing, probe.content_length, progress)
            .await?;

        if let Some(expected) = probe.content_length {
            let actual = tokio::fs::metadata(&part_path)
                .await
                .map_err(|e| PipelineError::io(&part_path, e))?
                .len();
            if expected > 0 && actual != expected {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(PipelineError::fetch(
                    url,
                    format!("size mismatch: expected {} bytes, got {}", expected, actual),
                ));
            }
        }

        tokio::fs::rename(&part_path, output)
            .await
            .map_err(|e| PipelineError::io(output, e))?;
        let size = tokio::fs::metadata(output)
            .await
            .map_err(|e| PipelineError::io(output, e))?
            .len();
        Ok(size)
    }

    async fn stream_to(
        &self,
        url: &str,
        part_path: &Path,
        existing_bytes: u64,
        total_size: Option<u64>,
        progress: &dyn ProgressSink,
    ) -> PipelineResult<()> {
        if let Some(total) = total_size {
            if existing_bytes > 0 && existing_bytes >= total {
                return Ok(());
            }
        }

        let mut request = self.client.get(url);
        if let Some(referer) = &self.referer {
            request = request.header(reqwest::header::REFERER, referer);
        }
        if existing_bytes > 0 {
            tracing::debug!("[direct] resuming at byte {}", existing_bytes);
            request = request.header(reqwest::header::RANGE, format!("bytes={}-", existing_bytes));
        }

        let response = tokio::time::timeout(self.response_timeout, request.send())
            .await
            .map_err(|_| PipelineError::fetch(url, "timed out waiting for response headers"))?
            .map_err(|e| PipelineError::fetch(url, e))?;

        let status = response.status();
        let mut offset = 0u64;
        if existing_bytes > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT {
            offset = existing_bytes;
        } else if status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            let _ = tokio::fs::remove_file(part_path).await;
            return Err(PipelineError::fetch(url, "range not satisfiable, restarting"));
        } else if !status.is_success() {
            return Err(PipelineError::fetch(url, format!("HTTP {}", status.as_u16())));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("text/html"));
        if is_html {
            return Err(PipelineError::UnsupportedStream(
                "server returned HTML instead of media; the link may have expired".into(),
            ));
        }

        let file = if offset > 0 {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(part_path)
                .await
        } else {
            tokio::fs::File::create(part_path).await
        }
        .map_err(|e| PipelineError::io(part_path, e))?;

        progress.start("download", total_size.unwrap_or(0));
        progress.advance(offset, "resumed");

        let mut file = tokio::io::BufWriter::with_capacity(256 * 1024, file);
        let mut stream = response.bytes_stream();

        loop {
            match tokio::time::timeout(self.stall_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| PipelineError::io(part_path, e))?;
                    progress.advance(chunk.len() as u64, "");
                }
                Ok(Some(Err(e))) => {
                    file.flush().await.map_err(|e| PipelineError::io(part_path, e))?;
                    return Err(PipelineError::fetch(url, e));
                }
                Ok(None) => break,
                Err(_) => {
                    file.flush().await.map_err(|e| PipelineError::io(part_path, e))?;
                    return Err(PipelineError::fetch(
                        url,
                        format!("no data received for {}s", self.stall_timeout.as_secs()),
                    ));
                }
            }
        }

        file.flush().await.map_err(|e| PipelineError::io(part_path, e))
    }
}


#[cfg(test)]
mod tests {
    use udb_core::core::events::NoopProgress;

    use udb_core::models::settings::ProxySettings;

    use super::testing::{serve, serve_paced};
    use super::*;
    use crate::core::http_client::client_builder;
    use crate::core::http_client::testing::FakeFetcher;
    use crate::models::job::SubtitleTrack;

    fn body() -> Vec<u8> {
        (0..64 * 1024).map(|i| (i % 251) as u8).collect()
    }

    fn downloader(fetcher: FakeFetcher) -> ProgressiveDownloader {
        let settings = DownloaderSettings {
            max_retries: 2,
            retry_base_delay_ms: 1,
            ..Default::default()
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        ProgressiveDownloader::new(client, Arc::new(fetcher), &settings)
    }

    #[tokio::test]
    async fn downloads_whole_file() {
        let server = serve(body(), true).await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ep.mp4");

        let size = downloader(FakeFetcher::new())
            .download(&server.url, &output, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(size, body().len() as u64);
        assert_eq!(std::fs::read(&output).unwrap(), body());
        assert!(!part_path_for(&output).exists());
    }

    #[tokio::test]
    async fn slow_steady_body_outlasts_request_timeout() {
        let body: Vec<u8> = (0..48u8).collect();
        let server = serve_paced(body.clone(), false, Some((8, Duration::from_millis(300)))).await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ep.mp4");
        let settings = DownloaderSettings {
            max_retries: 1,
            retry_base_delay_ms: 1,
            request_timeout_secs: 1,
            segment_timeout_secs: 5,
            ..Default::default()
        };
        let client = client_builder(&settings, &ProxySettings::default())
            .no_proxy()
            .build()
            .unwrap();

        let size = ProgressiveDownloader::new(client, Arc::new(FakeFetcher::new()), &settings)
            .download(&server.url, &output, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(size, body.len() as u64);
        assert_eq!(std::fs::read(&output).unwrap(), body);
    }

    #[tokio::test]
    async fn resumes_partial_file_with_range() {
        let server = serve(body(), true).await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ep.mp4");
        std::fs::write(part_path_for(&output), &body()[..1000]).unwrap();

        downloader(FakeFetcher::new())
            .download(&server.url, &output, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), body());
        assert_eq!(server.ranges_seen.lock().unwrap().as_slice(), ["1000-"]);
    }

    #[tokio::test]
    async fn restarts_when_server_has_no_ranges() {
        let server = serve(body(), false).await;
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ep.mp4");
        std::fs::write(part_path_for(&output), b"stale bytes").unwrap();

        downloader(FakeFetcher::new())
            .download(&server.url, &output, &NoopProgress)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), body());
        assert!(server.ranges_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_places_video_and_subtitles() {
        let server = serve(body(), true).await;
        let dir = tempfile::tempdir().unwrap();
        let job = DownloadJob::new(
            "Episode 4",
            dir.path().join("Show"),
            dir.path().join("Show").join("temp_dir"),
            JobSource::Progressive {
                url: server.url.clone(),
            },
        )
        .with_subtitles(vec![SubtitleTrack {
            label: "English".into(),
            url: "https://s.example.com/en.srt".into(),
        }]);
        let fetcher = FakeFetcher::new().with("https://s.example.com/en.srt", b"1\n".to_vec());

        let report = downloader(fetcher).start(&job, &NoopProgress).await.unwrap();

        assert_eq!(report.output, job.output_path());
        assert_eq!(report.subtitles_placed, 1);
        assert_eq!(std::fs::read(job.output_path()).unwrap(), body());
        assert!(job.out_dir.join("Episode 4.en.srt").exists());
        assert!(!job.workspace().exists());
    }

    #[tokio::test]
    async fn hls_job_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let job = DownloadJob::new(
            "Ep",
            dir.path(),
            dir.path().join("tmp"),
            JobSource::Hls {
                manifest_url: "https://x/index.m3u8".into(),
            },
        );
        let result = downloader(FakeFetcher::new()).start(&job, &NoopProgress).await;
        assert!(matches!(result, Err(PipelineError::UnsupportedStream(_))));
    }
}
