use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use udb_core::core::events::ProgressSink;

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::http_client::HttpFetch;
use crate::core::retry::{retry, RetryPolicy};
use crate::core::url_resolver::local_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    Pending,
    Downloaded,
    Reused,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub source_url: String,
    pub local_name: String,
    pub status: SegmentStatus,
}

impl Segment {
    pub fn pending(url: &str) -> Self {
        Self {
            source_url: url.to_string(),
            local_name: local_name(url),
            status: SegmentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub segment: Segment,
    pub message: String,
}

impl FetchOutcome {
    pub fn success(&self) -> bool {
        matches!(
            self.segment.status,
            SegmentStatus::Downloaded | SegmentStatus::Reused
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub segments: Vec<Segment>,
}

impl FetchReport {
    fn count(&self, status: SegmentStatus) -> usize {
        self.segments.iter().filter(|s| s.status == status).count()
    }

    pub fn downloaded(&self) -> usize {
        self.count(SegmentStatus::Downloaded)
    }

    pub fn reused(&self) -> usize {
        self.count(SegmentStatus::Reused)
    }

    pub fn failed(&self) -> usize {
        self.count(SegmentStatus::Failed)
    }
}

pub struct SegmentStore {
    fetcher: Arc<dyn HttpFetch>,
    workspace: PathBuf,
    policy: RetryPolicy,
}

impl SegmentStore {
    pub fn new(fetcher: Arc<dyn HttpFetch>, workspace: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            workspace: workspace.into(),
            policy,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.workspace.join(local_name(url))
    }

    /// Stores `url` under its local name, reusing a non-empty file already in
    /// the workspace. Never fails: failures are reported in the outcome.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut segment = Segment::pending(url);
        let target = self.workspace.join(&segment.local_name);

        if is_reusable(&target).await {
            segment.status = SegmentStatus::Reused;
            let message = format!("Segment file [{}] already exists. Reusing.", segment.local_name);
            return FetchOutcome { segment, message };
        }

        let result = retry(self.policy, url, || self.download_to(url, &target)).await;
        match result {
            Ok(bytes) => {
                segment.status = SegmentStatus::Downloaded;
                let message = format!("Segment file [{}] downloaded ({} bytes)", segment.local_name, bytes);
                FetchOutcome { segment, message }
            }
            Err(e) => {
                segment.status = SegmentStatus::Failed;
                let message = format!("Segment download failed [{}] due to: {}", segment.local_name, e);
                FetchOutcome { segment, message }
            }
        }
    }

    async fn download_to(&self, url: &str, target: &Path) -> PipelineResult<usize> {
        let bytes = self.fetcher.fetch_bytes(url).await?;
        let part = part_path_for(target);
        tokio::fs::write(&part, &bytes)
            .await
            .map_err(|e| PipelineError::io(&part, e))?;
        tokio::fs::rename(&part, target)
            .await
            .map_err(|e| PipelineError::io(target, e))?;
        Ok(bytes.len())
    }

    /// Fetches the decryption key. Unlike segments, a key that cannot be
    /// fetched fails the job.
    pub async fn fetch_key(&self, url: &str) -> PipelineResult<Segment> {
        let outcome = self.fetch(url).await;
        tracing::debug!("[hls] key: {}", outcome.message);
        if outcome.success() {
            Ok(outcome.segment)
        } else {
            Err(PipelineError::fetch(url, outcome.message))
        }
    }

    /// Fetches every URL with a fixed pool of `workers` tasks pulling from a
    /// shared queue. Returns once every fetch has finished, successful or not;
    /// the report lists segments in input order.
    pub async fn fetch_all(
        self: &Arc<Self>,
        urls: Vec<String>,
        workers: usize,
        progress: &dyn ProgressSink,
    ) -> FetchReport {
        let total = urls.len();
        progress.start("segments", total as u64);

        let queue: Arc<Mutex<VecDeque<(usize, String)>>> =
            Arc::new(Mutex::new(urls.iter().cloned().enumerate().collect()));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, FetchOutcome)>();

        let mut pool = JoinSet::new();
        for _ in 0..workers.clamp(1, total.max(1)) {
            let store = Arc::clone(self);
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            pool.spawn(async move {
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .pop_front();
                    let Some((idx, url)) = next else { break };
                    let outcome = store.fetch(&url).await;
                    if tx.send((idx, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut slots: Vec<Option<Segment>> = vec![None; total];
        while let Some((idx, outcome)) = rx.recv().await {
            if outcome.success() {
                tracing::debug!("[segments] {}", outcome.message);
            } else {
                tracing::warn!("[segments] {}", outcome.message);
            }
            progress.advance(1, &outcome.message);
            slots[idx] = Some(outcome.segment);
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                tracing::error!("[segments] worker task failed: {}", e);
            }
        }
        progress.finish();

        let segments = slots
            .into_iter()
            .zip(urls.iter())
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| Segment {
                    status: SegmentStatus::Failed,
                    ..Segment::pending(url)
                })
            })
            .collect();
        FetchReport { segments }
    }
}

async fn is_reusable(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

pub fn part_path_for(output: &Path) -> PathBuf {
    let mut part = output.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use udb_core::core::events::NoopProgress;

    use super::*;
    use crate::core::http_client::testing::FakeFetcher;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    fn store(fetcher: Arc<FakeFetcher>, dir: &Path) -> Arc<SegmentStore> {
        Arc::new(SegmentStore::new(fetcher, dir, policy()))
    }

    #[tokio::test]
    async fn existing_segment_is_reused_without_network() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001.ts"), b"cached").unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        let store = store(fetcher.clone(), dir.path());

        let outcome = store.fetch("https://cdn.example.com/v/0001.ts").await;

        assert!(outcome.success());
        assert_eq!(outcome.segment.status, SegmentStatus::Reused);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_file_is_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0001.ts"), b"").unwrap();
        let url = "https://cdn.example.com/v/0001.ts";
        let fetcher = Arc::new(FakeFetcher::new().with(url, b"fresh".to_vec()));
        let store = store(fetcher.clone(), dir.path());

        let outcome = store.fetch(url).await;

        assert_eq!(outcome.segment.status, SegmentStatus::Downloaded);
        assert_eq!(std::fs::read(dir.path().join("0001.ts")).unwrap(), b"fresh");
        assert!(!dir.path().join("0001.ts.part").exists());
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://cdn.example.com/v/7.ts";
        let fetcher = Arc::new(FakeFetcher::new().with(url, b"data".to_vec()).failing(url, 2));
        let store = store(fetcher.clone(), dir.path());

        let outcome = store.fetch(url).await;

        assert!(outcome.success());
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_failure_instead_of_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::new());
        let store = store(fetcher.clone(), dir.path());

        let outcome = store.fetch("https://cdn.example.com/v/missing.ts").await;

        assert!(!outcome.success());
        assert_eq!(outcome.segment.status, SegmentStatus::Failed);
        assert!(outcome.message.contains("missing.ts"));
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn missing_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(Arc::new(FakeFetcher::new()), dir.path());
        let result = store.fetch_key("https://k.example.com/enc.key").await;
        assert!(matches!(result, Err(PipelineError::Fetch { .. })));
    }

    #[tokio::test]
    async fn fetch_all_waits_for_every_segment_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let urls: Vec<String> = (0..25)
            .map(|i| format!("https://cdn.example.com/v/{:04}.ts", i))
            .collect();
        let mut fake = FakeFetcher::new();
        for (i, url) in urls.iter().enumerate() {
            if i != 3 {
                fake = fake.with(url, vec![i as u8; 8]);
            }
        }
        let fetcher = Arc::new(fake);
        let store = store(fetcher.clone(), dir.path());

        let report = store.fetch_all(urls.clone(), 4, &NoopProgress).await;

        assert_eq!(report.segments.len(), 25);
        assert_eq!(report.downloaded(), 24);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.segments[3].status, SegmentStatus::Failed);
        for (segment, url) in report.segments.iter().zip(&urls) {
            assert_eq!(&segment.source_url, url);
        }
        assert!(dir.path().join("0024.ts").exists());
    }

    #[tokio::test]
    async fn fetch_all_with_no_urls_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(Arc::new(FakeFetcher::new()), dir.path());
        let report = store.fetch_all(Vec::new(), 8, &NoopProgress).await;
        assert!(report.segments.is_empty());
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path_for(Path::new("/tmp/job/0001.ts")),
            PathBuf::from("/tmp/job/0001.ts.part")
        );
    }
}
