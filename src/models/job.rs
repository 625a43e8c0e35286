use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::filename::sanitize_path_component;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Hls { manifest_url: String },
    Progressive { url: String },
}

impl JobSource {
    pub fn url(&self) -> &str {
        match self {
            Self::Hls { manifest_url } => manifest_url,
            Self::Progressive { url } => url,
        }
    }
}

/// One episode to fetch. Built once by the caller and only read afterwards.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub episode_name: String,
    pub out_dir: PathBuf,
    pub parent_temp_dir: PathBuf,
    pub workspace: PathBuf,
    pub resolution: Option<String>,
    pub subtitles: Vec<SubtitleTrack>,
    pub source: JobSource,
}

impl DownloadJob {
    pub fn new(
        episode_name: &str,
        out_dir: impl Into<PathBuf>,
        parent_temp_dir: impl Into<PathBuf>,
        source: JobSource,
    ) -> Self {
        let episode_name = sanitize_path_component(episode_name);
        let parent_temp_dir = parent_temp_dir.into();
        let workspace = parent_temp_dir.join(&episode_name);
        Self {
            episode_name,
            out_dir: out_dir.into(),
            parent_temp_dir,
            workspace,
            resolution: None,
            subtitles: Vec::new(),
            source,
        }
    }

    pub fn with_subtitles(mut self, subtitles: Vec<SubtitleTrack>) -> Self {
        self.subtitles = subtitles;
        self
    }

    pub fn with_resolution(mut self, resolution: Option<String>) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn output_file_name(&self) -> String {
        format!("{}.mp4", self.episode_name)
    }

    pub fn output_path(&self) -> PathBuf {
        self.out_dir.join(self.output_file_name())
    }

    pub fn workspace_output(&self) -> PathBuf {
        self.workspace.join(self.output_file_name())
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobReport {
    pub output: PathBuf,
    pub segments_total: usize,
    pub segments_reused: usize,
    pub segments_failed: usize,
    pub subtitles_placed: usize,
}

/// Terminal result of a job as seen by batch callers.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub exit_code: i32,
    pub message: Option<String>,
    pub report: Option<JobReport>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<PipelineResult<JobReport>> for JobOutcome {
    fn from(result: PipelineResult<JobReport>) -> Self {
        match result {
            Ok(report) => Self {
                exit_code: 0,
                message: None,
                report: Some(report),
            },
            Err(e) => Self::from(e),
        }
    }
}

impl From<PipelineError> for JobOutcome {
    fn from(e: PipelineError) -> Self {
        Self {
            exit_code: e.exit_code(),
            message: Some(e.to_string()),
            report: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> DownloadJob {
        DownloadJob::new(
            "Episode 1",
            "/dl/Show",
            "/dl/Show/temp_dir",
            JobSource::Hls {
                manifest_url: "https://x.example.com/path/index.m3u8".into(),
            },
        )
    }

    #[test]
    fn paths_derive_from_episode_name() {
        let job = job();
        assert_eq!(job.output_file_name(), "Episode 1.mp4");
        assert_eq!(job.output_path(), PathBuf::from("/dl/Show/Episode 1.mp4"));
        assert_eq!(job.workspace, PathBuf::from("/dl/Show/temp_dir/Episode 1"));
        assert_eq!(
            job.workspace_output(),
            PathBuf::from("/dl/Show/temp_dir/Episode 1/Episode 1.mp4")
        );
    }

    #[test]
    fn episode_name_is_sanitized() {
        let job = DownloadJob::new(
            "Ep 2: The/Return",
            "/o",
            "/t",
            JobSource::Progressive { url: "https://x/v.mp4".into() },
        );
        assert!(!job.episode_name.contains('/'));
        assert!(!job.episode_name.contains(':'));
        assert_eq!(job.workspace.parent(), Some(Path::new("/t")));
    }

    #[test]
    fn outcome_from_error_carries_exit_code() {
        let outcome = JobOutcome::from(PipelineError::UnsupportedStream("iv".into()));
        assert!(!outcome.is_success());
        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.message.unwrap().contains("iv"));
    }

    #[test]
    fn outcome_from_report_is_success() {
        let outcome = JobOutcome::from(PipelineResult::Ok(JobReport::default()));
        assert!(outcome.is_success());
        assert!(outcome.report.is_some());
    }
}
