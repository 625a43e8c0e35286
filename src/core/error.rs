use std::path::PathBuf;

use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("unsupported stream: {0}")]
    UnsupportedStream(String),

    #[error("manifest rewrite failed: {0}")]
    Rewrite(String),

    #[error("mux failed: {message} (workspace kept at {})", workspace.display())]
    Mux { message: String, workspace: PathBuf },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn fetch(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Fetch { .. } => 2,
            Self::UnsupportedStream(_) => 3,
            Self::Rewrite(_) => 4,
            Self::Mux { .. } => 5,
            Self::Io { .. } => 6,
            Self::Cancelled => 130,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let errors = [
            PipelineError::fetch("u", "boom"),
            PipelineError::UnsupportedStream("iv".into()),
            PipelineError::Rewrite("empty".into()),
            PipelineError::Mux {
                message: "exit 1".into(),
                workspace: PathBuf::from("/tmp/w"),
            },
            PipelineError::io("/tmp/x", std::io::Error::other("disk")),
            PipelineError::Cancelled,
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn mux_message_mentions_workspace() {
        let err = PipelineError::Mux {
            message: "ffmpeg exited with 1".into(),
            workspace: PathBuf::from("/tmp/job1"),
        };
        assert!(err.to_string().contains("/tmp/job1"));
    }

    #[test]
    fn only_transport_errors_retry() {
        assert!(PipelineError::fetch("u", "503").is_retryable());
        assert!(!PipelineError::UnsupportedStream("iv".into()).is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
    }
}
