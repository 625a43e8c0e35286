use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::error::{PipelineError, PipelineResult};
use crate::models::job::SubtitleTrack;

pub async fn is_ffmpeg_available(program: &str) -> bool {
    crate::core::process::command(program)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct MuxRequest {
    pub manifest: PathBuf,
    pub subtitles: Vec<SubtitleTrack>,
    pub output: PathBuf,
    pub workspace: PathBuf,
}

#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn mux(&self, request: &MuxRequest) -> PipelineResult<()>;
}

/// Argument list for remuxing the local manifest plus subtitle inputs into
/// one file: audio and video are copied, subtitles become `mov_text`.
pub fn mux_args(manifest: &Path, subtitles: &[SubtitleTrack], output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-loglevel".into(),
        "warning".into(),
        "-allowed_extensions".into(),
        "ALL".into(),
        "-i".into(),
        manifest.to_string_lossy().into_owned(),
    ];

    for track in subtitles {
        args.extend(["-i".into(), track.url.clone()]);
    }

    if !subtitles.is_empty() {
        args.extend(["-map", "0:v", "-map", "0:a"].map(String::from));
        for i in 1..=subtitles.len() {
            args.extend(["-map".into(), i.to_string()]);
        }
    }

    for (i, track) in subtitles.iter().enumerate() {
        args.extend([format!("-metadata:s:s:{}", i), format!("title={}", track.label)]);
    }

    args.extend(
        [
            "-c:v", "copy", "-c:a", "copy", "-c:s", "mov_text", "-bsf:a", "aac_adtstoasc",
        ]
        .map(String::from),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

pub struct FfmpegMuxer {
    program: String,
}

impl FfmpegMuxer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Remuxer for FfmpegMuxer {
    async fn mux(&self, request: &MuxRequest) -> PipelineResult<()> {
        let args = mux_args(&request.manifest, &request.subtitles, &request.output);
        tracing::debug!("[mux] {} {}", self.program, args.join(" "));

        let output = crate::core::process::command(&self.program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .output()
            .await
            .map_err(|e| PipelineError::Mux {
                message: format!("failed to run {}: {}", self.program, e),
                workspace: request.workspace.clone(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(PipelineError::Mux {
                message: format!("{} exited with {}: {}", self.program, output.status, tail.join(" | ")),
                workspace: request.workspace.clone(),
            });
        }
        if !stderr.trim().is_empty() {
            tracing::warn!("[mux] {}", stderr.trim());
        }

        verify_output(request).await
    }
}

pub async fn verify_output(request: &MuxRequest) -> PipelineResult<()> {
    match tokio::fs::metadata(&request.output).await {
        Ok(m) if m.len() > 0 => Ok(()),
        _ => Err(PipelineError::Mux {
            message: format!("no output produced at {}", request.output.display()),
            workspace: request.workspace.clone(),
        }),
    }
}
