use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::error::{PipelineError, PipelineResult};
use crate::models::job::DownloadJob;

static LANG_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([a-z]{2})\.srt$").unwrap());

pub const DEFAULT_LANGUAGE: &str = "en";

const LANGUAGES: &[(&str, &str)] = &[
    ("arabic", "ar"),
    ("english", "en"),
    ("hindi", "hi"),
    ("indonesia", "id"),
    ("khmer", "km"),
    ("malay", "ms"),
    ("spanish", "es"),
    ("french", "fr"),
    ("german", "de"),
    ("italian", "it"),
    ("japanese", "ja"),
    ("korean", "ko"),
    ("chinese", "zh"),
    ("russian", "ru"),
    ("vietnamese", "vi"),
    ("thai", "th"),
    ("portuguese", "pt"),
    ("turkish", "tr"),
];

/// Two-letter language code for a subtitle file name.
///
/// Tried in order: an explicit `.<cc>.srt` suffix, the first `_`-separated
/// token as a language name, any language name inside the file name. Falls
/// back to English.
pub fn detect_language(file_name: &str) -> String {
    let lower = file_name.to_lowercase();

    if let Some(caps) = LANG_SUFFIX_RE.captures(&lower) {
        return caps[1].to_string();
    }

    let prefix = lower.split('_').next().unwrap_or_default();
    if let Some((_, code)) = LANGUAGES.iter().find(|(name, _)| *name == prefix) {
        return code.to_string();
    }

    if let Some((_, code)) = LANGUAGES.iter().find(|(name, _)| lower.contains(name)) {
        return code.to_string();
    }

    tracing::debug!(
        "[organize] could not determine language for {}, defaulting to {}",
        file_name,
        DEFAULT_LANGUAGE
    );
    DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizeReport {
    pub subtitles_placed: usize,
    pub videos_placed: usize,
    pub problems: usize,
}

/// Moves the finished episode out of its workspace and tears the workspace
/// down. Files are copied and the sources deleted only after the copy
/// succeeded. Nothing here fails the job; problems are logged and counted.
pub async fn organize(job: &DownloadJob) -> OrganizeReport {
    let mut report = OrganizeReport::default();
    let workspace = job.workspace();

    if let Err(e) = tokio::fs::create_dir_all(&job.out_dir).await {
        tracing::warn!("[organize] cannot create {}: {}", job.out_dir.display(), e);
        report.problems += 1;
    }

    let mut processed: Vec<PathBuf> = Vec::new();

    for source in find_files(workspace, "srt", true).await {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let code = detect_language(&file_name);
        let dest = job.out_dir.join(format!("{}.{}.srt", job.episode_name, code));
        match tokio::fs::copy(&source, &dest).await {
            Ok(_) => {
                tracing::debug!("[organize] subtitle {} -> {}", file_name, dest.display());
                processed.push(source);
                report.subtitles_placed += 1;
            }
            Err(e) => {
                tracing::warn!("[organize] failed to place subtitle {}: {}", file_name, e);
                report.problems += 1;
            }
        }
    }

    for source in find_files(workspace, "mp4", false).await {
        let Some(name) = source.file_name() else { continue };
        let dest = job.out_dir.join(name);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            continue;
        }
        match tokio::fs::copy(&source, &dest).await {
            Ok(_) => {
                tracing::debug!("[organize] video -> {}", dest.display());
                processed.push(source);
                report.videos_placed += 1;
            }
            Err(e) => {
                tracing::warn!("[organize] failed to place video {}: {}", source.display(), e);
                report.problems += 1;
            }
        }
    }

    for path in &processed {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!("[organize] failed to remove {}: {}", path.display(), e);
            report.problems += 1;
        }
    }

    report.problems += remove_workspace(job).await;

    tracing::info!(
        "[organize] {} subtitle(s), {} video(s) placed in {}",
        report.subtitles_placed,
        report.videos_placed,
        job.out_dir.display()
    );
    report
}

/// Deletes the job's workspace, then the shared temp folder if nothing else
/// is left in it. Returns how many removals failed.
pub async fn remove_workspace(job: &DownloadJob) -> usize {
    let mut problems = 0;
    let workspace = job.workspace();

    if let Err(e) = tokio::fs::remove_dir_all(workspace).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("[organize] failed to remove workspace {}: {}", workspace.display(), e);
            problems += 1;
        }
    }

    if is_empty_dir(&job.parent_temp_dir).await {
        match tokio::fs::remove_dir(&job.parent_temp_dir).await {
            Ok(()) => tracing::debug!("[organize] removed empty {}", job.parent_temp_dir.display()),
            Err(e) => {
                tracing::warn!("[organize] failed to remove {}: {}", job.parent_temp_dir.display(), e);
                problems += 1;
            }
        }
    }
    problems
}

/// Runs [`organize`] and checks that the episode video reached its
/// destination, which is all a job needs to count as successful.
pub async fn place_output(job: &DownloadJob) -> PipelineResult<OrganizeReport> {
    let report = organize(job).await;
    let output = job.output_path();
    match tokio::fs::metadata(&output).await {
        Ok(m) if m.is_file() => Ok(report),
        Ok(_) => Err(PipelineError::io(
            &output,
            std::io::Error::other("destination is not a file"),
        )),
        Err(e) => Err(PipelineError::io(&output, e)),
    }
}

async fn find_files(root: &Path, extension: &str, recursive: bool) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("[organize] cannot read {}: {}", dir.display(), e);
                continue;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                if recursive {
                    pending.push(path);
                }
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            {
                found.push(path);
            }
        }
    }

    found.sort();
    found
}

async fn is_empty_dir(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}
