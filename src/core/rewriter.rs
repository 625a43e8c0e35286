use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::manifest::{classify, parse_attributes, Line};
use crate::core::url_resolver::local_name;

pub const LOCAL_MANIFEST_NAME: &str = "uwu.m3u8";

static URI_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"URI=("[^"]*"|[^,]*)"#).unwrap());

/// Points every reference of `text` at files inside `workspace`.
///
/// The key URI becomes a forward-slash path (ffmpeg rejects backslashes in key
/// paths on every platform); segment lines keep only their file name and get
/// the workspace prefix with the native separator.
pub fn rewrite(text: &str, workspace: &Path) -> PipelineResult<String> {
    let workspace_str = workspace.to_string_lossy();
    let key_dir = workspace_str.replace('\\', "/");
    let seg_dir = workspace_str.trim_end_matches(['/', '\\']);

    let mut key_done = false;
    let mut references = 0usize;
    let mut out: Vec<String> = Vec::new();

    for raw in text.lines() {
        match classify(raw) {
            Line::Directive { attributes, .. } if !key_done => {
                let attrs = parse_attributes(attributes);
                match attrs.get("URI") {
                    Some(uri) if *uri != "NONE" => {
                        let local = format!("URI=\"{}/{}\"", key_dir.trim_end_matches('/'), local_name(uri));
                        out.push(URI_ATTR_RE.replacen(raw, 1, NoExpand(&local)).into_owned());
                        key_done = true;
                    }
                    _ => out.push(raw.to_string()),
                }
            }
            Line::Reference(reference) => {
                references += 1;
                out.push(format!("{}{}{}", seg_dir, MAIN_SEPARATOR, local_name(reference)));
            }
            _ => out.push(raw.to_string()),
        }
    }

    if references == 0 {
        return Err(PipelineError::Rewrite("manifest has no segment references".into()));
    }

    let mut rewritten = out.join("\n");
    if text.ends_with('\n') {
        rewritten.push('\n');
    }
    Ok(rewritten)
}

/// Writes the rewritten manifest next to the segments and returns its path.
pub async fn write_local_manifest(text: &str, workspace: &Path) -> PipelineResult<PathBuf> {
    let rewritten = rewrite(text, workspace)?;
    let path = workspace.join(LOCAL_MANIFEST_NAME);
    tokio::fs::write(&path, rewritten)
        .await
        .map_err(|e| PipelineError::Rewrite(format!("cannot write {}: {}", path.display(), e)))?;
    Ok(path)
}
