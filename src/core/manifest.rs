//! Media playlist parsing.
//!
//! Grammar the parser relies on (one item per line, `\r\n` tolerated):
//!
//! ```text
//! line      := blank | directive | reference
//! directive := "#" tag [":" attributes]
//! attribute := NAME "=" ( "\"" chars "\"" | bare )
//! reference := any other non-empty line (absolute, protocol-relative or relative URL)
//! ```
//!
//! The encryption directive is the first directive carrying a `URI=` attribute
//! whose value is not `NONE`.

use std::collections::HashMap;
use std::sync::LazyLock;

use m3u8_rs::Playlist;
use regex::Regex;

use crate::core::error::{PipelineError, PipelineResult};

static ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Z0-9-]+)=("[^"]*"|[^,]*)"#).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    Directive { tag: &'a str, attributes: &'a str },
    Reference(&'a str),
}

pub fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    match line.strip_prefix('#') {
        Some(body) => {
            let (tag, attributes) = body.split_once(':').unwrap_or((body, ""));
            Line::Directive { tag, attributes }
        }
        None => Line::Reference(line),
    }
}

pub fn parse_attributes(attributes: &str) -> HashMap<&str, &str> {
    ATTR_RE
        .captures_iter(attributes)
        .filter_map(|c| {
            let name = c.get(1)?.as_str();
            let value = c.get(2)?.as_str().trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((name, value))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    pub method: Option<String>,
    pub uri: String,
    pub iv: Option<String>,
}

/// First encryption directive in the text, if any.
pub fn find_key(text: &str) -> Option<EncryptionKey> {
    text.lines().find_map(|raw| match classify(raw) {
        Line::Directive { attributes, .. } => {
            let attrs = parse_attributes(attributes);
            let uri = *attrs.get("URI")?;
            if uri == "NONE" {
                return None;
            }
            Some(EncryptionKey {
                method: attrs.get("METHOD").map(|m| m.to_string()),
                uri: uri.to_string(),
                iv: attrs.get("IV").map(|iv| iv.to_string()),
            })
        }
        _ => None,
    })
}

pub fn has_encryption(text: &str) -> bool {
    find_key(text).is_some()
}

/// First `IV` attribute on any `EXT-X-KEY` line, not only the one
/// [`find_key`] picks.
pub fn explicit_iv(text: &str) -> Option<&str> {
    text.lines().find_map(|raw| match classify(raw) {
        Line::Directive {
            tag: "EXT-X-KEY",
            attributes,
        } => parse_attributes(attributes).get("IV").copied(),
        _ => None,
    })
}

/// Raw segment references in line order, duplicates included.
pub fn segment_references(text: &str) -> Vec<&str> {
    text.lines()
        .filter_map(|raw| match classify(raw) {
            Line::Reference(r) => Some(r),
            _ => None,
        })
        .collect()
}

/// Rejects playlist shapes the pipeline does not handle: multi-variant
/// playlists, live playlists, and init-segment maps.
pub fn check_supported(text: &str) -> PipelineResult<()> {
    let has_map = text
        .lines()
        .any(|raw| matches!(classify(raw), Line::Directive { tag: "EXT-X-MAP", .. }));
    if has_map {
        return Err(PipelineError::UnsupportedStream(
            "#EXT-X-MAP (fragmented MP4) playlists are not supported".into(),
        ));
    }

    match m3u8_rs::parse_playlist_res(text.as_bytes()) {
        Ok(Playlist::MasterPlaylist(master)) => Err(PipelineError::UnsupportedStream(format!(
            "multi-variant playlist with {} variants; a media playlist URL is required",
            master.variants.len()
        ))),
        Ok(Playlist::MediaPlaylist(media)) if !media.end_list => Err(
            PipelineError::UnsupportedStream("live playlist without #EXT-X-ENDLIST".into()),
        ),
        Ok(Playlist::MediaPlaylist(_)) => Ok(()),
        Err(e) => {
            tracing::debug!("[hls] structural parse skipped: {:?}", e);
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub text: String,
    pub key: Option<EncryptionKey>,
    pub segments: Vec<String>,
}

impl Manifest {
    pub fn parse(text: impl Into<String>) -> PipelineResult<Self> {
        let text = text.into();
        check_supported(&text)?;

        if let Some(iv) = explicit_iv(&text) {
            return Err(PipelineError::UnsupportedStream(format!(
                "encryption with explicit IV ({}) is not supported",
                iv
            )));
        }
        let key = find_key(&text);

        let segments = segment_references(&text)
            .into_iter()
            .map(str::to_string)
            .collect();
        Ok(Self { text, key, segments })
    }

    pub fn has_encryption(&self) -> bool {
        self.key.is_some()
    }

    pub fn key_uri(&self) -> Option<&str> {
        self.key.as_ref().map(|k| k.uri.as_str())
    }

    pub fn iv(&self) -> Option<&str> {
        self.key.as_ref().and_then(|k| k.iv.as_deref())
    }
}
