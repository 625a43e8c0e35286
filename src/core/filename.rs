use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const FORBIDDEN: &[(char, char)] = &[
    ('<', '_'),
    ('>', '_'),
    (':', '-'),
    ('"', '\''),
    ('/', '_'),
    ('\\', '_'),
    ('|', '_'),
    ('?', '_'),
    ('*', '_'),
];

/// Makes an episode or series name usable as a single path component on any
/// desktop filesystem.
pub fn sanitize_path_component(name: &str) -> String {
    let name: String = name.nfc().collect();
    let name = name.replace(['\t', '\n', '\r'], " ");
    let name = WS_RE.replace_all(name.trim(), " ");

    let mut result: String = name
        .chars()
        .map(|c| {
            FORBIDDEN
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .filter(|c| !c.is_control())
        .collect();

    let trimmed_len = result.trim_end_matches([' ', '.']).len();
    result.truncate(trimmed_len);

    if result.is_empty() {
        "untitled".to_string()
    } else {
        result
    }
}

/// Folder name for a series: sanitized, with spaces turned into underscores.
pub fn series_folder_name(title: &str) -> String {
    sanitize_path_component(title).replace(' ', "_")
}
