use std::collections::HashSet;

/// Resolves a manifest reference against the manifest URL.
///
/// References that already carry a scheme are returned untouched,
/// protocol-relative ones get `https:`, everything else is joined onto the
/// manifest's directory.
pub fn resolve_url(manifest_url: &str, reference: &str) -> String {
    if has_scheme(reference) {
        return reference.to_string();
    }
    if let Some(rest) = reference.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    format!("{}/{}", manifest_dir(manifest_url), reference)
}

fn has_scheme(reference: &str) -> bool {
    url::Url::parse(reference)
        .map(|u| !u.cannot_be_a_base())
        .unwrap_or(false)
}

/// Everything before the last `/` of the manifest URL path. A query string on
/// the manifest URL is not part of the directory.
pub fn manifest_dir(manifest_url: &str) -> &str {
    let path = manifest_url
        .split_once('?')
        .map(|(p, _)| p)
        .unwrap_or(manifest_url);
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// File name a reference is stored under inside a workspace: the final path
/// component without query or fragment, made safe for the host filesystem.
pub fn local_name(reference: &str) -> String {
    let without_fragment = reference.split('#').next().unwrap_or(reference);
    let path = without_fragment.split('?').next().unwrap_or(without_fragment);
    let last = path.rsplit('/').next().unwrap_or(path);
    let name = sanitize_filename::sanitize(last);
    if name.is_empty() {
        "segment".to_string()
    } else {
        name
    }
}

/// Drops repeated URLs and URLs whose local name is already taken, keeping the
/// first occurrence of each.
pub fn dedup_by_local_name(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen_urls = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut out = Vec::new();
    for url in urls {
        if !seen_urls.insert(url.clone()) {
            continue;
        }
        let name = local_name(&url);
        if !seen_names.insert(name.clone()) {
            tracing::warn!("[hls] {} collides with an earlier segment named {}, skipping", url, name);
            continue;
        }
        out.push(url);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_url_absolute_passthrough() {
        assert_eq!(
            resolve_url(
                "https://cdn.example.com/path/master.m3u8",
                "https://other.com/video.ts"
            ),
            "https://other.com/video.ts"
        );
    }

    #[test]
    fn resolve_url_absolute_is_idempotent() {
        let base = "https://x.example.com/path/index.m3u8";
        let once = resolve_url(base, "http://a.example.com/s/1.ts");
        assert_eq!(resolve_url(base, &once), once);
    }

    #[test]
    fn resolve_url_protocol_relative() {
        assert_eq!(
            resolve_url("http://anything.example/x/y.m3u8", "//cdn.example.com/a.ts"),
            "https://cdn.example.com/a.ts"
        );
    }

    #[test]
    fn resolve_url_relative() {
        assert_eq!(
            resolve_url("https://x.example.com/path/index.m3u8", "seg/0001.ts"),
            "https://x.example.com/path/seg/0001.ts"
        );
    }

    #[test]
    fn resolve_url_ignores_manifest_query() {
        assert_eq!(
            resolve_url("https://cdn.example.com/path/index.m3u8?token=abc", "0.ts"),
            "https://cdn.example.com/path/0.ts"
        );
    }

    #[test]
    fn local_name_strips_query_and_dirs() {
        assert_eq!(local_name("https://cdn.example.com/a/b/seg-7.ts?sig=1"), "seg-7.ts");
        assert_eq!(local_name("seg/0001.ts"), "0001.ts");
        assert_eq!(local_name("0002.ts#t=3"), "0002.ts");
    }

    #[test]
    fn local_name_never_empty() {
        assert_eq!(local_name("https://cdn.example.com/dir/"), "segment");
    }

    #[test]
    fn dedup_collapses_repeats_and_keeps_order() {
        let urls = vec![
            "https://c/a/1.ts".to_string(),
            "https://c/a/2.ts".to_string(),
            "https://c/a/1.ts".to_string(),
            "https://c/a/3.ts".to_string(),
        ];
        assert_eq!(
            dedup_by_local_name(urls),
            vec!["https://c/a/1.ts", "https://c/a/2.ts", "https://c/a/3.ts"]
        );
    }

    #[test]
    fn dedup_drops_local_name_collisions() {
        let urls = vec!["https://c/a/1.ts".to_string(), "https://c/b/1.ts".to_string()];
        assert_eq!(dedup_by_local_name(urls), vec!["https://c/a/1.ts"]);
    }
}
