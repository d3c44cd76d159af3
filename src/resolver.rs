//! Attachment URL rewriting

use crate::models::{Config, MediaRecord};

/// Returns the CDN URL for `original_url` when its extension is on the
/// allow-list and the record carries a non-empty CDN URL; otherwise the
/// original URL. Performs no I/O.
pub fn resolve(original_url: &str, record: &MediaRecord, config: &Config) -> String {
    let allowed = extension_of(original_url)
        .map(|ext| config.allows_extension(ext))
        .unwrap_or(false);

    match record.cdn_url() {
        Some(cdn_url) if allowed => cdn_url.to_string(),
        _ => original_url.to_string(),
    }
}

/// Text after the last `.` of the final `/`-separated segment. Query strings
/// are not stripped, so `clip.mp4?v=2` yields `mp4?v=2`. A leading dot counts,
/// so the dotfile `.mp4` has extension `mp4`.
pub fn extension_of(path: &str) -> Option<&str> {
    let segment = last_segment(path);
    segment
        .rfind('.')
        .map(|idx| &segment[idx + 1..])
        .filter(|ext| !ext.is_empty())
}

/// The final segment up to its last `.`; empty for a dotfile such as `.mp4`.
pub fn stem_of(path: &str) -> &str {
    let segment = last_segment(path);
    match segment.rfind('.') {
        Some(idx) => &segment[..idx],
        None => segment,
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
