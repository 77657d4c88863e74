//! Destination path templating and filename sanitization.
//!
//! Templates recognize the placeholders `{source}`, `{artist}`, `{id}`,
//! `{safeTitle}`, `{ext}`, `{pool_name}`, and `{page_number}`. Substituted
//! values are sanitized: filename-invalid characters are stripped and
//! spaces become underscores. A `/` in the template itself introduces a
//! subdirectory under the destination directory.

use std::path::{Path, PathBuf};

use url::Url;

use crate::job::MediaRef;

/// Extension used when the source did not report one; the executor rewrites
/// it from the resolved URL before the transfer starts.
pub const UNKNOWN_EXTENSION: &str = "bin";

/// Template values that come from the enqueue call rather than the media
/// item itself.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Group label for `{pool_name}`.
    pub pool_name: Option<String>,
    /// 1-based member position for `{page_number}`.
    pub page_number: Option<u32>,
}

/// Resolves the destination file path for one media item.
#[must_use]
pub fn resolve_destination(
    media: &MediaRef,
    destination_dir: &Path,
    template: &str,
    ctx: &TemplateContext,
) -> PathBuf {
    let extension = media
        .extension
        .clone()
        .unwrap_or_else(|| UNKNOWN_EXTENSION.to_string());
    let pool_name = ctx.pool_name.as_deref().unwrap_or("");
    let page_number = ctx
        .page_number
        .map(|n| n.to_string())
        .unwrap_or_default();

    let filled = template
        .replace("{source}", &sanitize_component(&media.source))
        .replace("{artist}", &sanitize_component(&media.artist))
        .replace("{id}", &sanitize_component(&media.item_id))
        .replace("{safeTitle}", &sanitize_component(&media.title))
        .replace("{ext}", &sanitize_component(&extension))
        .replace("{pool_name}", &sanitize_component(pool_name))
        .replace("{page_number}", &page_number);

    let mut path = destination_dir.to_path_buf();
    for segment in filled.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}

/// Strips filename-invalid characters and replaces whitespace with
/// underscores.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => {}
            // Whitespace first: tab is both whitespace and a control
            // character, and must become an underscore.
            c if c.is_whitespace() => out.push('_'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.trim_matches('_').to_string()
}

/// Derives a file extension (without dot) from the last path segment of a
/// URL. Returns `None` for extension-less or implausibly long candidates.
#[must_use]
pub(crate) fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index + 1..];
    if ext.is_empty() || ext.len() > 11 {
        return None;
    }
    Some(ext.to_lowercase())
}
