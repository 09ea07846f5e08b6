//! Utility functions shared across the crate.

use std::path::PathBuf;

/// Get the user's config directory following XDG conventions.
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Reduce an uploaded filename to a safe single path component.
///
/// Directory parts are dropped, anything outside `[A-Za-z0-9._-]` becomes `_`
/// and leading dots are stripped so the result can never be hidden or escape
/// the directory it is joined to. Returns `fallback` when nothing usable is left.
pub fn sanitize_filename(name: &str, fallback: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // A name whose stem was entirely replaced carries nothing worth keeping
    let stem = cleaned.rsplit_once('.').map_or(cleaned.as_str(), |(stem, _)| stem);
    if !stem.chars().any(|c| c.is_ascii_alphanumeric()) {
        return fallback.to_string();
    }
    cleaned
        .trim_start_matches(['.', '_'])
        .trim_end_matches('_')
        .to_string()
}

/// File stem of `name` (everything before the last dot), or `name` itself.
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}
