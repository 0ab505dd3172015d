//! Filename canonicalisation shared by the registry and the orchestrator.
//!
//! The three stores record documents differently: the cache holds full
//! paths, the processed directory holds bare filenames, and the knowledge
//! base stores whatever path the pipeline was handed (sometimes with
//! Windows separators). Everything is reduced to a basename before being
//! compared.

/// Reduce a path-like string to its final component.
///
/// Both `/` and `\` are treated as separators regardless of platform.
/// Case is preserved.
pub fn canonical_name(raw: &str) -> &str {
    match raw.rfind(['/', '\\']) {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    }
}

/// Whether a canonical name may appear in a registry listing.
///
/// Empty names, single-character names, and hidden files are dropped.
pub fn is_listable(name: &str) -> bool {
    name.chars().count() > 1 && !name.starts_with('.')
}

/// Canonicalise `raw` and return it only if it is listable.
pub fn listable_name(raw: &str) -> Option<String> {
    let name = canonical_name(raw);
    is_listable(name).then(|| name.to_string())
}
