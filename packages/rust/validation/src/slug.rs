//! Slug normalization.

/// Strict slug form: lowercase ASCII alphanumerics joined by single hyphens.
///
/// Every run of other characters collapses to one hyphen; leading and
/// trailing hyphens are dropped.
pub fn normalize_slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_hyphen = false;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    out
}

/// Non-empty and already in normalized form.
pub fn is_normalized_slug(slug: &str) -> bool {
    !slug.is_empty() && normalize_slug(slug) == slug
}
