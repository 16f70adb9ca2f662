//! Website URL validation and normalization.
//!
//! Users type bare domains as often as full URLs, so the scheme is optional
//! on input and `https` is assumed when absent.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Optional http(s) scheme, one or more DNS labels, an alphabetic TLD, an
/// optional port and an optional path/query/fragment without whitespace.
const WEBSITE_PATTERN: &str = r"^(?:https?://)?(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}(?::\d{1,5})?(?:[/?#]\S*)?$";

static WEBSITE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(WEBSITE_PATTERN).expect("valid regex"));

/// Returns `true` if `input` looks like a website address.
pub fn is_valid_website_url(input: &str) -> bool {
    let trimmed = input.trim();
    !trimmed.is_empty() && WEBSITE_RE.is_match(&trimmed.to_ascii_lowercase())
}

/// Validate `input` and return its canonical form.
///
/// The scheme and host are lowercased, `https://` is added when no scheme
/// was given and trailing slashes are dropped. Paths keep their case.
pub fn normalize_website_url(input: &str) -> Result<String, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Website URL is required".to_string()));
    }

    let lower = trimmed.to_ascii_lowercase();
    if !WEBSITE_RE.is_match(&lower) {
        return Err(CoreError::Validation(format!(
            "'{trimmed}' is not a valid website URL"
        )));
    }

    let (scheme, rest) = if lower.starts_with("https://") {
        ("https", &trimmed["https://".len()..])
    } else if lower.starts_with("http://") {
        ("http", &trimmed["http://".len()..])
    } else {
        ("https", trimmed)
    };

    let host_end = rest
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let host = rest[..host_end].to_ascii_lowercase();
    let tail = rest[host_end..].trim_end_matches('/');

    Ok(format!("{scheme}://{host}{tail}"))
}
