use crate::utils::text::truncate_with_ellipsis;
use std::borrow::Cow;

const MAX_API_ERROR_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Token prefixes of credentials an OpenAI-compatible endpoint (or a proxy
/// in front of one) may echo back.
const PREFIX_PATTERNS: [&str; 6] = ["sk-", "sess-", "hf_", "gsk_", "AIza", "eyJ"];

/// Secret characters a prefixed token needs before it counts as a key.
const MIN_PREFIXED_SECRET_CHARS: usize = 20;

/// Markers whose following token is a credential.
const MARKER_PATTERNS: [&str; 8] = [
    "Authorization: Bearer ",
    "authorization: bearer ",
    "\"authorization\":\"Bearer ",
    "api_key=",
    "api-key: ",
    "access_token=",
    "\"api_key\":\"",
    "\"access_token\":\"",
];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

fn token_end(input: &str, from: usize) -> usize {
    input[from..]
        .char_indices()
        .find(|(_, c)| !is_secret_char(*c))
        .map_or(input.len(), |(i, _)| from + i)
}

fn scrub_after_marker(scrubbed: &mut String, marker: &str) {
    let mut search_from = 0;
    while let Some(rel) = scrubbed[search_from..].find(marker) {
        let start = search_from + rel;
        let content_start = start + marker.len();
        let end = token_end(scrubbed, content_start);

        // Bare marker with no token after it.
        if end == content_start {
            search_from = content_start;
            continue;
        }

        scrubbed.replace_range(start..end, REDACTED);
        search_from = start + REDACTED.len();
    }
}

// Prefixed tokens only count when they start a word and carry enough
// secret characters, so prose like `task-specific` survives.
fn scrub_prefixed_tokens(scrubbed: &mut String, prefix: &str) {
    let mut search_from = 0;
    while let Some(rel) = scrubbed[search_from..].find(prefix) {
        let start = search_from + rel;
        let content_start = start + prefix.len();
        let end = token_end(scrubbed, content_start);

        let starts_word = scrubbed[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_')));
        let long_enough =
            scrubbed[content_start..end].chars().count() >= MIN_PREFIXED_SECRET_CHARS;
        if !(starts_word && long_enough) {
            search_from = content_start;
            continue;
        }

        scrubbed.replace_range(start..end, REDACTED);
        search_from = start + REDACTED.len();
    }
}

/// Redact credential-looking tokens from text that may end up in an error
/// message or a log line.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    let needs_scrubbing = PREFIX_PATTERNS
        .iter()
        .chain(MARKER_PATTERNS.iter())
        .any(|pattern| input.contains(pattern));
    if !needs_scrubbing {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for marker in MARKER_PATTERNS {
        scrub_after_marker(&mut scrubbed, marker);
    }
    for prefix in PREFIX_PATTERNS {
        scrub_prefixed_tokens(&mut scrubbed, prefix);
    }
    Cow::Owned(scrubbed)
}

/// Scrub secrets, then cut to at most `max_chars` characters.
pub fn scrubbed_prefix(input: &str, max_chars: usize) -> String {
    truncate_with_ellipsis(&scrub_secret_patterns(input), max_chars)
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    scrubbed_prefix(input, MAX_API_ERROR_CHARS)
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}
