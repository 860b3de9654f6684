//! URL extraction from raw request text.

use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

/// Characters that end a sentence around a pasted link, not the link itself.
const TRAILING_PROSE: &[char] = &['.', ',', ';', ':', '!', '?', '"', '\'', '>'];

/// Returns the first HTTP(S) URL found in `input`, if any.
///
/// The match runs to the next whitespace; trailing punctuation that belongs
/// to the surrounding prose is stripped so a link pasted mid-sentence comes
/// out clean. A closing bracket is stripped only while it has no matching
/// opener inside the URL, so a path that legitimately ends in `)` survives.
///
/// # Panics
///
/// Panics if the internal URL regex fails to compile (this is a compile-time
/// constant and will not happen in practice).
#[must_use]
pub fn extract_url(input: &str) -> Option<&str> {
    URL_RE.find(input).map(|m| trim_prose(m.as_str()))
}

/// Strips sentence punctuation from the end of a URL candidate.
fn trim_prose(mut url: &str) -> &str {
    while let Some(last) = url.chars().next_back() {
        let is_prose = match last {
            ')' => unmatched(url, '(', ')'),
            ']' => unmatched(url, '[', ']'),
            '}' => unmatched(url, '{', '}'),
            c => TRAILING_PROSE.contains(&c),
        };
        if !is_prose {
            break;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
    url
}

/// Whether the candidate ends in a `close` with no `open` left to pair it.
fn unmatched(url: &str, open: char, close: char) -> bool {
    url.matches(close).count() > url.matches(open).count()
}

/// Normalizes caller input into an effective URL.
///
/// Callers may paste a whole message containing a link; the first embedded
/// HTTP(S) URL wins. Input without any URL passes through unchanged so the
/// engine gets to produce its own error for it.
#[must_use]
pub fn normalize(input: &str) -> &str {
    extract_url(input).unwrap_or(input)
}
