//! Markup sanitizing for the prepare stage.
//!
//! Captured pages routinely embed fonts, images and source maps as base64.
//! None of that helps the model and all of it eats prompt budget.

use std::sync::LazyLock;

use regex::Regex;

/// Placeholder left where a data URL payload was removed.
pub const DATA_URL_PLACEHOLDER: &str = "data:removed";
/// Placeholder left where a long base64-looking run was removed.
pub const BINARY_PLACEHOLDER: &str = "[binary]";

static DATA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:[a-zA-Z0-9.+/-]*(?:;[a-zA-Z0-9=.+-]+)*;base64,[A-Za-z0-9+/=_-]+")
        .expect("data url pattern is valid")
});
static BASE64_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{200,}={0,2}").expect("base64 pattern is valid"));
static SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script pattern is valid")
});
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern is valid"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\n]{2,}").expect("whitespace pattern is valid"));

/// Shrinks captured markup so prompts stay small.
///
/// Removes data URL payloads and long base64 runs, script bodies and HTML
/// comments, collapses whitespace runs, and caps the result at `max_chars`.
#[must_use]
pub fn sanitize_markup(raw: &str, max_chars: usize) -> String {
    let text = DATA_URL.replace_all(raw, DATA_URL_PLACEHOLDER);
    let text = BASE64_RUN.replace_all(&text, BINARY_PLACEHOLDER);
    let text = SCRIPT.replace_all(&text, "<script></script>");
    let text = COMMENT.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, |caps: &regex::Captures<'_>| {
        if caps[0].contains('\n') {
            "\n".to_string()
        } else {
            " ".to_string()
        }
    });
    truncate_at_char(text.trim(), max_chars)
}

fn truncate_at_char(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
