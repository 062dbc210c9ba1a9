//! Input sanitizer for moderation-sensitive retries.
//!
//! Some backends reject messages over embedded links, addresses or sheer
//! length. The sanitizer neutralizes the usual triggers while keeping the
//! medical content intact. It runs only on the moderation-retry and
//! last-resort paths, never on the first attempt.

use std::sync::LazyLock;

use regex::Regex;

static URLS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)https?://\S+").unwrap());

static EMAILS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const MAX_SANITIZED_CHARS: usize = 1200;

/// Replace URLs with `[link]`, emails with `[email]`, collapse whitespace
/// and cap the length.
pub fn sanitize_for_moderation(text: &str) -> String {
    let no_urls = URLS.replace_all(text, "[link]");
    let no_emails = EMAILS.replace_all(&no_urls, "[email]");
    let collapsed = WHITESPACE.replace_all(&no_emails, " ");
    let collapsed = collapsed.trim();

    if collapsed.chars().count() > MAX_SANITIZED_CHARS {
        let capped: String = collapsed.chars().take(MAX_SANITIZED_CHARS).collect();
        format!("{capped} …")
    } else {
        collapsed.to_string()
    }
}
