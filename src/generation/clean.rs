//! Output cleaning for model responses.
//!
//! Free-tier models leak artifacts into their visible output: reasoning
//! blocks, control tokens, invisible format characters. The rules below run
//! in a fixed order; each later rule assumes the earlier ones have fired.

use std::sync::LazyLock;

use regex::Regex;

// ─── Rule patterns, in application order ─────────────────────────────────

/// 1. Reasoning blocks, `<think>...</think>`, case-insensitive, spanning
///    newlines.
static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").unwrap());

/// 2. Meta-reasoning preamble at the very start of the reply, up to the
///    first blank line. Bounded lookahead so a legitimate "Okay, ..." answer
///    without a blank line survives.
static META_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(?:Alright|Okay|Ok|Hmm|Firstly|First of all)[\s\S]{0,500}?\n\n").unwrap()
});

/// 3. Pipe-delimited control tokens, `<|...|>`, including the fullwidth
///    `｜` variant some tokenizers emit.
static PIPE_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[|｜].*?[|｜]>").unwrap());

/// 4. Any residual angle-bracket tag.
static ANGLE_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<.*?>").unwrap());

/// 5. Unicode format characters (zero-width spaces, BOMs, direction marks).
static FORMAT_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Cf}").unwrap());

/// Strip model artifacts from `text`.
///
/// Newlines inside the body are preserved so markdown structure survives;
/// only leading and trailing whitespace is trimmed.
pub fn clean_model_text(text: &str) -> String {
    let text = THINK_BLOCK.replace_all(text, "");
    let text = META_PREAMBLE.replace(text.trim(), "");
    let text = PIPE_TOKENS.replace_all(&text, "");
    let text = ANGLE_TAGS.replace_all(&text, "");
    let text = FORMAT_CHARS.replace_all(&text, "");
    text.trim().to_string()
}
