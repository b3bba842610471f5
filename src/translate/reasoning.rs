//! Stripping of reasoning markup (`<think>...</think>` and friends).
//!
//! Streaming deltas are filtered one at a time without carrying state between
//! them, so a tag split across two deltas (`"<thi"` + `"nk>..."`) is not
//! recognised and passes through. That is the accepted behaviour of the relay.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Tag names recognised as reasoning markup (matched case-insensitively).
pub const REASONING_TAGS: &[&str] = &["think", "thinking", "reasoning", "thought", "internal"];

static PAIRED: Lazy<Regex> = Lazy::new(|| {
    let alternatives = REASONING_TAGS
        .iter()
        .map(|tag| format!(r"<{tag}(?:\s[^>]*)?>.*?</{tag}\s*>"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?is){alternatives}")).expect("reasoning pair pattern is valid")
});

static STRAY: Lazy<Regex> = Lazy::new(|| {
    let names = REASONING_TAGS.join("|");
    Regex::new(&format!(r"(?i)</?(?:{names})(?:\s[^>]*)?\s*/?>"))
        .expect("reasoning tag pattern is valid")
});

/// Remove paired reasoning blocks and any stray tag literals, then trim.
///
/// Removal repeats until nothing matches, so text like `<thi<think>nk>` cannot
/// reassemble a tag and `filter(filter(x)) == filter(x)` holds for every input.
#[must_use]
pub fn filter(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let without_pairs = PAIRED.replace_all(&current, "");
        let cleaned = STRAY.replace_all(&without_pairs, "").into_owned();
        if cleaned == current {
            break;
        }
        current = cleaned;
    }
    current.trim().to_string()
}

/// Whether `text` contains any reasoning tag literal.
#[must_use]
pub fn contains_markup(text: &str) -> bool {
    STRAY.is_match(text)
}

/// Filter a streaming delta. Deltas without markup are returned untouched so
/// the whitespace between streamed words survives.
#[must_use]
pub fn filter_delta(text: &str) -> Cow<'_, str> {
    if contains_markup(text) {
        Cow::Owned(filter(text))
    } else {
        Cow::Borrowed(text)
    }
}
