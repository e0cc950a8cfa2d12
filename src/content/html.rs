//! Small text/HTML helpers shared by generation and the repair pass.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static H1_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h1[^>]*>.*?</h1>").expect("valid h1 regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

const WORDS_PER_MINUTE: usize = 200;

/// Trim and collapse every whitespace run to a single space.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Remove every `<h1>` element together with its content.
pub fn strip_h1(html: &str) -> String {
    H1_ELEMENT.replace_all(html, "").into_owned()
}

/// Estimated reading time, rounded up, never below one minute.
pub fn reading_time_minutes(html: &str) -> i64 {
    let text = TAG.replace_all(html, " ");
    let words = text.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i64
}

/// URL slug: any script is transliterated to ASCII, words are joined by `-`.
pub fn slugify(text: &str) -> String {
    slug::slugify(text)
}
