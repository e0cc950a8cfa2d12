//! Duplicate heading removal for persisted article bodies.
//!
//! A repeated heading (same text, any level) is removed together with the
//! content that follows it, up to the next heading of the same or a higher
//! level. The pass repeats until every heading text is unique.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{info, instrument};

use crate::content::html::{normalize_whitespace, reading_time_minutes};
use crate::db::{self, Pool};

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<h([1-6])(?:\s[^>]*)?>(.*?)</h[1-6]\s*>").expect("valid heading regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

#[derive(Debug)]
struct Heading {
    start: usize,
    level: u8,
    text: String,
}

fn scan_headings(html: &str) -> Vec<Heading> {
    HEADING
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let level = caps.get(1)?.as_str().as_bytes().first()? - b'0';
            let inner = caps.get(2)?.as_str();
            Some(Heading {
                start: whole.start(),
                level,
                text: normalize_whitespace(&TAG.replace_all(inner, "")),
            })
        })
        .collect()
}

/// Byte span of the first duplicate heading and its content, if any.
fn first_duplicate_span(html: &str) -> Option<(usize, usize)> {
    let headings = scan_headings(html);
    let mut seen = HashSet::new();
    let idx = headings.iter().position(|h| !seen.insert(h.text.as_str()))?;
    let dup = &headings[idx];
    let end = headings[idx + 1..]
        .iter()
        .find(|h| h.level <= dup.level)
        .map(|h| h.start)
        .unwrap_or(html.len());
    Some((dup.start, end))
}

/// Remove duplicate headings and their sections. Input without duplicates is
/// returned unchanged; otherwise the result is whitespace-normalized.
pub fn remove_duplicate_headings(html: &str) -> String {
    let mut doc = normalize_whitespace(html);
    let mut removed = 0usize;
    while let Some((start, end)) = first_duplicate_span(&doc) {
        doc.replace_range(start..end, "");
        removed += 1;
    }
    if removed == 0 {
        return html.to_string();
    }
    doc.trim().to_string()
}

/// Run the duplicate-heading pass over a stored article. Returns whether the
/// body changed.
#[instrument(skip_all, fields(article_id = article_id))]
pub async fn repair_article_headings(pool: &Pool, article_id: i64) -> Result<bool> {
    let mut article = db::get_article(pool, article_id)
        .await?
        .ok_or_else(|| anyhow!("article {} not found", article_id))?;
    let repaired = remove_duplicate_headings(&article.body);
    if repaired == article.body {
        return Ok(false);
    }
    article.reading_time_minutes = Some(reading_time_minutes(&repaired));
    article.body = repaired;
    db::update_article(pool, article_id, &article).await?;
    info!("duplicate headings removed");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_duplicates_is_untouched() {
        let html = "<h2>A</h2>\n<p>one</p>  <h2>B</h2><p>two</p>";
        assert_eq!(remove_duplicate_headings(html), html);
    }

    #[test]
    fn duplicate_section_is_removed_up_to_next_peer() {
        let html = "<h2>A</h2><p>one</p><h2>B</h2><p>two</p><h2>A</h2><p>again</p><h3>A1</h3><p>x</p><h2>C</h2><p>three</p>";
        assert_eq!(
            remove_duplicate_headings(html),
            "<h2>A</h2><p>one</p><h2>B</h2><p>two</p><h2>C</h2><p>three</p>"
        );
    }

    #[test]
    fn duplicate_at_the_end_runs_to_document_end() {
        let html = "<h2>A</h2><p>one</p><h3>A</h3><p>dup</p>";
        assert_eq!(remove_duplicate_headings(html), "<h2>A</h2><p>one</p>");
    }

    #[test]
    fn nested_duplicate_stops_at_higher_level() {
        // The duplicate h3 ends where the next h2 begins.
        let html = "<h2>A</h2><h3>X</h3><p>1</p><h2>B</h2><h3>X</h3><p>2</p><h2>C</h2><p>3</p>";
        assert_eq!(
            remove_duplicate_headings(html),
            "<h2>A</h2><h3>X</h3><p>1</p><h2>B</h2><h2>C</h2><p>3</p>"
        );
    }

    #[test]
    fn heading_text_ignores_markup_and_spacing() {
        let html = "<h2 id=\"a\">Why <strong>coffee</strong></h2><p>a</p><h2>Why   coffee</h2><p>b</p>";
        assert_eq!(
            remove_duplicate_headings(html),
            "<h2 id=\"a\">Why <strong>coffee</strong></h2><p>a</p>"
        );
    }

    #[test]
    fn is_idempotent() {
        let html = "<h2>A</h2><p>1</p><h2>A</h2><p>2</p><h2>A</h2><p>3</p><h3>B</h3><h3>B</h3>";
        let once = remove_duplicate_headings(html);
        let twice = remove_duplicate_headings(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "<h2>A</h2><p>1</p>");
    }

    #[test]
    fn header_tag_is_not_a_heading() {
        let html = "<header>A</header><h2>A</h2><p>x</p>";
        assert_eq!(remove_duplicate_headings(html), html);
    }
}
