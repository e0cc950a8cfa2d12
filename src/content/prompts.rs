//! Prompt templates for each generation stage.

use super::outline::Section;

/// Marker the model is told to emit when it cannot write a section.
pub const REJECT_SENTINEL: &str = "---reject---";

const PERSONA: &str = "You are an experienced copywriter";

fn persona(language: &str) -> String {
    format!(
        "{PERSONA} with a perfect command of {language}. Write an original, \
         SEO-friendly article in {language} that reads as if written by a person. \
         Keep a professional, informative tone.\n\n"
    )
}

const HTML_ONLY: &str = "- Return only HTML that can be appended to an existing document.\n\
     - Do not add any instructions, notes or remarks about the answer.\n\
     - Do not repeat yourself and do not write anything about SEO.\n";

fn reject_rule() -> String {
    format!("- If you cannot write or continue the answer, reply with {REJECT_SENTINEL}\n")
}

pub fn outline(title: &str, answer_summary: &str) -> String {
    let answer = if answer_summary.trim().is_empty() {
        String::new()
    } else {
        format!("A short answer to it: {}\n", answer_summary.trim())
    };
    format!(
        "The main heading will be: {title}\n\
         {answer}\
         Based on the text above, return an object with headings and sub-headings \
         that could be used to write such an article.\n\
         Skip anything about companies, privacy policies, cookies or newsletters. \
         Do not add \"summary\" or \"continuation\" headings. Do not number the headings.\n\
         Return valid JSON in this shape:\n\n\
         {{\"mainTitle\": \"{title}\", \"subtitles\": [{{\"title\": \"Subtitle1\", \"subtitles\": [\"Subtitle1\", \"Subtitle2\"]}}]}}\n\n\
         Return everything on a single line."
    )
}

pub fn summary(outline_raw: &str, language: &str) -> String {
    format!(
        "{PERSONA} with a perfect command of {language}. Based on the text above, \
         write a summary of its most important content as if it were a new article. \
         It will be used as context for writing an article with this table of contents: {outline_raw}"
    )
}

pub fn introduction(title: &str, sections: &[Section], language: &str, min_chars: usize) -> String {
    let headings: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
    format!(
        "{persona}\
         Write a short introduction for the article titled: {title}\n\n\
         The article's sections will be: {headings:?}\n\n\
         Requirements:\n\
         - Write only the introduction; do not answer any of the sections.\n\
         - The introduction must be at least {min_chars} characters long; use several paragraphs if needed.\n\
         - Put the article title in an <h1> tag.\n\
         - Allowed tags: <p>, <ul>, <li>, <ol>, <strong>, <h1>\n\
         {HTML_ONLY}",
        persona = persona(language),
    )
}

pub fn section(section: &Section, language: &str) -> String {
    format!(
        "{persona}\
         Expand the given heading: {title}\n\n\
         Its sub-headings, which you must not answer here, are: {subs:?}\n\n\
         Requirements:\n\
         - Put the given heading in an <h2> tag.\n\
         - Allowed tags: <p>, <ul>, <li>, <ol>, <strong>, <h2>\n\
         - Keep the text tied to the main title and the previous answers; you may use the summary.\n\
         - Do not use the parent title or the sub-headings in the answer.\n\
         {HTML_ONLY}{reject}\n\
         Example structure: <h2>{title}</h2><p>...</p>",
        persona = persona(language),
        title = section.title,
        subs = section.subtitles,
        reject = reject_rule(),
    )
}

pub fn subsection(parent: &str, subtitle: &str, language: &str) -> String {
    format!(
        "{persona}\
         Expand the given heading: {subtitle}\n\n\
         It is a sub-heading of: {parent}\n\n\
         Requirements:\n\
         - Put the given heading in an <h3> tag.\n\
         - Allowed tags: <p>, <ul>, <li>, <ol>, <strong>, <h3>\n\
         - Keep the text tied to the previous answers; you may use the summary.\n\
         - Do not use the parent title in the answer.\n\
         {HTML_ONLY}{reject}\n\
         Example structure: <h3>{subtitle}</h3><p>...</p>",
        persona = persona(language),
        reject = reject_rule(),
    )
}

pub fn grammar(text: &str, language: &str) -> String {
    format!(
        "Return the corrected text directly, without any extra description.\n\
         Fix grammar, style and syntax errors in this {language} text, and fix HTML syntax. \
         Do not change the content or the HTML structure; only correct mistakes.\n\
         Text to correct:\n\n{text}"
    )
}
