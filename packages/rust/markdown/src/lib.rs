//! HTML-to-Markdown conversion for archived articles.
//!
//! Takes the readable HTML extracted for a link, converts it with `htmd`,
//! runs the cleanup passes, and prepends YAML front matter identifying the
//! archived link.

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use linkbak_shared::{LinkbakError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of converting an archived page to Markdown.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// Front matter followed by the cleaned Markdown body.
    pub markdown: String,
    /// Title used in the front matter.
    pub title: String,
    /// Approximate word count of the body, code blocks excluded.
    pub word_count: usize,
}

/// Options for [`convert`].
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// The archived link. Also the base for resolving relative links.
    pub link: String,
    /// Link hash identifying the archive entry.
    pub id: String,
    /// Title override; otherwise the first H1, then the document `<title>`.
    pub title: Option<String>,
    /// RFC 3339 timestamp for the `archived_at` front matter field.
    pub archived_at: Option<String>,
}

const SKIPPED_TAGS: [&str; 8] = [
    "script", "style", "nav", "iframe", "noscript", "svg", "form", "button",
];

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert an HTML document to Markdown with front matter.
#[instrument(skip(html), fields(link = %opts.link))]
pub fn convert(html: &str, opts: &ConvertOptions) -> Result<ConvertResult> {
    let doc = Html::parse_document(html);
    let body_html = tables_to_markdown(&content_root(&doc, html));

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();
    let raw = converter
        .convert(&body_html)
        .map_err(|e| LinkbakError::Conversion(format!("htmd conversion failed: {e}")))?;

    let base = Url::parse(&opts.link).ok();
    let body = cleanup::Cleanup::new(base).apply(&raw);

    let title = opts
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| first_heading(&body))
        .or_else(|| document_title(&doc))
        .unwrap_or_else(|| "Untitled".to_string());

    let word_count = count_words(&body);
    let markdown = format!("{}\n{body}", front_matter(opts, &title));

    debug!(%title, word_count, len = markdown.len(), "converted to markdown");

    Ok(ConvertResult {
        markdown,
        title,
        word_count,
    })
}

// ---------------------------------------------------------------------------
// Document helpers
// ---------------------------------------------------------------------------

/// Inner HTML of the most specific content container.
fn content_root(doc: &Html, fallback: &str) -> String {
    static CANDIDATES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
        ["article", "main", "[role=\"main\"]", "body"]
            .iter()
            .map(|s| Selector::parse(s).expect("valid selector"))
            .collect()
    });

    CANDIDATES
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .map(|el| el.inner_html())
        .unwrap_or_else(|| fallback.to_string())
}

fn document_title(doc: &Html) -> Option<String> {
    static TITLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("title").expect("valid selector"));

    doc.select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn first_heading(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

/// Words outside fenced code blocks.
pub fn count_words(md: &str) -> usize {
    static FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    FENCE_RE
        .replace_all(md, "")
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

/// The Markdown body of a converted document, front matter removed.
pub fn strip_front_matter(md: &str) -> &str {
    md.strip_prefix("---\n")
        .and_then(|rest| rest.split_once("\n---\n"))
        .map(|(_, body)| body)
        .unwrap_or(md)
}

fn front_matter(opts: &ConvertOptions, title: &str) -> String {
    let mut fm = String::from("---\n");
    fm.push_str(&format!("link: \"{}\"\n", yaml_escape(&opts.link)));
    if !opts.id.is_empty() {
        fm.push_str(&format!("id: \"{}\"\n", opts.id));
    }
    fm.push_str(&format!("title: \"{}\"\n", yaml_escape(title)));
    if let Some(ts) = &opts.archived_at {
        fm.push_str(&format!("archived_at: \"{ts}\"\n"));
    }
    fm.push_str("---\n");
    fm
}

/// Double-quoted YAML scalar body, folded onto a single line.
fn yaml_escape(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Replace each `<table>` with a pipe table; `htmd` drops table structure.
fn tables_to_markdown(html: &str) -> String {
    static TABLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("table").expect("valid selector"));

    let fragment = Html::parse_fragment(html);
    let mut out = html.to_string();
    for table in fragment.select(&TABLE) {
        out = out.replacen(&table.html(), &pipe_table(&table), 1);
    }
    out
}

fn pipe_table(table: &ElementRef) -> String {
    static ROW: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
    static CELL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));

    let rows: Vec<Vec<String>> = table
        .select(&ROW)
        .map(|tr| {
            tr.select(&CELL)
                .map(|cell| {
                    let text = cell.text().collect::<Vec<_>>().join(" ");
                    text.split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ")
                        .replace('|', "\\|")
                })
                .collect()
        })
        .filter(|row: &Vec<String>| !row.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let line = |cells: &[String]| {
        let mut padded = cells.to_vec();
        padded.resize(width, String::new());
        format!("| {} |\n", padded.join(" | "))
    };

    let mut md = String::from("\n\n");
    md.push_str(&line(&rows[0]));
    md.push_str(&line(&vec!["---".to_string(); width]));
    for row in &rows[1..] {
        md.push_str(&line(row));
    }
    md.push('\n');
    md
}
