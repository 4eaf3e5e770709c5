//! Readable-content extraction from a rendered page.

use std::sync::LazyLock;

use scraper::{Html, Selector};

/// The main content of a page as a standalone document.
#[derive(Debug, Clone)]
pub(crate) struct Readable {
    pub title: Option<String>,
    pub html: String,
}

/// Extract the main content of `page`.
///
/// Returns `None` when no candidate container holds any text.
pub(crate) fn extract_readable(page: &str) -> Option<Readable> {
    static CANDIDATES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
        ["main", "article", r#"[role="main"]"#, ".content", "body"]
            .iter()
            .map(|s| Selector::parse(s).expect("valid selector"))
            .collect()
    });

    let doc = Html::parse_document(page);
    let content = CANDIDATES
        .iter()
        .filter_map(|sel| doc.select(sel).next())
        .find(|el| el.text().any(|t| !t.trim().is_empty()))
        .map(|el| strip_chrome(&el.inner_html()))?;

    if Html::parse_fragment(&content)
        .root_element()
        .text()
        .all(|t| t.trim().is_empty())
    {
        return None;
    }

    let title = document_title(&doc).or_else(|| first_h1(&doc));
    let html = standalone(title.as_deref(), &content);
    Some(Readable { title, html })
}

/// Strip navigation and other page chrome from an HTML fragment.
fn strip_chrome(html: &str) -> String {
    static CHROME: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "nav, header, footer, aside, script, style, noscript, iframe, form, .sidebar, .nav",
        )
        .expect("valid selector")
    });

    let doc = Html::parse_fragment(html);
    let mut result = html.to_string();
    for el in doc.select(&CHROME) {
        result = result.replace(&el.html(), "");
    }
    result
}

fn document_title(doc: &Html) -> Option<String> {
    static TITLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("head > title").expect("valid selector"));

    doc.select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn first_h1(doc: &Html) -> Option<String> {
    static H1: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("h1").expect("valid selector"));

    doc.select(&H1)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn standalone(title: Option<&str>, content: &str) -> String {
    let title = escape_text(title.unwrap_or_default());
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         </head>\n<body>\n<article>\n{content}\n</article>\n</body>\n</html>\n"
    )
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
