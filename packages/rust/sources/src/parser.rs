//! Link extraction from feeds, HTML pages, and plain lists.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Which parser produced the links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Feed,
    Html,
    List,
}

/// Links found in a source document.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub format: SourceFormat,
    /// Sorted, deduplicated `http(s)` links.
    pub links: Vec<String>,
}

/// Try the parsers from most to least strict; the first non-empty result wins.
pub fn parse_links(content: &str) -> Option<ParsedSource> {
    [
        (SourceFormat::Feed, parse_feed(content)),
        (SourceFormat::Html, parse_html(content)),
        (SourceFormat::List, parse_list(content)),
    ]
    .into_iter()
    .find(|(_, links)| !links.is_empty())
    .map(|(format, links)| ParsedSource {
        format,
        links: links.into_iter().collect(),
    })
}

// ---------------------------------------------------------------------------
// Feed (RSS 2.0 / RSS 1.0 / Atom)
// ---------------------------------------------------------------------------

/// Item links of an RSS or Atom feed. Empty if `content` is not a feed.
pub fn parse_feed(content: &str) -> BTreeSet<String> {
    static FEED_MARKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<(?:rss|feed|rdf:RDF)[\s>]").expect("valid regex"));
    static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<(item|entry)[\s>].*?</(?:item|entry)>").expect("valid regex")
    });
    static RSS_LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<link>\s*(.*?)\s*</link>").expect("valid regex"));
    static ATOM_LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<link\b([^>]*)/?>").expect("valid regex"));

    if !FEED_MARKER_RE.is_match(content) {
        return BTreeSet::new();
    }

    let mut links = BTreeSet::new();
    for item in ITEM_RE.find_iter(content) {
        let item = item.as_str();

        if let Some(caps) = RSS_LINK_RE.captures(item) {
            keep_http(&mut links, &decode_entities(strip_cdata(&caps[1])));
            continue;
        }

        // Atom: the alternate link, or the first link without a rel.
        let chosen = ATOM_LINK_RE
            .captures_iter(item)
            .map(|caps| caps[1].to_string())
            .filter(|attrs| matches!(attr(&REL_RE, attrs), None | Some("alternate")))
            .find_map(|attrs| attr(&HREF_RE, &attrs).map(str::to_string));
        if let Some(href) = chosen {
            keep_http(&mut links, &decode_entities(&href));
        }
    }
    links
}

static REL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\brel\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']*)["']"#).expect("valid regex"));

fn attr<'a>(re: &Regex, attrs: &'a str) -> Option<&'a str> {
    re.captures(attrs)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn strip_cdata(s: &str) -> &str {
    s.strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(s)
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// HTML and plain lists
// ---------------------------------------------------------------------------

/// Absolute `http(s)` anchors of an HTML page.
pub fn parse_html(content: &str) -> BTreeSet<String> {
    static ANCHOR: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

    let doc = Html::parse_document(content);
    let mut links = BTreeSet::new();
    for href in doc.select(&ANCHOR).filter_map(|a| a.value().attr("href")) {
        keep_http(&mut links, href);
    }
    links
}

/// Lines starting with `http`.
pub fn parse_list(content: &str) -> BTreeSet<String> {
    let mut links = BTreeSet::new();
    for line in content.lines() {
        keep_http(&mut links, line);
    }
    links
}

fn keep_http(links: &mut BTreeSet<String>, candidate: &str) {
    let candidate = candidate.trim();
    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        links.insert(candidate.to_string());
    }
}
