//! Cleanup passes applied to `htmd` output.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

/// Ordered cleanup passes, parameterised by the document's base URL.
pub(crate) struct Cleanup {
    base: Option<Url>,
}

impl Cleanup {
    pub(crate) fn new(base: Option<Url>) -> Self {
        Self { base }
    }

    pub(crate) fn apply(&self, md: &str) -> String {
        let md = md.replace('\u{a0}', " ");
        let md = outside_fences(&md, |line| {
            let line = strip_wrapper_tags(line);
            let line = drop_empty_links(&line);
            self.resolve_links(&line)
        });
        let md = demote_extra_h1(&md);
        let md = fix_fence_languages(&md);
        let md = collapse_blank_lines(&md);
        finish(&md)
    }

    /// Resolve relative `[text](href)` targets; images and anchors are kept.
    fn resolve_links(&self, line: &str) -> String {
        static LINK_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

        let Some(base) = &self.base else {
            return line.to_string();
        };

        LINK_RE
            .replace_all(line, |caps: &Captures| {
                let href = &caps[3];
                let is_absolute = href.starts_with('#')
                    || href.contains("://")
                    || href.starts_with("mailto:")
                    || href.starts_with("data:");
                if !caps[1].is_empty() || is_absolute {
                    return caps[0].to_string();
                }
                match base.join(href) {
                    Ok(resolved) => format!("[{}]({resolved})", &caps[2]),
                    Err(_) => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Apply `f` to each line that is not inside a fenced code block.
fn outside_fences(md: &str, f: impl Fn(&str) -> String) -> String {
    let mut in_fence = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                line.to_string()
            } else if in_fence {
                line.to_string()
            } else {
                f(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove structural tags `htmd` passes through, keeping their text.
fn strip_wrapper_tags(line: &str) -> String {
    static WRAPPER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|picture|source)(?:\s[^>]*)?/?>",
        )
        .expect("valid regex")
    });

    WRAPPER_RE.replace_all(line, "").into_owned()
}

/// Icon-only anchors leave `[](...)` behind.
fn drop_empty_links(line: &str) -> String {
    static EMPTY_LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?:^|[^!])\[\s*\]\([^)]*\)").expect("valid regex"));

    EMPTY_LINK_RE
        .replace_all(line, |caps: &Captures| {
            caps[0]
                .chars()
                .next()
                .filter(|c| *c != '[')
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned()
}

/// Keep the first H1; later ones become H2.
fn demote_extra_h1(md: &str) -> String {
    let mut in_fence = false;
    let mut seen_h1 = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            } else if !in_fence && line.starts_with("# ") {
                if seen_h1 {
                    return format!("#{line}");
                }
                seen_h1 = true;
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `language-js`, `lang-js`, `highlight-js` fence hints become `js`.
fn fix_fence_languages(md: &str) -> String {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-|highlight-)([\w+-]+)").expect("valid regex")
    });

    FENCE_RE.replace_all(md, "```$1").into_owned()
}

/// At most one blank line between blocks.
fn collapse_blank_lines(md: &str) -> String {
    static BLANKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));

    BLANKS_RE.replace_all(md, "\n\n").into_owned()
}

/// Trim trailing whitespace per line and end with exactly one newline.
fn finish(md: &str) -> String {
    let body = md
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n", body.trim_matches('\n'))
}
