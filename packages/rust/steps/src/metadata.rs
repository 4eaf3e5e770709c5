//! `metadata`: classify the link and establish the base record.

use std::sync::LazyLock;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use linkbak_core::{Step, StepContext, StepError, write_atomic};
use linkbak_shared::{ContentKind, LinkbakError, Metadata, fields};

use crate::fetch::fetch;
use crate::names;

pub(crate) const OUTPUT: &str = "metadata.json";

pub struct MetadataStep {
    client: Client,
}

impl MetadataStep {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Step for MetadataStep {
    fn name(&self) -> &'static str {
        names::METADATA
    }

    fn output(&self) -> &'static str {
        OUTPUT
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        let fetched = fetch(&self.client, ctx.link, ctx.config.timeout).await?;

        let kind = match fetched.content_type.as_deref() {
            Some(ct) => ContentKind::from_content_type(ct),
            None => sniff_kind(&fetched.body),
        };

        let mut delta = Metadata::base(ctx.workspace.id(), ctx.link);
        delta.insert(fields::KIND, kind.as_str());
        delta.insert(
            fields::CONTENT_TYPE,
            fetched.content_type.clone().unwrap_or_default(),
        );
        if kind == ContentKind::Html
            && let Some(title) = page_title(&fetched.text())
        {
            delta.insert(fields::TITLE, title);
        }
        delta.insert(fields::FINAL_URL, fetched.final_url.as_str());
        delta.insert(fields::HTTP_STATUS, fetched.status);

        let json = serde_json::to_vec_pretty(&delta)
            .map_err(|e| LinkbakError::parse(format!("failed to serialize metadata: {e}")))?;
        write_atomic(&ctx.artifact(OUTPUT), &json)?;

        debug!(kind = kind.as_str(), status = fetched.status, "link classified");
        Ok(delta)
    }

    fn restore(&self, ctx: &StepContext<'_>) -> Metadata {
        let path = ctx.artifact(OUTPUT);
        let parsed = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()));
        match parsed {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(path = %path.display(), %error, "cannot restore metadata");
                Metadata::new()
            }
        }
    }
}

/// Classification when the server sends no `Content-Type`.
fn sniff_kind(body: &[u8]) -> ContentKind {
    let head = String::from_utf8_lossy(&body[..body.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start();
    if head.starts_with("%pdf") {
        ContentKind::Pdf
    } else if head.starts_with("<!doctype html") || head.starts_with("<html") {
        ContentKind::Html
    } else {
        ContentKind::Other
    }
}

fn page_title(html: &str) -> Option<String> {
    static TITLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("title").expect("valid selector"));

    Html::parse_document(html)
        .select(&TITLE)
        .next()
        .map(|el| {
            el.text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|t| !t.is_empty())
}
