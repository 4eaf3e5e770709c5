//! `readable`: main content of the rendered page as a standalone document.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};

use linkbak_core::{Requirement, Step, StepContext, StepError, write_atomic};
use linkbak_shared::{LinkbakError, Metadata, fields};

use crate::chrome::DOM_OUTPUT;
use crate::extract::extract_readable;
use crate::names;

pub(crate) const OUTPUT: &str = "readable.html";

pub struct ReadableStep;

#[async_trait]
impl Step for ReadableStep {
    fn name(&self) -> &'static str {
        names::READABLE
    }

    fn output(&self) -> &'static str {
        OUTPUT
    }

    fn requires(&self) -> &[Requirement] {
        &[Requirement::Step(names::DOM)]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        let input = ctx.require_input(DOM_OUTPUT)?;
        let dom = tokio::fs::read(&input)
            .await
            .map_err(|e| LinkbakError::io(&input, e))?;

        let readable = extract_readable(&String::from_utf8_lossy(&dom)).ok_or_else(|| {
            LinkbakError::validation(format!("no readable content in {DOM_OUTPUT}"))
        })?;
        write_atomic(&ctx.artifact(OUTPUT), readable.html.as_bytes())?;

        Ok(title_delta(readable.title))
    }

    fn restore(&self, ctx: &StepContext<'_>) -> Metadata {
        static TITLE: LazyLock<Selector> =
            LazyLock::new(|| Selector::parse("title").expect("valid selector"));

        let title = std::fs::read_to_string(ctx.artifact(OUTPUT))
            .ok()
            .and_then(|html| {
                Html::parse_document(&html)
                    .select(&TITLE)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
            })
            .filter(|t| !t.is_empty());
        title_delta(title)
    }
}

fn title_delta(title: Option<String>) -> Metadata {
    let mut delta = Metadata::new();
    if let Some(title) = title {
        delta.insert(fields::TITLE, title);
    }
    delta
}
