//! `markdown`: the readable document as Markdown with front matter.

use async_trait::async_trait;
use chrono::Utc;

use linkbak_core::{Requirement, Step, StepContext, StepError, write_atomic};
use linkbak_markdown::{ConvertOptions, convert, count_words, strip_front_matter};
use linkbak_shared::{LinkbakError, Metadata, fields, format_timestamp};

use crate::{names, readable};

pub(crate) const OUTPUT: &str = "readable.md";

/// Metadata field holding the Markdown body's word count.
pub const WORD_COUNT: &str = "word_count";

pub struct MarkdownStep;

#[async_trait]
impl Step for MarkdownStep {
    fn name(&self) -> &'static str {
        names::MARKDOWN
    }

    fn output(&self) -> &'static str {
        OUTPUT
    }

    fn requires(&self) -> &[Requirement] {
        &[Requirement::Step(names::READABLE)]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        let input = ctx.require_input(readable::OUTPUT)?;
        let html = tokio::fs::read_to_string(&input)
            .await
            .map_err(|e| LinkbakError::io(&input, e))?;

        let opts = ConvertOptions {
            link: ctx.link.to_string(),
            id: ctx.workspace.id().to_string(),
            title: ctx.metadata.get_str(fields::TITLE).map(str::to_string),
            archived_at: Some(format_timestamp(&Utc::now())),
        };
        let result = convert(&html, &opts)?;
        write_atomic(&ctx.artifact(OUTPUT), result.markdown.as_bytes())?;

        let mut delta = Metadata::new();
        delta.insert(WORD_COUNT, result.word_count);
        Ok(delta)
    }

    fn restore(&self, ctx: &StepContext<'_>) -> Metadata {
        let mut delta = Metadata::new();
        if let Ok(md) = std::fs::read_to_string(ctx.artifact(OUTPUT)) {
            delta.insert(WORD_COUNT, count_words(strip_front_matter(&md)));
        }
        delta
    }
}
