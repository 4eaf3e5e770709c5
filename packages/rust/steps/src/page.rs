//! `html`: the raw page as served.

use async_trait::async_trait;
use reqwest::Client;

use linkbak_core::{Step, StepContext, StepError, write_atomic};
use linkbak_shared::{ContentKind, Metadata};

use crate::fetch::fetch;
use crate::names;

pub(crate) const OUTPUT: &str = "index.html";

pub struct HtmlStep {
    client: Client,
}

impl HtmlStep {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Step for HtmlStep {
    fn name(&self) -> &'static str {
        names::HTML
    }

    fn output(&self) -> &'static str {
        OUTPUT
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        ctx.require_html()?;

        let fetched = fetch(&self.client, ctx.link, ctx.config.timeout).await?;

        // Classification may have failed; check what actually came back.
        if let Some(kind) = fetched.content_type.as_deref().map(ContentKind::from_content_type)
            && kind != ContentKind::Html
        {
            return Err(StepError::not_applicable(format!(
                "content is {}, not html",
                kind.as_str()
            )));
        }

        write_atomic(&ctx.artifact(OUTPUT), &fetched.body)?;
        Ok(Metadata::new())
    }
}
