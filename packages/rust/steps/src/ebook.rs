//! E-book conversions of the readable document: `epub` (pandoc) and `mobi`
//! (calibre's `ebook-convert`).

use std::ffi::OsString;

use async_trait::async_trait;

use linkbak_core::{Requirement, Step, StepContext, StepError};
use linkbak_shared::{Metadata, fields};

use crate::tools::{produce_with, staging_path};
use crate::{names, readable};

pub(crate) const EPUB_OUTPUT: &str = "readable.epub";
pub(crate) const MOBI_OUTPUT: &str = "readable.mobi";

pub struct EpubStep;

#[async_trait]
impl Step for EpubStep {
    fn name(&self) -> &'static str {
        names::EPUB
    }

    fn output(&self) -> &'static str {
        EPUB_OUTPUT
    }

    fn requires(&self) -> &[Requirement] {
        &[Requirement::Step(names::READABLE)]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        let input = ctx.require_input(readable::OUTPUT)?;
        let target = ctx.artifact(EPUB_OUTPUT);
        let staging = staging_path(&target);
        let title = ctx.metadata.get_str(fields::TITLE).unwrap_or(ctx.link);

        let args: Vec<OsString> = vec![
            input.into(),
            "--from=html".into(),
            "--to=epub".into(),
            "--metadata".into(),
            format!("title={title}").into(),
            "-o".into(),
            staging.clone().into(),
        ];

        produce_with(
            &ctx.config.tools.pandoc_binary,
            args,
            &staging,
            &target,
            ctx.config.timeout,
        )
        .await?;
        Ok(Metadata::new())
    }
}

pub struct MobiStep;

#[async_trait]
impl Step for MobiStep {
    fn name(&self) -> &'static str {
        names::MOBI
    }

    fn output(&self) -> &'static str {
        MOBI_OUTPUT
    }

    fn requires(&self) -> &[Requirement] {
        &[Requirement::Step(names::EPUB)]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        let input = ctx.require_input(EPUB_OUTPUT)?;
        let target = ctx.artifact(MOBI_OUTPUT);
        let staging = staging_path(&target);

        produce_with(
            &ctx.config.tools.ebook_convert_binary,
            vec![input.into(), staging.clone().into()],
            &staging,
            &target,
            ctx.config.timeout,
        )
        .await?;
        Ok(Metadata::new())
    }
}
