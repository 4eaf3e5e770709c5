//! Steps rendering through headless Chrome: `dom`, `pdf` and `readable_pdf`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use linkbak_core::{Requirement, Step, StepContext, StepError, write_atomic};
use linkbak_shared::{LinkbakError, Metadata, ToolsConfig};

use crate::tools::{produce_with, run_tool, staging_path};
use crate::{names, page, readable};

pub(crate) const DOM_OUTPUT: &str = "index.dom";
pub(crate) const PDF_OUTPUT: &str = "output.pdf";
pub(crate) const READABLE_PDF_OUTPUT: &str = "readable.pdf";

/// Metadata field naming the step whose artifact `readable_pdf` rendered.
pub const READABLE_PDF_SOURCE: &str = "readable_pdf_source";

/// Workspace file remembering which source the current `readable.pdf` came from.
pub(crate) const READABLE_PDF_SOURCE_FILE: &str = "readable.pdf.source";

/// Common arguments: headless mode plus the configured flags.
fn chrome_args(tools: &ToolsConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--headless".into()];
    args.extend(tools.chrome_flags.iter().map(OsString::from));
    args
}

/// `--print-to-pdf` needs an absolute path; Chrome runs with its own cwd.
fn print_to_pdf_arg(staging: &Path) -> Result<OsString, StepError> {
    let absolute = std::path::absolute(staging).map_err(|e| LinkbakError::io(staging, e))?;
    let mut arg = OsString::from("--print-to-pdf=");
    arg.push(absolute.as_os_str());
    Ok(arg)
}

async fn print_to_pdf(ctx: &StepContext<'_>, url: &str, output: &str) -> Result<(), StepError> {
    let tools = &ctx.config.tools;
    let target = ctx.artifact(output);
    let staging = staging_path(&target);

    let mut args = chrome_args(tools);
    args.push(print_to_pdf_arg(&staging)?);
    args.push(url.into());

    produce_with(
        &tools.chrome_binary,
        args,
        &staging,
        &target,
        ctx.config.timeout,
    )
    .await
}

// ---------------------------------------------------------------------------
// dom
// ---------------------------------------------------------------------------

/// The page after JavaScript has run, as dumped by Chrome.
pub struct DomStep;

#[async_trait]
impl Step for DomStep {
    fn name(&self) -> &'static str {
        names::DOM
    }

    fn output(&self) -> &'static str {
        DOM_OUTPUT
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        ctx.require_html()?;

        let tools = &ctx.config.tools;
        let mut args = chrome_args(tools);
        args.push("--dump-dom".into());
        args.push(ctx.link.into());

        let dom = run_tool(&tools.chrome_binary, &args, ctx.config.timeout).await?;
        if dom.iter().all(u8::is_ascii_whitespace) {
            return Err(StepError::MissingArtifact(DOM_OUTPUT.to_string()));
        }

        write_atomic(&ctx.artifact(DOM_OUTPUT), &dom)?;
        debug!(bytes = dom.len(), "dom dumped");
        Ok(Metadata::new())
    }
}

// ---------------------------------------------------------------------------
// pdf
// ---------------------------------------------------------------------------

/// The live page printed to PDF.
pub struct PdfStep;

#[async_trait]
impl Step for PdfStep {
    fn name(&self) -> &'static str {
        names::PDF
    }

    fn output(&self) -> &'static str {
        PDF_OUTPUT
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        ctx.require_html()?;
        print_to_pdf(ctx, ctx.link, PDF_OUTPUT).await?;
        Ok(Metadata::new())
    }
}

// ---------------------------------------------------------------------------
// readable_pdf
// ---------------------------------------------------------------------------

/// A local copy of the page printed to PDF: the readable version when there
/// is one, the raw page otherwise.
pub struct ReadablePdfStep;

impl ReadablePdfStep {
    const SOURCES: [(&'static str, &'static str); 2] = [
        (names::READABLE, readable::OUTPUT),
        (names::HTML, page::OUTPUT),
    ];

    fn source(ctx: &StepContext<'_>) -> Option<(&'static str, PathBuf)> {
        Self::SOURCES
            .iter()
            .map(|(step, output)| (*step, ctx.artifact(output)))
            .find(|(_, path)| path.exists())
    }
}

#[async_trait]
impl Step for ReadablePdfStep {
    fn name(&self) -> &'static str {
        names::READABLE_PDF
    }

    fn output(&self) -> &'static str {
        READABLE_PDF_OUTPUT
    }

    fn requires(&self) -> &[Requirement] {
        &[Requirement::FirstOf(&[names::READABLE, names::HTML])]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        let (source, path) = Self::source(ctx)
            .ok_or_else(|| StepError::not_applicable("no readable or html copy to render"))?;

        let absolute = std::path::absolute(&path).map_err(|e| LinkbakError::io(&path, e))?;
        let url = Url::from_file_path(&absolute).map_err(|()| {
            LinkbakError::validation(format!("cannot build file URL for {}", absolute.display()))
        })?;

        // Written before rendering so a promoted PDF always has its source on disk.
        write_atomic(&ctx.artifact(READABLE_PDF_SOURCE_FILE), source.as_bytes())?;
        print_to_pdf(ctx, url.as_str(), READABLE_PDF_OUTPUT).await?;

        let mut delta = Metadata::new();
        delta.insert(READABLE_PDF_SOURCE, source);
        Ok(delta)
    }

    fn restore(&self, ctx: &StepContext<'_>) -> Metadata {
        let path = ctx.artifact(READABLE_PDF_SOURCE_FILE);
        let recorded = std::fs::read_to_string(&path).unwrap_or_default();

        let mut delta = Metadata::new();
        match Self::SOURCES.iter().find(|(step, _)| *step == recorded.trim()) {
            Some((source, _)) => delta.insert(READABLE_PDF_SOURCE, *source),
            None => warn!(path = %path.display(), "rendered source of readable.pdf unknown"),
        }
        delta
    }
}
