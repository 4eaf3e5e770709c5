//! The step catalogue: what linkbak produces for every archived link.
//!
//! | step | artifact | requires |
//! |---|---|---|
//! | `metadata` | `metadata.json` | |
//! | `html` | `index.html` | |
//! | `dom` | `index.dom` | |
//! | `pdf` | `output.pdf` | |
//! | `readable` | `readable.html` | `dom` |
//! | `epub` | `readable.epub` | `readable` |
//! | `mobi` | `readable.mobi` | `epub` |
//! | `markdown` | `readable.md` | `readable` |
//! | `readable_pdf` | `readable.pdf` | `readable`, else `html` |

mod chrome;
mod ebook;
mod extract;
mod fetch;
mod markdown;
mod metadata;
mod page;
mod readable;
mod tools;

#[cfg(test)]
mod testing;

use linkbak_core::{Step, StepRegistry};
use linkbak_shared::{Result, RunConfig};

pub use chrome::{DomStep, PdfStep, READABLE_PDF_SOURCE, ReadablePdfStep};
pub use ebook::{EpubStep, MobiStep};
pub use fetch::build_client;
pub use markdown::{MarkdownStep, WORD_COUNT};
pub use metadata::MetadataStep;
pub use page::HtmlStep;
pub use readable::ReadableStep;

/// Step names, also the bookkeeping keys in each record.
pub mod names {
    pub const METADATA: &str = "metadata";
    pub const HTML: &str = "html";
    pub const DOM: &str = "dom";
    pub const PDF: &str = "pdf";
    pub const READABLE: &str = "readable";
    pub const EPUB: &str = "epub";
    pub const MOBI: &str = "mobi";
    pub const MARKDOWN: &str = "markdown";
    pub const READABLE_PDF: &str = "readable_pdf";
}

/// Build the full, validated step registry for `config`.
pub fn catalogue(config: &RunConfig) -> Result<StepRegistry> {
    let client = build_client(config.timeout)?;

    let steps: Vec<Box<dyn Step>> = vec![
        Box::new(MetadataStep::new(client.clone())),
        Box::new(HtmlStep::new(client)),
        Box::new(DomStep),
        Box::new(PdfStep),
        Box::new(ReadableStep),
        Box::new(EpubStep),
        Box::new(MobiStep),
        Box::new(MarkdownStep),
        Box::new(ReadablePdfStep),
    ];
    StepRegistry::new(steps)
}
