//! Shared types, error model, and configuration for linkbak.
//!
//! This crate is the foundation depended on by all other linkbak crates.
//! It provides:
//! - [`LinkbakError`]: the unified error type
//! - Domain types ([`LinkId`], [`Metadata`], [`StepRecord`], [`ContentKind`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, RunConfig, ToolsConfig, config_dir, config_file_path,
    default_workers, init_config, load_config, load_config_from,
};
pub use error::{LinkbakError, Result};
pub use types::{ContentKind, LinkId, Metadata, StepRecord, fields, format_timestamp};
