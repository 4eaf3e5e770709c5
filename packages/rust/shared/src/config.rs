//! Application configuration for linkbak.
//!
//! User config lives at `~/.linkbak/linkbak.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LinkbakError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "linkbak.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".linkbak";

// ---------------------------------------------------------------------------
// Config structs (matching linkbak.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// External tool locations.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory holding one workspace per link.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Timeout for each external process or network fetch, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of links processed in parallel (unset = available parallelism).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Write failure markers (`<output>.log`) for failed steps.
    #[serde(default)]
    pub diagnostics: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            timeout_secs: default_timeout_secs(),
            workers: None,
            diagnostics: false,
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Headless Chrome/Chromium binary used for DOM dumps and PDF rendering.
    #[serde(default = "default_chrome_binary")]
    pub chrome_binary: String,

    /// Extra flags passed to every Chrome invocation.
    #[serde(default = "default_chrome_flags")]
    pub chrome_flags: Vec<String>,

    /// Pandoc binary used for EPUB conversion.
    #[serde(default = "default_pandoc_binary")]
    pub pandoc_binary: String,

    /// Calibre `ebook-convert` binary used for MOBI conversion.
    #[serde(default = "default_ebook_convert_binary")]
    pub ebook_convert_binary: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            chrome_binary: default_chrome_binary(),
            chrome_flags: default_chrome_flags(),
            pandoc_binary: default_pandoc_binary(),
            ebook_convert_binary: default_ebook_convert_binary(),
        }
    }
}

fn default_chrome_binary() -> String {
    "chromium".into()
}
fn default_chrome_flags() -> Vec<String> {
    vec!["--no-sandbox".into()]
}
fn default_pandoc_binary() -> String {
    "pandoc".into()
}
fn default_ebook_convert_binary() -> String {
    "ebook-convert".into()
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration consumed by the pipeline, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory holding one workspace per link.
    pub output_root: PathBuf,
    /// Clear failure markers and re-attempt previously failed steps.
    pub force: bool,
    /// Timeout for each external process or network fetch.
    pub timeout: Duration,
    /// Maximum number of links processed concurrently.
    pub workers: usize,
    /// Persist failure markers for failed steps.
    pub diagnostics: bool,
    /// External tool locations.
    pub tools: ToolsConfig,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_root: PathBuf::from(&config.defaults.output_dir),
            force: false,
            timeout: Duration::from_secs(config.defaults.timeout_secs),
            workers: config.defaults.workers.unwrap_or_else(default_workers),
            diagnostics: config.defaults.diagnostics,
            tools: config.tools.clone(),
        }
    }
}

impl RunConfig {
    /// Reject configurations that cannot start a run.
    pub fn validate(&self) -> Result<()> {
        if self.output_root.as_os_str().is_empty() {
            return Err(LinkbakError::config("output root is not set"));
        }
        if self.output_root.is_file() {
            return Err(LinkbakError::config(format!(
                "output root {} is a file",
                self.output_root.display()
            )));
        }
        if self.workers == 0 {
            return Err(LinkbakError::config("worker count must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(LinkbakError::config("timeout must be greater than zero"));
        }
        if self.tools.chrome_binary.trim().is_empty() {
            return Err(LinkbakError::config("chrome binary is not set"));
        }
        Ok(())
    }

    /// Create the output root if it does not exist yet.
    pub fn prepare_output_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_root).map_err(|e| {
            LinkbakError::config(format!(
                "cannot create output root {}: {e}",
                self.output_root.display()
            ))
        })
    }
}

/// Default worker count: the available parallelism, or 1 if unknown.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.linkbak/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LinkbakError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.linkbak/linkbak.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LinkbakError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LinkbakError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LinkbakError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| LinkbakError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LinkbakError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("chromium"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/srv/archive"
workers = 3

[tools]
chrome_binary = "/usr/bin/google-chrome"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/srv/archive");
        assert_eq!(config.defaults.timeout_secs, 60);
        assert_eq!(config.defaults.workers, Some(3));
        assert!(!config.defaults.diagnostics);
        assert_eq!(config.tools.chrome_binary, "/usr/bin/google-chrome");
        assert_eq!(config.tools.pandoc_binary, "pandoc");
        assert_eq!(config.tools.chrome_flags, vec!["--no-sandbox".to_string()]);
    }

    #[test]
    fn run_config_from_app_config() {
        let mut app = AppConfig::default();
        app.defaults.workers = Some(2);
        app.defaults.timeout_secs = 15;

        let run = RunConfig::from(&app);
        assert_eq!(run.output_root, PathBuf::from("output"));
        assert_eq!(run.workers, 2);
        assert_eq!(run.timeout, Duration::from_secs(15));
        assert!(!run.force);
        assert!(run.validate().is_ok());
    }

    #[test]
    fn run_config_defaults_workers_to_parallelism() {
        let run = RunConfig::from(&AppConfig::default());
        assert_eq!(run.workers, default_workers());
        assert!(run.workers >= 1);
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let mut run = RunConfig::from(&AppConfig::default());
        run.workers = 0;
        let err = run.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("worker"));

        let mut run = RunConfig::from(&AppConfig::default());
        run.output_root = PathBuf::new();
        assert!(run.validate().unwrap_err().to_string().contains("output root"));
    }

    #[test]
    fn load_config_from_file() {
        let path = std::env::temp_dir().join(format!("lb-config-test-{}.toml", uuid::Uuid::now_v7()));

        std::fs::write(&path, "[defaults]\ndiagnostics = true\ntimeout_secs = 5\n").unwrap();
        let config = load_config_from(&path).unwrap();
        assert!(config.defaults.diagnostics);
        assert_eq!(config.defaults.timeout_secs, 5);

        std::fs::write(&path, "[defaults\n").unwrap();
        assert!(load_config_from(&path).unwrap_err().is_fatal());

        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            load_config_from(&path).unwrap_err(),
            LinkbakError::Io { .. }
        ));
    }

    #[test]
    fn validate_rejects_file_as_output_root() {
        let path = std::env::temp_dir().join(format!("lb-root-test-{}", uuid::Uuid::now_v7()));
        std::fs::write(&path, b"not a directory").unwrap();

        let mut run = RunConfig::from(&AppConfig::default());
        run.output_root = path.clone();
        assert!(run.validate().unwrap_err().is_fatal());

        let _ = std::fs::remove_file(&path);
    }
}
