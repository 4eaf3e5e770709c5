//! Fixtures for step tests: temp workspaces and stand-in tool scripts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use linkbak_core::{StepContext, Workspace};
use linkbak_shared::{AppConfig, Metadata, RunConfig};

/// A page as Chrome would dump it after rendering.
pub const RENDERED_PAGE: &str = "<html><head><title>Rendered Title</title></head><body>\
<nav>Menu</nav><main><h1>Rendered Title</h1><p>Rendered body text for the reader.</p></main>\
<footer>Footer</footer></body></html>";

/// One link's workspace under a fresh output root.
pub struct Fixture {
    pub root: PathBuf,
    pub config: RunConfig,
    pub workspace: Workspace,
    pub link: String,
    pub metadata: Metadata,
}

impl Fixture {
    pub fn new(label: &str, link: &str) -> Self {
        let root = std::env::temp_dir().join(format!(
            "lb-steps-{label}-test-{}",
            uuid::Uuid::now_v7()
        ));
        let workspace = Workspace::resolve(&root, link);
        workspace.ensure().unwrap();

        let mut config = RunConfig::from(&AppConfig::default());
        config.output_root = root.clone();
        config.timeout = Duration::from_secs(10);
        config.workers = 2;

        let metadata = Metadata::base(workspace.id(), link);
        Self {
            root,
            config,
            workspace,
            link: link.to_string(),
            metadata,
        }
    }

    pub fn ctx(&self) -> StepContext<'_> {
        StepContext {
            link: &self.link,
            workspace: &self.workspace,
            metadata: &self.metadata,
            config: &self.config,
        }
    }

    pub fn artifact(&self, output: &str) -> PathBuf {
        self.workspace.artifact(output)
    }

    /// Point the tool config at shell stand-ins living under the output root.
    #[cfg(unix)]
    pub fn with_fake_tools(mut self) -> Self {
        let bin = self.root.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        self.config.tools.chrome_binary = script(&bin, "chrome", &fake_chrome());
        self.config.tools.pandoc_binary = script(&bin, "pandoc", FAKE_PANDOC);
        self.config.tools.ebook_convert_binary = script(&bin, "ebook-convert", FAKE_EBOOK_CONVERT);
        self
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// Dumps [`RENDERED_PAGE`] for `--dump-dom` and writes a stub PDF for `--print-to-pdf=`.
#[cfg(unix)]
fn fake_chrome() -> String {
    format!(
        r#"#!/bin/sh
dump=""
for arg in "$@"; do
  case "$arg" in
    --dump-dom) dump=1 ;;
    --print-to-pdf=*) printf '%%PDF-1.4 stub\n' > "${{arg#--print-to-pdf=}}" ;;
  esac
done
if [ -n "$dump" ]; then
  printf '%s' '{RENDERED_PAGE}'
fi
"#
    )
}

/// Copies the input to the path following `-o`.
#[cfg(unix)]
const FAKE_PANDOC: &str = r#"#!/bin/sh
input="$1"
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then cp "$input" "$2"; fi
  shift
done
"#;

/// `ebook-convert <input> <output>`.
#[cfg(unix)]
const FAKE_EBOOK_CONVERT: &str = r#"#!/bin/sh
cp "$1" "$2"
"#;

#[cfg(unix)]
fn script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}
