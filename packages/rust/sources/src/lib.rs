//! Link sources: where the list of links to archive comes from.
//!
//! A source is either a URL or a local file. Its content is tried as a feed,
//! then as an HTML page, then as a plain list with one link per line.

mod parser;

use std::path::Path;
use std::time::Duration;

use linkbak_shared::{LinkbakError, Result};
use reqwest::Client;
use tracing::{debug, info, instrument};

pub use parser::{ParsedSource, SourceFormat, parse_feed, parse_html, parse_links, parse_list};

/// Maximum number of redirects to follow when fetching a remote source.
const MAX_REDIRECTS: usize = 10;

/// Default timeout in seconds for fetching a remote source.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// User-Agent string for source requests.
const USER_AGENT: &str = concat!("linkbak/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for loading a source.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Timeout for fetching a remote source.
    pub timeout: Duration,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Whether `source` names a remote document rather than a local file.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Load `source` and return its sorted, deduplicated links.
///
/// Fails with a validation error when the source holds no `http(s)` links.
#[instrument(skip(opts))]
pub async fn load_links(source: &str, opts: &SourceOptions) -> Result<Vec<String>> {
    let content = if is_remote(source) {
        let client = build_client(opts)?;
        fetch(&client, source).await?
    } else {
        read_file(Path::new(source)).await?
    };
    debug!(bytes = content.len(), "source loaded");

    let parsed = parse_links(&content)
        .ok_or_else(|| LinkbakError::validation(format!("no links found in {source}")))?;

    info!(format = ?parsed.format, links = parsed.links.len(), "links extracted");
    Ok(parsed.links)
}

/// Build the HTTP client used for remote sources.
fn build_client(opts: &SourceOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(opts.timeout)
        .build()
        .map_err(|e| LinkbakError::Network(format!("failed to build HTTP client: {e}")))
}

async fn fetch(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| LinkbakError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LinkbakError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| LinkbakError::Network(format!("{url}: failed to read body: {e}")))
}

async fn read_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LinkbakError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
  <item><link>https://example.com/b</link></item>
  <item><link>https://example.com/a</link></item>
  <item><link>https://example.com/a</link></item>
</channel></rss>"#;

    fn temp_file(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "lb-sources-test-{}.txt",
            uuid::Uuid::now_v7()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn loads_remote_feed() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/feed.xml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let source = format!("{}/feed.xml", server.uri());
        let links = load_links(&source, &SourceOptions::default()).await.unwrap();
        assert_eq!(links, ["https://example.com/a", "https://example.com/b"]);
    }

    #[tokio::test]
    async fn remote_error_status_is_network_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = format!("{}/missing.xml", server.uri());
        let err = load_links(&source, &SourceOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LinkbakError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn loads_local_list() {
        let path = temp_file("https://one.example.com\nnot a link\nhttps://two.example.com\n");

        let links = load_links(path.to_str().unwrap(), &SourceOptions::default())
            .await
            .unwrap();
        assert_eq!(links, ["https://one.example.com", "https://two.example.com"]);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn empty_source_is_rejected() {
        let path = temp_file("nothing useful here\n");

        let err = load_links(path.to_str().unwrap(), &SourceOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LinkbakError::Validation { .. }), "got {err:?}");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("lb-sources-missing-{}", uuid::Uuid::now_v7()));

        let err = load_links(path.to_str().unwrap(), &SourceOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LinkbakError::Io { .. }), "got {err:?}");
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote("https://example.com/feed"));
        assert!(is_remote("http://example.com"));
        assert!(!is_remote("links.txt"));
        assert!(!is_remote("/tmp/http-links.txt"));
    }
}
