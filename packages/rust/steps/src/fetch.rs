//! HTTP fetching for the network steps.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use linkbak_core::StepError;
use linkbak_shared::{LinkbakError, Result};

/// Maximum number of redirects to follow for an archived link.
const MAX_REDIRECTS: usize = 10;

/// User-Agent string for archive requests.
const USER_AGENT: &str = concat!("linkbak/", env!("CARGO_PKG_VERSION"));

/// A fetched response, fully buffered.
#[derive(Debug)]
pub(crate) struct Fetched {
    pub status: u16,
    /// URL after redirects.
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Fetched {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Build the HTTP client shared by the network steps.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(timeout)
        .build()
        .map_err(|e| LinkbakError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET `url`; a non-2xx status is an error.
pub(crate) async fn fetch(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> std::result::Result<Fetched, StepError> {
    debug!(%url, "fetching");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| request_error(url, e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LinkbakError::Network(format!("{url}: HTTP {status}")).into());
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response
        .bytes()
        .await
        .map_err(|e| request_error(url, e, timeout))?;

    Ok(Fetched {
        status: status.as_u16(),
        final_url,
        content_type,
        body: body.to_vec(),
    })
}

fn request_error(url: &str, e: reqwest::Error, timeout: Duration) -> StepError {
    if e.is_timeout() {
        StepError::Timeout {
            tool: format!("GET {url}"),
            after: timeout,
        }
    } else {
        LinkbakError::Network(format!("{url}: {e}")).into()
    }
}
