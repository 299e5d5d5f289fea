//! Retrieval of the source HTML document.
//!
//! The fetcher never retries and never passes through a body it cannot
//! treat as raw markup: JSON, images and other binary payloads are rejected.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use sitedrop_core::PipelineError;
use tracing::{debug, info};
use url::Url;

/// `User-Agent` sent on every outbound request
pub const USER_AGENT: &str = concat!("sitedrop/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("content-type '{0}' is not HTML text")]
    NotText(String),

    #[error("response body looks binary")]
    Binary,
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotText(_) | FetchError::Binary => PipelineError::NotHtml(err.to_string()),
            other => PipelineError::Fetch(other.to_string()),
        }
    }
}

/// Source of HTML for a deployment
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

/// [`Fetcher`] backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        info!(url = %url, "Fetching source HTML");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(ct) = &content_type
            && !is_text_content_type(ct)
        {
            return Err(FetchError::NotText(ct.clone()));
        }

        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let body = match &content_type {
            // Decodes using the declared charset, UTF-8 otherwise
            Some(_) => response.text().await.map_err(transport)?,
            // Without a declared type only strict UTF-8 passes
            None => {
                let bytes = response.bytes().await.map_err(transport)?;
                String::from_utf8(bytes.to_vec()).map_err(|_| FetchError::Binary)?
            }
        };

        if looks_binary(&body) {
            return Err(FetchError::Binary);
        }

        debug!(
            bytes = body.len(),
            content_type = content_type.as_deref().unwrap_or("<none>"),
            "Fetched source HTML"
        );

        Ok(body)
    }
}

/// Media types accepted as raw markup
pub fn is_text_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence.starts_with("text/") || essence == "application/xhtml+xml" || essence == "application/xml"
}

fn looks_binary(body: &str) -> bool {
    body.contains('\0')
}
