// Netlify deploy API client

use crate::{UploadError, Uploader};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde_json::Value;
use sitedrop_core::{Credential, DeployResult};
use tracing::{debug, info, warn};

const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Netlify API client
///
/// Holds no credential of its own: every upload carries the token resolved
/// for that request.
#[derive(Debug, Clone)]
pub struct NetlifyClient {
    client: reqwest::Client,
}

impl NetlifyClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(reqwest::Client::builder().build()?))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Uploader for NetlifyClient {
    /// POST the zip as the whole request body. Netlify processes a zip
    /// deploy inline and answers with the deploy (or site) object.
    async fn upload(
        &self,
        archive: Vec<u8>,
        endpoint: &str,
        credential: &Credential,
    ) -> Result<DeployResult, UploadError> {
        debug!(endpoint, bytes = archive.len(), "Posting archive to Netlify");

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(credential.expose())
            .header(CONTENT_TYPE, HeaderValue::from_static(ZIP_CONTENT_TYPE))
            .body(archive)
            .send()
            .await
            .map_err(|source| UploadError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|source| UploadError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let body = parse_body(&response_text);

        if !status.is_success() {
            warn!(status = status.as_u16(), response = %body, "Netlify rejected deploy");
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let result = DeployResult::from_provider_response(body);
        info!(
            status = status.as_u16(),
            link = result.public_url.as_deref().unwrap_or("<none>"),
            "Netlify accepted deploy"
        );
        Ok(result)
    }
}

/// Provider bodies are usually JSON; anything else is kept verbatim as text.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
