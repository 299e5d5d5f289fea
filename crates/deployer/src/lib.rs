// Deployment to the hosting provider: the upload client and the pipeline
// that sequences fetch, packaging and upload for one request.

pub mod netlify;
pub mod pipeline;

use async_trait::async_trait;
use serde_json::Value;
use sitedrop_core::{Credential, DeployResult, PipelineError};

pub use netlify::NetlifyClient;
pub use pipeline::{Pipeline, PipelineState};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("provider rejected the deploy with HTTP {status}")]
    Rejected { status: u16, body: Value },
}

impl From<UploadError> for PipelineError {
    fn from(err: UploadError) -> Self {
        let message = err.to_string();
        match err {
            UploadError::Transport { .. } => PipelineError::Upload {
                message,
                provider_response: None,
            },
            UploadError::Rejected { body, .. } => PipelineError::Upload {
                message,
                provider_response: Some(body),
            },
        }
    }
}

/// Sends a packaged site to the provider and waits for the deploy result
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        archive: Vec<u8>,
        endpoint: &str,
        credential: &Credential,
    ) -> Result<DeployResult, UploadError>;
}
