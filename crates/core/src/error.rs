use crate::types::Stage;
use serde_json::{Map, Value, json};

/// Summary sent to callers for every non-validation failure
pub const FAILURE_SUMMARY: &str = "Deployment failed.";

/// Terminal failure of a deployment pipeline run.
///
/// Every variant belongs to exactly one [`Stage`]. Nothing here is retried;
/// the error ends the request it was raised in.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No usable credential in the configured source
    #[error("{0}")]
    MissingCredential(String),

    /// Malformed or missing caller input
    #[error("{0}")]
    InvalidRequest(String),

    /// Source URL could not be retrieved
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Source URL answered, but not with raw HTML
    #[error("The requested URL did not return raw HTML content. ({0})")]
    NotHtml(String),

    /// Staging directory, file write or archive creation failed
    #[error("packaging failed: {0}")]
    Packaging(String),

    /// Provider rejected the deploy or could not be reached
    #[error("upload failed: {message}")]
    Upload {
        message: String,
        provider_response: Option<Value>,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::MissingCredential(_) | PipelineError::InvalidRequest(_) => {
                Stage::Validation
            }
            PipelineError::Fetch(_) | PipelineError::NotHtml(_) => Stage::Fetch,
            PipelineError::Packaging(_) => Stage::Packaging,
            PipelineError::Upload { .. } => Stage::Upload,
        }
    }

    /// HTTP status: 400 for caller input problems, 500 for everything else.
    ///
    /// Non-HTML source content counts as caller input.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::MissingCredential(_)
            | PipelineError::InvalidRequest(_)
            | PipelineError::NotHtml(_) => 400,
            _ => 500,
        }
    }

    /// Short message for the `error` field of the response body
    pub fn summary(&self) -> String {
        match self {
            PipelineError::MissingCredential(msg) | PipelineError::InvalidRequest(msg) => {
                msg.clone()
            }
            PipelineError::NotHtml(_) => {
                "The requested URL did not return raw HTML content.".to_string()
            }
            _ => FAILURE_SUMMARY.to_string(),
        }
    }

    /// Verbatim provider payload, when the provider answered at all
    pub fn provider_response(&self) -> Option<&Value> {
        match self {
            PipelineError::Upload {
                provider_response, ..
            } => provider_response.as_ref(),
            _ => None,
        }
    }

    /// Structured `details` object: stage, message and provider payload
    pub fn details(&self) -> Value {
        let mut details = Map::new();
        details.insert("stage".into(), json!(self.stage()));
        details.insert("message".into(), json!(self.to_string()));
        if let Some(provider) = self.provider_response() {
            details.insert("provider_response".into(), provider.clone());
        }
        Value::Object(details)
    }

    /// Full JSON error body: `{ "error": ..., "details": ... }`
    pub fn to_body(&self) -> Value {
        json!({
            "error": self.summary(),
            "details": self.details(),
        })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
