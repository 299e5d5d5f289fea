use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

/// Netlify REST API root
pub const NETLIFY_API_BASE: &str = "https://api.netlify.com/api/v1";

/// Message returned to callers when a deployment succeeds
pub const SUCCESS_MESSAGE: &str = "Deployment success!";

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validation,
    Fetch,
    Packaging,
    Upload,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Fetch => "fetch",
            Stage::Packaging => "packaging",
            Stage::Upload => "upload",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque provider token, forwarded as a bearer credential.
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a token as given, rejecting empty or whitespace-only values
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return None;
        }
        Some(Self(token))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Where the archive gets uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployTarget {
    /// Provision a brand new site for this deployment
    NewSite,
    /// Add a deploy to an existing site
    ExistingSite(String),
}

impl DeployTarget {
    /// Build a target from an optional site id; blank ids mean a new site
    pub fn from_site_id(site_id: Option<&str>) -> Self {
        match site_id.map(str::trim) {
            Some(id) if !id.is_empty() => DeployTarget::ExistingSite(id.to_string()),
            _ => DeployTarget::NewSite,
        }
    }

    /// Resolve the provider endpoint relative to `api_base`
    ///
    /// ```text
    /// NewSite              → {api_base}/sites
    /// ExistingSite("abc")  → {api_base}/sites/abc/deploys
    /// ```
    pub fn endpoint(&self, api_base: &str) -> String {
        let base = api_base.trim_end_matches('/');
        match self {
            DeployTarget::NewSite => format!("{}/sites", base),
            DeployTarget::ExistingSite(id) => format!("{}/sites/{}/deploys", base, id),
        }
    }

    pub fn site_id(&self) -> Option<&str> {
        match self {
            DeployTarget::NewSite => None,
            DeployTarget::ExistingSite(id) => Some(id),
        }
    }
}

/// JSON body accepted by `POST /deploy`
///
/// Fields are optional at the serde level so that a missing `url` surfaces
/// as a validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployBody {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
}

/// A fully resolved deployment request
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub source_url: Url,
    pub credential: Credential,
    pub target: DeployTarget,
}

/// Outcome of a successful upload
#[derive(Debug, Clone, Serialize)]
pub struct DeployResult {
    pub public_url: Option<String>,
    pub provider_response: Value,
}

impl DeployResult {
    /// Pick the public URL out of a provider response: `deploy_url` first,
    /// then `url`, otherwise none.
    pub fn from_provider_response(response: Value) -> Self {
        let public_url = ["deploy_url", "url"]
            .iter()
            .filter_map(|key| response.get(key).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            public_url,
            provider_response: response,
        }
    }
}

/// Success body returned by `POST /deploy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySuccess {
    pub message: String,
    pub link: Option<String>,
}

impl From<&DeployResult> for DeploySuccess {
    fn from(result: &DeployResult) -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
            link: result.public_url.clone(),
        }
    }
}
