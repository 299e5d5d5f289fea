//! Per-request credential and deploy target resolution.
//!
//! Pure computation over the incoming request and [`ServerConfig`]; nothing
//! here touches the network or the filesystem.

use crate::config::{CredentialSource, ServerConfig};
use crate::error::{PipelineError, Result};
use crate::types::{Credential, DeployBody, DeployRequest, DeployTarget};
use url::Url;

/// Dedicated header carrying the provider token
pub const TOKEN_HEADER: &str = "netlify-auth-token";

/// Credential-bearing header values copied out of an HTTP request
#[derive(Debug, Clone, Default)]
pub struct CredentialHeaders {
    /// Value of the `netlify-auth-token` header
    pub token: Option<String>,
    /// Value of the `Authorization` header
    pub authorization: Option<String>,
}

/// Resolves a [`DeployRequest`] according to one server configuration
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    config: &'a ServerConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a ServerConfig) -> Self {
        Self { config }
    }

    /// Read the credential from the configured source only.
    pub fn credential(&self, headers: &CredentialHeaders) -> Result<Credential> {
        let found = match self.config.credential_source {
            CredentialSource::Header => headers.token.clone().and_then(Credential::new),
            CredentialSource::Bearer => headers
                .authorization
                .as_deref()
                .and_then(parse_bearer)
                .and_then(Credential::new),
            CredentialSource::Server => self.config.server_credential(),
        };

        found.ok_or_else(|| PipelineError::MissingCredential(self.missing_credential_message()))
    }

    /// A site id in the request body wins over the configured default.
    pub fn target(&self, requested_site_id: Option<&str>) -> Result<DeployTarget> {
        let requested = requested_site_id.filter(|id| !id.trim().is_empty());
        let site_id = requested.or(self.config.site_id.as_deref());

        if let Some(id) = site_id {
            check_site_id(id.trim()).map_err(PipelineError::InvalidRequest)?;
        }

        Ok(DeployTarget::from_site_id(site_id))
    }

    /// Resolve everything, credential first so that a request without one
    /// is rejected before its body is even looked at.
    pub fn resolve(&self, headers: &CredentialHeaders, body: &DeployBody) -> Result<DeployRequest> {
        let credential = self.credential(headers)?;
        let source_url = parse_source_url(body.url.as_deref())?;
        let target = self.target(body.site_id.as_deref())?;

        Ok(DeployRequest {
            source_url,
            credential,
            target,
        })
    }

    fn missing_credential_message(&self) -> String {
        match self.config.credential_source {
            CredentialSource::Header => format!("Missing '{}' header.", TOKEN_HEADER),
            CredentialSource::Bearer => "Missing 'Authorization: Bearer <token>' header.".to_string(),
            CredentialSource::Server => "No server-side Netlify auth token configured.".to_string(),
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value
fn parse_bearer(value: &str) -> Option<String> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.contains(char::is_whitespace) {
        return None;
    }
    Some(token.to_string())
}

/// Validate the caller-supplied source URL
pub fn parse_source_url(raw: Option<&str>) -> Result<Url> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(PipelineError::InvalidRequest(
            "No 'url' provided in JSON body.".to_string(),
        ));
    }

    let url = Url::parse(raw)
        .map_err(|e| PipelineError::InvalidRequest(format!("Invalid 'url' '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::InvalidRequest(format!(
            "Unsupported 'url' scheme '{}', expected http or https.",
            url.scheme()
        )));
    }

    Ok(url)
}

/// Site ids become a URL path segment, so only allow characters that need
/// no escaping.
pub(crate) fn check_site_id(id: &str) -> std::result::Result<(), String> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(format!("Invalid site id '{}'", id))
    }
}
