//! One deployment, start to finish.
//!
//! ```text
//! Idle → Resolving → Fetching → Packaging → Uploading → Succeeded
//!          └──────────┴───────────┴────────────┴──────→ Failed
//! ```
//!
//! Every run gets its own staging directory under the configured staging
//! root, removed again once the run ends whichever way it ends. Nothing is
//! retried and no state is entered twice.

use crate::{NetlifyClient, Uploader};
use sitedrop_core::{
    CredentialHeaders, DeployBody, DeployRequest, DeployResult, PipelineError, Resolver,
    ServerConfig, Stage,
};
use sitedrop_fetcher::{Fetcher, HttpFetcher, USER_AGENT};
use sitedrop_packager::ArtifactBuilder;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Idle,
    Resolving,
    Fetching,
    Packaging,
    Uploading,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed)
    }
}

/// State tracker for a single run
struct Run {
    state: PipelineState,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(next > self.state && !self.state.is_terminal());
        debug!(from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        debug_assert!(!self.state.is_terminal());
        let provider = err.provider_response().map(|v| v.to_string());
        match err.stage() {
            Stage::Validation => warn!(
                stage = %err.stage(),
                from = ?self.state,
                error = %err,
                "Deployment rejected"
            ),
            _ => error!(
                stage = %err.stage(),
                from = ?self.state,
                error = %err,
                provider_response = provider.as_deref().unwrap_or("<none>"),
                "Deployment failed"
            ),
        }
        self.state = PipelineState::Failed;
        err
    }
}

/// Deployment pipeline bound to one server configuration
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<ServerConfig>,
    fetcher: Arc<dyn Fetcher>,
    builder: ArtifactBuilder,
    uploader: Arc<dyn Uploader>,
}

impl Pipeline {
    pub fn new(
        config: ServerConfig,
        fetcher: Arc<dyn Fetcher>,
        builder: ArtifactBuilder,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
            builder,
            uploader,
        }
    }

    /// HTTP fetcher, zip packaging and the Netlify client sharing one
    /// connection pool
    pub fn from_config(config: ServerConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::new(
            config,
            Arc::new(HttpFetcher::with_client(client.clone())),
            ArtifactBuilder::default(),
            Arc::new(NetlifyClient::with_client(client)),
        ))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.config)
    }

    /// Run one deployment for the given request headers and body.
    pub async fn run(
        &self,
        headers: &CredentialHeaders,
        body: &DeployBody,
    ) -> Result<DeployResult, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("deploy", request_id = %request_id);
        self.run_inner(request_id, headers, body)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        request_id: Uuid,
        headers: &CredentialHeaders,
        body: &DeployBody,
    ) -> Result<DeployResult, PipelineError> {
        let mut run = Run::new();

        run.advance(PipelineState::Resolving);
        let request = self
            .resolver()
            .resolve(headers, body)
            .map_err(|e| run.fail(e))?;

        run.advance(PipelineState::Fetching);
        let html = self
            .fetcher
            .fetch(&request.source_url)
            .await
            .map_err(|e| run.fail(e.into()))?;

        run.advance(PipelineState::Packaging);
        let staging = self
            .create_staging(request_id)
            .await
            .map_err(|e| run.fail(e))?;

        let outcome = self
            .package_and_upload(&mut run, &request, html, staging.path())
            .await;
        remove_staging(staging).await;
        let result = outcome?;

        run.advance(PipelineState::Succeeded);
        info!(
            link = result.public_url.as_deref().unwrap_or("<none>"),
            "Deployment succeeded"
        );
        Ok(result)
    }

    async fn package_and_upload(
        &self,
        run: &mut Run,
        request: &DeployRequest,
        html: String,
        staging_dir: &Path,
    ) -> Result<DeployResult, PipelineError> {
        let artifact = self
            .builder
            .build(html, staging_dir.to_path_buf())
            .await
            .map_err(|e| run.fail(e.into()))?;

        let archive = tokio::fs::read(&artifact.archive_path).await.map_err(|e| {
            run.fail(PipelineError::Packaging(format!(
                "failed to read archive {}: {}",
                artifact.archive_path.display(),
                e
            )))
        })?;

        run.advance(PipelineState::Uploading);
        let endpoint = request.target.endpoint(&self.config.api_base);
        info!(
            endpoint = %endpoint,
            site_id = request.target.site_id().unwrap_or("<new site>"),
            bytes = archive.len(),
            "Uploading site archive"
        );

        self.uploader
            .upload(archive, &endpoint, &request.credential)
            .await
            .map_err(|e| run.fail(e.into()))
    }

    /// Isolated staging directory for one run
    async fn create_staging(&self, request_id: Uuid) -> Result<TempDir, PipelineError> {
        let root = self.config.staging_dir.clone();
        let staging = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)?;
            tempfile::Builder::new()
                .prefix(&format!("sitedrop-{}-", request_id))
                .tempdir_in(&root)
        })
        .await
        .map_err(|e| PipelineError::Packaging(format!("staging task aborted: {}", e)))?
        .map_err(|e| PipelineError::Packaging(format!("failed to create staging directory: {}", e)))?;

        debug!(path = %staging.path().display(), "Created staging directory");
        Ok(staging)
    }
}

async fn remove_staging(staging: TempDir) {
    let path = staging.path().to_path_buf();
    match tokio::task::spawn_blocking(move || staging.close()).await {
        Ok(Ok(())) => debug!(path = %path.display(), "Removed staging directory"),
        Ok(Err(e)) => warn!(path = %path.display(), error = %e, "Failed to remove staging directory"),
        Err(e) => warn!(path = %path.display(), error = %e, "Staging cleanup task aborted"),
    }
}
