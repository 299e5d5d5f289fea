use anyhow::{Context, Result};
use sitedrop_core::{CredentialHeaders, CredentialSource, DeployBody, ServerConfig};
use sitedrop_deployer::Pipeline;
use std::path::PathBuf;

use super::load_config;

/// Arguments for a one-shot `sitedrop deploy`
#[derive(Debug)]
pub struct DeployOptions {
    pub url: String,
    pub token: Option<String>,
    pub site_id: Option<String>,
    pub config: Option<PathBuf>,
}

/// One-shot runs always take the token from the process side
fn one_shot_config(mut config: ServerConfig, token: Option<String>) -> ServerConfig {
    if let Some(token) = token {
        config.auth_token = Some(token);
    }
    config.credential_source = CredentialSource::Server;
    config
}

/// Fetch, package and deploy a single page from the terminal
pub async fn run(options: DeployOptions) -> Result<()> {
    let config = one_shot_config(load_config(options.config.as_deref())?, options.token);
    config
        .validate()
        .context("Invalid configuration (pass --token or set NETLIFY_AUTH_TOKEN)")?;

    println!("🌍 Deploying {} to Netlify...", options.url);
    match options.site_id.as_deref().or(config.site_id.as_deref()) {
        Some(site_id) => println!("   Target site: {}", site_id),
        None => println!("   Target: new site"),
    }
    println!();

    let pipeline = Pipeline::from_config(config).context("Failed to build HTTP client")?;
    let body = DeployBody {
        url: Some(options.url),
        site_id: options.site_id,
    };

    match pipeline.run(&CredentialHeaders::default(), &body).await {
        Ok(result) => {
            println!("🎉 Deployment success!");
            match result.public_url {
                Some(link) => println!("   Live URL: {}", link),
                None => println!("   Netlify did not return a link for this deploy"),
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ {}", err.summary());
            eprintln!("{}", serde_json::to_string_pretty(&err.details())?);
            let stage = err.stage();
            Err(err).with_context(|| format!("Deployment failed at the {} stage", stage))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_uses_server_credential() {
        let config = one_shot_config(ServerConfig::default(), Some("tok".into()));
        assert_eq!(config.credential_source, CredentialSource::Server);
        assert_eq!(config.server_credential().unwrap().expose(), "tok");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_one_shot_keeps_configured_token() {
        let base = ServerConfig {
            auth_token: Some("from-env".into()),
            ..ServerConfig::default()
        };
        let config = one_shot_config(base, None);
        assert_eq!(config.server_credential().unwrap().expose(), "from-env");
    }

    #[test]
    fn test_one_shot_without_token_is_invalid() {
        let config = one_shot_config(ServerConfig::default(), None);
        assert!(config.validate().is_err());
    }
}
