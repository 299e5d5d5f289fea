use crate::types::{Credential, NETLIFY_API_BASE};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_AUTH_TOKEN: &str = "NETLIFY_AUTH_TOKEN";
pub const ENV_SITE_ID: &str = "NETLIFY_SITE_ID";
pub const ENV_API_BASE: &str = "NETLIFY_API_BASE";
pub const ENV_STAGING_DIR: &str = "SITEDROP_STAGING_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("configuration parse error: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// The one place a request's provider token is read from.
///
/// Exactly one source is authoritative for a running server; the others
/// are ignored even when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Dedicated `netlify-auth-token` request header
    #[default]
    Header,
    /// Standard `Authorization: Bearer <token>` header
    Bearer,
    /// Server-side token from configuration or environment
    Server,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Header => f.write_str("header"),
            CredentialSource::Bearer => f.write_str("bearer"),
            CredentialSource::Server => f.write_str("server"),
        }
    }
}

impl FromStr for CredentialSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" => Ok(CredentialSource::Header),
            "bearer" => Ok(CredentialSource::Bearer),
            "server" => Ok(CredentialSource::Server),
            other => Err(format!(
                "unknown credential source '{}', expected header, bearer or server",
                other
            )),
        }
    }
}

/// Process-level configuration for the deploy service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Provider API root; only overridden for testing or proxies
    pub api_base: String,
    pub credential_source: CredentialSource,
    /// Token used when `credential_source = "server"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Default site to deploy into when a request names none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    /// Parent directory for per-request staging directories
    pub staging_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            api_base: NETLIFY_API_BASE.to_string(),
            credential_source: CredentialSource::default(),
            auth_token: None,
            site_id: None,
            staging_dir: std::env::temp_dir(),
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid with an optional TOML file, overlaid with the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            // figment skips missing files; an explicit --config must exist
            fs::metadata(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            figment = figment.merge(Toml::file(path));
        }

        let config: Self = figment.merge(env_provider()).extract()?;
        Ok(config.normalized())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a config file body (useful for testing)
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config.normalized())
    }

    /// Blank optional values read as unset
    fn normalized(mut self) -> Self {
        self.auth_token = self.auth_token.filter(|v| !v.trim().is_empty());
        self.site_id = self.site_id.filter(|v| !v.trim().is_empty());
        self
    }

    /// Check cross-field constraints before serving any request
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api = url::Url::parse(&self.api_base)
            .map_err(|e| ConfigError::Invalid(format!("api_base '{}': {}", self.api_base, e)))?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "api_base must be http or https, got '{}'",
                api.scheme()
            )));
        }

        if self.credential_source == CredentialSource::Server && self.server_credential().is_none()
        {
            return Err(ConfigError::Invalid(format!(
                "credential_source = \"server\" requires auth_token or {}",
                ENV_AUTH_TOKEN
            )));
        }

        if let Some(site_id) = &self.site_id {
            crate::resolve::check_site_id(site_id).map_err(ConfigError::Invalid)?;
        }

        Ok(())
    }

    pub fn server_credential(&self) -> Option<Credential> {
        self.auth_token.clone().and_then(Credential::new)
    }
}

/// Environment variables recognised as config overrides, keyed by field
fn env_provider() -> Env {
    Env::raw()
        .only(&[ENV_AUTH_TOKEN, ENV_SITE_ID, ENV_API_BASE, ENV_STAGING_DIR])
        .map(|key| {
            let key = key.as_str();
            if key.eq_ignore_ascii_case(ENV_AUTH_TOKEN) {
                "auth_token".into()
            } else if key.eq_ignore_ascii_case(ENV_SITE_ID) {
                "site_id".into()
            } else if key.eq_ignore_ascii_case(ENV_API_BASE) {
                "api_base".into()
            } else {
                "staging_dir".into()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn load_in(jail: &Jail, path: Option<&str>) -> Result<ServerConfig, figment::Error> {
        let path = path.map(|p| jail.directory().join(p));
        ServerConfig::load(path.as_deref()).map_err(|e| figment::Error::from(e.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.api_base, NETLIFY_API_BASE);
        assert_eq!(config.credential_source, CredentialSource::Header);
        assert!(config.site_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_file() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_parse_full_file() {
        let toml = r#"
bind = "0.0.0.0"
port = 8088
api_base = "http://localhost:9000/api/v1"
credential_source = "bearer"
site_id = "abc-123"
staging_dir = "/var/tmp/sitedrop"
        "#;

        let config = ServerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.port, 8088);
        assert_eq!(config.bind.to_string(), "0.0.0.0");
        assert_eq!(config.credential_source, CredentialSource::Bearer);
        assert_eq!(config.site_id.as_deref(), Some("abc-123"));
        assert_eq!(config.staging_dir, PathBuf::from("/var/tmp/sitedrop"));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let result = ServerConfig::from_toml_str("prot = 80");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_unknown_credential_source() {
        let result = ServerConfig::from_toml_str(r#"credential_source = "cookie""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_defaults_without_file_or_env() {
        Jail::expect_with(|jail| {
            let config = load_in(jail, None)?;
            assert_eq!(config.port, 3000);
            assert_eq!(config.api_base, NETLIFY_API_BASE);
            assert!(config.auth_token.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sitedrop.toml",
                "port = 4321\nsite_id = \"from-file\"\ncredential_source = \"server\"\n",
            )?;
            jail.set_env(ENV_SITE_ID, "from-env");
            jail.set_env(ENV_AUTH_TOKEN, "nfp_tok");
            jail.set_env(ENV_API_BASE, "http://127.0.0.1:1234");
            jail.set_env(ENV_STAGING_DIR, "/var/tmp/sitedrop");

            let config = load_in(jail, Some("sitedrop.toml"))?;
            assert_eq!(config.port, 4321);
            assert_eq!(config.credential_source, CredentialSource::Server);
            assert_eq!(config.site_id.as_deref(), Some("from-env"));
            assert_eq!(config.auth_token.as_deref(), Some("nfp_tok"));
            assert_eq!(config.api_base, "http://127.0.0.1:1234");
            assert_eq!(config.staging_dir, PathBuf::from("/var/tmp/sitedrop"));
            Ok(())
        });
    }

    #[test]
    fn test_unrelated_env_is_ignored() {
        Jail::expect_with(|jail| {
            jail.set_env("PORT", "9999");
            jail.set_env("SITE_ID", "elsewhere");
            let config = load_in(jail, None)?;
            assert_eq!(config.port, 3000);
            assert!(config.site_id.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_blank_env_reads_as_unset() {
        Jail::expect_with(|jail| {
            jail.create_file("sitedrop.toml", "site_id = \"keep\"\n")?;
            jail.set_env(ENV_SITE_ID, "  ");
            jail.set_env(ENV_AUTH_TOKEN, "");
            let config = load_in(jail, Some("sitedrop.toml"))?;
            assert!(config.site_id.is_none());
            assert!(config.auth_token.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nope.toml");
            let result = ServerConfig::load(Some(path.as_path()));
            assert!(matches!(result, Err(ConfigError::Io { .. })));
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        Jail::expect_with(|jail| {
            jail.create_file("sitedrop.toml", "prot = 80\n")?;
            let path = jail.directory().join("sitedrop.toml");
            let result = ServerConfig::load(Some(path.as_path()));
            assert!(matches!(result, Err(ConfigError::Parse(_))));
            Ok(())
        });
    }

    #[test]
    fn test_server_source_requires_token() {
        let config = ServerConfig {
            credential_source: CredentialSource::Server,
            ..ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(ENV_AUTH_TOKEN));

        let config = ServerConfig {
            credential_source: CredentialSource::Server,
            auth_token: Some("tok".into()),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_api_base() {
        let config = ServerConfig {
            api_base: "ftp://example.com".into(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            api_base: "not a url".into(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credential_source_from_str() {
        assert_eq!("Bearer".parse::<CredentialSource>(), Ok(CredentialSource::Bearer));
        assert_eq!("server".parse::<CredentialSource>(), Ok(CredentialSource::Server));
        assert!("basic".parse::<CredentialSource>().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitedrop.toml");
        fs::write(&path, "port = 4321\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 4321);

        let missing = ServerConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
