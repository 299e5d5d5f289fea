pub mod config;
pub mod error;
pub mod resolve;
pub mod types;

pub use config::{ConfigError, CredentialSource, ServerConfig};
pub use error::PipelineError;
pub use resolve::{CredentialHeaders, Resolver};
pub use types::*;
