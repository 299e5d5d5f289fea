mod commands;

use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use sitedrop_core::CredentialSource;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitedrop")]
#[command(version, about = "Deploy a remote HTML page to Netlify as a static site", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Run the deploy HTTP service
    ///
    /// POST /deploy with {"url": "https://..."} and, depending on
    /// --credential-source, the Netlify token in:
    ///   header  'netlify-auth-token: <token>' (default)
    ///   bearer  'Authorization: Bearer <token>'
    ///   server  NETLIFY_AUTH_TOKEN / auth_token in the config file
    ///
    /// Requests deploy into NETLIFY_SITE_ID (or a "site_id" in the body)
    /// when set, otherwise every deploy creates a new site.
    Serve {
        /// Path to TOML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Port to listen on [default: 3000]
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind [default: 127.0.0.1]
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Where the Netlify token is read from: header, bearer or server
        #[arg(long, value_name = "SOURCE")]
        credential_source: Option<CredentialSource>,

        /// Existing Netlify site to deploy into by default
        #[arg(long)]
        site_id: Option<String>,
    },

    /// Fetch a page and deploy it once, without starting the server
    Deploy {
        /// URL of the HTML page to publish
        url: String,

        /// Netlify personal access token
        #[arg(long, env = "NETLIFY_AUTH_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Existing Netlify site to deploy into
        #[arg(long)]
        site_id: Option<String>,

        /// Path to TOML configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "debug,hyper=info,hyper_util=info,reqwest=info"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment variables take precedence
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            bind,
            credential_source,
            site_id,
        } => {
            init_tracing(cli.verbose);
            commands::serve::run(commands::serve::ServeOptions {
                config,
                port,
                bind,
                credential_source,
                site_id,
            })
            .await
        }
        Command::Deploy {
            url,
            token,
            site_id,
            config,
        } => {
            init_tracing(cli.verbose);
            commands::deploy::run(commands::deploy::DeployOptions {
                url,
                token,
                site_id,
                config,
            })
            .await
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sitedrop", &mut io::stdout());
            Ok(())
        }
    }
}
