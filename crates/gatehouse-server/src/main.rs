use std::env;

use clap::Parser;
use gatehouse_auth::AuthFlow;
use gatehouse_server::ServerBuilder;
use gatehouse_server::config::{AppConfig, DEFAULT_CONFIG_PATH, loader::load_config};

/// OpenID Connect relying party.
#[derive(Debug, Parser)]
#[command(name = "gatehouse", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From GATEHOUSE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (gatehouse.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (GATEHOUSE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // .env is optional; only report files that exist but fail to load
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    gatehouse_server::observability::init_tracing();

    let cli = Cli::parse();
    let (config_path, source) = resolve_config_path(cli.config);

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        flow = %cfg.auth.flow,
        "Configuration loaded"
    );

    gatehouse_server::observability::apply_logging_level(&cfg.logging.level);

    match cfg.auth.flow {
        AuthFlow::AuthorizationCode => serve(cfg).await,
        AuthFlow::ClientCredentials => fetch_machine_token(&cfg).await,
    }
}

async fn serve(cfg: AppConfig) {
    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

/// Fetch one client credentials token and print it, then call the configured
/// resource with it, if any.
async fn fetch_machine_token(cfg: &AppConfig) {
    let relying_party = match gatehouse_server::server::relying_party(cfg) {
        Ok(rp) => rp,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = relying_party.fetch_metadata().await {
        eprintln!("Provider discovery failed: {e}");
        std::process::exit(2);
    }

    let tokens = match relying_party.fetch_client_credentials_token().await {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("Token request failed: {e}");
            std::process::exit(1);
        }
    };
    let summary = serde_json::json!({
        "access_token": tokens.access_token,
        "token_type": tokens.token_type,
        "expires_in": tokens.expires_in,
        "expires_at": tokens.expires_at,
        "scope": tokens.scope,
    });
    println!("{summary:#}");

    let Some(resource) = &cfg.auth.client_credentials.resource else {
        return;
    };
    match relying_party.call_resource(resource, &tokens).await {
        Ok(body) => println!("{body:#}"),
        Err(e) => {
            eprintln!("Resource request failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: GATEHOUSE_CONFIG
/// 3. Default: gatehouse.toml
fn resolve_config_path(cli_path: Option<String>) -> (String, ConfigSource) {
    if let Some(path) = cli_path {
        return (path, ConfigSource::CliArgument);
    }

    if let Ok(path) = env::var("GATEHOUSE_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}
