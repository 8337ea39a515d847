//! FreelancePro CLI - command line access to the FreelancePro business suite.
//!
//! Logs in against the REST backend, keeps the issued tokens in the chosen
//! token store, and issues authenticated requests that refresh an expired
//! access token on their own.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use freelancepro_core::api::{ApiClient, Gateway, Outcome, RequestOptions};
use freelancepro_core::auth::Role;
use freelancepro_core::config::{Config, TokenBackend};

#[derive(Parser)]
#[command(name = "freelancepro", version, about = "FreelancePro business suite API client")]
struct Cli {
    /// Override the API base URL for this invocation
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the issued tokens
    Login {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        role: Option<Role>,
    },
    /// Create a new account (does not log in)
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Role,
    },
    /// Forget the stored tokens
    Logout,
    /// Show the current session state
    Status,
    /// Exchange the refresh token for a new access token
    Refresh,
    /// Authenticated GET; prints status and body
    Get { path: String },
    /// Authenticated POST with a JSON body; prints status and body
    Post { path: String, body: String },
    /// Authenticated DELETE; prints status and body
    Delete { path: String },
    /// Show or change persisted settings
    Config {
        #[arg(long)]
        set_base_url: Option<String>,
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
        /// Request timeout in seconds, 0 to wait indefinitely
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    File,
    Keyring,
}

impl From<BackendArg> for TokenBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::File => TokenBackend::File,
            BackendArg::Keyring => TokenBackend::Keyring,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    let base_url = cli.base_url.clone().unwrap_or_else(|| config.base_url());
    info!(base_url = %base_url, "FreelancePro CLI starting");

    match cli.command {
        Command::Login { email, role } => {
            let email = match email.or_else(|| config.last_email.clone()) {
                Some(email) => email,
                None => anyhow::bail!("--email is required for the first login"),
            };
            let role = role
                .or(config.last_role)
                .ok_or_else(|| anyhow::anyhow!("--role is required for the first login"))?;
            let password = rpassword::prompt_password("Password: ")?;

            let client = connect(&config, &base_url)?;
            let user = client.login(&email, &password, role).await?;
            match user {
                Some(user) => {
                    println!("Logged in as {} ({}, {})", user.full_name, user.email, user.role)
                }
                None => println!("Logged in as {}", email),
            }

            config.last_email = Some(email);
            config.last_role = Some(role);
            config.save()?;
        }
        Command::Register { username, email, role } => {
            let password = rpassword::prompt_password("Password: ")?;
            let client = connect(&config, &base_url)?;
            let message = client.register(&username, &email, &password, role).await?;
            println!("{}", message);
        }
        Command::Logout => {
            connect(&config, &base_url)?.logout()?;
            println!("Logged out");
        }
        Command::Status => {
            let client = connect(&config, &base_url)?;
            println!("API:     {}", client.gateway().base_url());
            println!("Session: {}", client.state());
            if let Some(ref email) = config.last_email {
                println!("Last login: {}", email);
            }
        }
        Command::Refresh => {
            connect(&config, &base_url)?.refresh().await?;
            println!("Access token refreshed");
        }
        Command::Get { path } => {
            let client = connect(&config, &base_url)?;
            print_outcome(client.gateway().send(&path, &RequestOptions::get()).await?).await?;
        }
        Command::Post { path, body } => {
            let json: serde_json::Value =
                serde_json::from_str(&body).context("Request body is not valid JSON")?;
            let options = RequestOptions::post().json(&json)?;
            let client = connect(&config, &base_url)?;
            print_outcome(client.gateway().send(&path, &options).await?).await?;
        }
        Command::Delete { path } => {
            let client = connect(&config, &base_url)?;
            let options = RequestOptions::delete();
            print_outcome(client.gateway().send(&path, &options).await?).await?;
        }
        Command::Config { set_base_url, backend, timeout } => {
            let path = Config::path()?;
            println!("{}", configure(&mut config, &path, set_base_url, backend, timeout)?);
        }
    }

    Ok(())
}

/// Open the configured token store and build a client over it.
/// Only commands that talk to the backend or touch tokens call this.
fn connect(config: &Config, base_url: &str) -> Result<ApiClient> {
    let store = config.token_store()?;
    let gateway = Gateway::with_timeout(base_url, store, config.request_timeout())?;
    Ok(ApiClient::new(gateway))
}

/// Apply setting changes, persist them to `path` if any, and render the result
fn configure(
    config: &mut Config,
    path: &Path,
    base_url: Option<String>,
    backend: Option<BackendArg>,
    timeout: Option<u64>,
) -> Result<String> {
    let changed = base_url.is_some() || backend.is_some() || timeout.is_some();
    if let Some(url) = base_url {
        config.api_base_url = Some(url);
    }
    if let Some(backend) = backend {
        config.token_backend = backend.into();
    }
    if let Some(secs) = timeout {
        config.request_timeout_secs = (secs > 0).then_some(secs);
    }
    if changed {
        config.save_to(path)?;
    }
    Ok(serde_json::to_string_pretty(&*config)?)
}

/// Print status and body; pretty-print JSON bodies
async fn print_outcome(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Success(_) => {}
        Outcome::Retried(_) => debug!("Request retried after token refresh"),
        Outcome::RefreshFailed(_) => {
            eprintln!("Session expired and could not be refreshed - run `freelancepro login`")
        }
    }

    let response = outcome.into_response();
    let status = response.status();
    let text = response.text().await.context("Failed to read response body")?;

    println!("{}", status);
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if text.is_empty() => {}
        Err(_) => println!("{}", text),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_config_flags() {
        let cli = Cli::try_parse_from(["freelancepro", "config", "--backend", "keyring"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config { backend: Some(BackendArg::Keyring), timeout: None, .. }
        ));
        assert!(Cli::try_parse_from(["freelancepro", "config", "--backend", "vault"]).is_err());
    }

    #[test]
    fn test_configure_saves_without_opening_a_token_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freelancepro").join("config.json");
        let mut config = Config {
            request_timeout_secs: Some(30),
            ..Default::default()
        };

        let rendered = configure(
            &mut config,
            &path,
            Some("https://api.example.com".into()),
            Some(BackendArg::Keyring),
            Some(0),
        )
        .unwrap();

        assert!(rendered.contains("https://api.example.com"));
        let saved = Config::load_from(&path).unwrap();
        assert_eq!(saved.api_base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(saved.token_backend, TokenBackend::Keyring);
        // 0 clears the timeout
        assert!(saved.request_timeout().is_none());
        // Only the config file was written
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_configure_without_changes_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();

        let rendered = configure(&mut config, &path, None, None, None).unwrap();
        assert!(rendered.contains("\"token_backend\": \"file\""));
        assert!(!path.exists());
    }
}
