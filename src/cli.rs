//! `admob` command-line interface.

use crate::auth::{
    ApplicationDefault, ConsentStore, Credential, CredentialResolver, NoAmbient, ScopeSet,
};
use crate::client::ApiVersion;
use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Environment variable holding a tracing filter.
pub const LOG_ENV: &str = "ADMOB_LOG";

/// Authenticated access to the AdMob API
#[derive(Parser, Debug)]
#[command(name = "admob", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: $ADMOB_CONFIG or <config dir>/admob/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// API version to bind the client to (v1, v1beta, v1alpha)
    #[arg(long = "api-version", global = true)]
    pub api_version: Option<ApiVersion>,

    /// OAuth scope to request (repeatable; replaces configured scopes)
    #[arg(long = "scope", global = true, value_name = "SCOPE")]
    pub scopes: Vec<String>,

    /// Skip application default credentials
    #[arg(long = "no-ambient", global = true)]
    pub no_ambient: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve credentials, running the consent flow if needed
    Login,
    /// Delete the stored consent record
    Logout,
    /// Show the stored consent record
    Status,
    /// GET a resource, e.g. `accounts` or `accounts/pub-123/adUnits`
    Get {
        resource: String,
    },
    /// POST a JSON body to a resource or method,
    /// e.g. `accounts/pub-123/networkReport:generate`
    Post {
        resource: String,
        /// Request body as JSON
        #[arg(long, default_value = "{}")]
        body: String,
    },
}

/// Run the CLI and map failures to an exit code.
pub async fn run(cli: Cli) -> ExitCode {
    init_tracing(cli.verbose);

    match run_inner(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<crate::error::Error>() {
                Some(api_error) => eprintln!("Error: {}", api_error.describe()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        Some(tracing_subscriber::EnvFilter::new("admob=debug"))
    } else {
        std::env::var(LOG_ENV)
            .ok()
            .map(tracing_subscriber::EnvFilter::new)
    };

    if let Some(filter) = filter {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

async fn run_inner(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let scopes = if cli.scopes.is_empty() {
        config.scopes.clone()
    } else {
        ScopeSet::new(cli.scopes.iter().map(String::as_str))?
    };
    let version = cli.api_version.unwrap_or(config.api_version);

    let mut resolver = CredentialResolver::new(config.resolver_config());
    if cli.no_ambient || !config.ambient {
        resolver = resolver.with_ambient(NoAmbient);
    } else if !config.metadata_server {
        resolver = resolver.with_ambient(ApplicationDefault::from_env().without_metadata_server());
    }

    match cli.command {
        Commands::Login => {
            let credential = resolver.resolve(&scopes).await?;
            print_credential(&credential);
        }
        Commands::Logout => {
            let store = resolver.consent_store();
            if store.clear(&config.user_id)? {
                println!("Removed stored consent for '{}'", config.user_id);
            } else {
                println!("No stored consent for '{}'", config.user_id);
            }
        }
        Commands::Status => print_status(&resolver.consent_store(), &config.user_id)?,
        Commands::Get { resource } => {
            let client = resolver.acquire_client(&scopes, version).await?;
            let value: serde_json::Value = client.get(&resource).await?;
            print_fields(&value);
        }
        Commands::Post { resource, body } => {
            let body: serde_json::Value =
                serde_json::from_str(&body).context("--body is not valid JSON")?;
            let client = resolver.acquire_client(&scopes, version).await?;
            let value: serde_json::Value = client.post(&resource, &body).await?;
            print_fields(&value);
        }
    }

    Ok(())
}

fn print_credential(credential: &Credential) {
    println!("source: {}", credential.source);
    println!(
        "scopes: {}",
        credential.scopes.iter().cloned().collect::<Vec<_>>().join(" ")
    );
    match credential.expires_at {
        Some(at) => println!("expires_at: {}", at.to_rfc3339()),
        None => println!("expires_at: unknown"),
    }
    println!("refresh_token: {}", presence(credential.refresh_token.is_some()));
}

fn print_status(store: &ConsentStore, user_id: &str) -> Result<()> {
    println!("store: {}", store.path().display());
    let Some(record) = store.load(user_id)? else {
        println!("consent: none");
        return Ok(());
    };

    let credential = record.to_credential();
    println!("consent: {user_id}");
    println!("client_id: {}", record.client_id);
    println!("scopes: {}", record.scopes.join(" "));
    if let Some(at) = credential.expires_at {
        let state = if credential.needs_refresh() { "stale" } else { "fresh" };
        println!("expires_at: {} ({state})", at.to_rfc3339());
    }
    println!("refresh_token: {}", presence(record.refresh_token.is_some()));
    Ok(())
}

fn presence(present: bool) -> &'static str {
    if present { "present" } else { "absent" }
}

/// Print a JSON value as `key: value` lines with dotted paths.
pub fn print_fields(value: &serde_json::Value) {
    for (key, value) in flatten(value) {
        if key.is_empty() {
            println!("{value}");
        } else {
            println!("{key}: {value}");
        }
    }
}

fn flatten(value: &serde_json::Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &serde_json::Value, prefix: String, out: &mut Vec<(String, String)>) {
    use serde_json::Value;

    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(child, path, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, format!("{prefix}[{i}]"), out);
            }
        }
        Value::String(s) => out.push((prefix, s.clone())),
        other => out.push((prefix, other.to_string())),
    }
}
