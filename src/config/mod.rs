use crate::auth::{DEFAULT_USER_ID, ResolverConfig, ScopeSet};
use crate::client::{ApiVersion, DEFAULT_APPLICATION_NAME, DEFAULT_ENDPOINT};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ADMOB_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client identity file downloaded from the Cloud console.
    pub client_secrets: PathBuf,
    /// Directory for the consent record. `~` expands to the home directory.
    pub store_dir: PathBuf,
    pub user_id: String,
    pub scopes: ScopeSet,
    pub api_version: ApiVersion,
    pub endpoint: String,
    pub application_name: String,
    /// Seconds to wait for the OAuth redirect. Unset waits indefinitely.
    pub callback_timeout_secs: Option<u64>,
    /// Try application default credentials before the consent flow.
    pub ambient: bool,
    /// Include the GCE metadata server among ambient sources.
    pub metadata_server: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secrets: PathBuf::from("client_secrets.json"),
            store_dir: PathBuf::from("~/.store/admobapi_sample"),
            user_id: DEFAULT_USER_ID.to_string(),
            scopes: ScopeSet::admob_default(),
            api_version: ApiVersion::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            callback_timeout_secs: None,
            ambient: true,
            metadata_server: true,
        }
    }
}

impl Config {
    /// Default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("admob").join("config.toml")))
            .unwrap_or_else(|| PathBuf::from(".admob/config.toml"))
    }

    /// Load from the default location, falling back to defaults if absent.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load an explicitly named config file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Explicit resolver configuration with home-relative paths expanded.
    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            client_secrets: expand_home(&self.client_secrets),
            store_dir: expand_home(&self.store_dir),
            user_id: self.user_id.clone(),
            callback_timeout: self.callback_timeout_secs.map(Duration::from_secs),
            endpoint: self.endpoint.clone(),
            application_name: self.application_name.clone(),
        }
    }
}

/// Expand a leading `~` to the home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
