//! Client identity (`client_secrets.json`) loading.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth client identity registered in the Google Cloud console.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// Downloaded secrets files wrap the identity in `installed` or `web`.
#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum SecretsFile {
    Installed(ClientSecrets),
    Web(ClientSecrets),
}

impl ClientSecrets {
    /// Load a client secrets file.
    ///
    /// A missing file or malformed content is a credential error; any other
    /// read failure is an IO error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::credential(format!(
                    "Client secrets file not found: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        Self::parse(&content).map_err(|e| {
            Error::credential(format!(
                "Malformed client secrets file {}: {e}",
                path.display()
            ))
        })
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        let file: SecretsFile = serde_json::from_str(content).map_err(|e| e.to_string())?;
        let secrets = match file {
            SecretsFile::Installed(s) | SecretsFile::Web(s) => s,
        };

        if secrets.client_id.trim().is_empty() {
            return Err("client_id is empty".into());
        }
        Ok(secrets)
    }
}

impl std::fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}
