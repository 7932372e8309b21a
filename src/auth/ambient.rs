//! Ambient (application default) credentials.
//!
//! Sources are tried in order:
//!
//! 1. The key file named by `GOOGLE_APPLICATION_CREDENTIALS`
//! 2. The gcloud well-known file
//!    (`<config dir>/gcloud/application_default_credentials.json`)
//! 3. The GCE metadata server
//!
//! Nothing here prompts the user. Every failure is reported as
//! [`Unavailable`] so the caller can fall through to the consent flow.

use super::credential::{AmbientKind, Credential, CredentialSource};
use super::scope::ScopeSet;
use super::secrets::GOOGLE_TOKEN_URI;
use super::token::{TokenResponse, http_client, request_token};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a key file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Environment variable overriding the metadata server host.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const METADATA_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const METADATA_TIMEOUT: Duration = Duration::from_secs(3);
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// No ambient credential could be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unavailable {
    pub reason: String,
}

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ambient credentials unavailable: {}", self.reason)
    }
}

/// A non-interactive credential source.
#[async_trait]
pub trait AmbientSource: Send + Sync {
    /// Obtain a credential narrowed to `scopes`, or report why none exists.
    async fn credential(&self, scopes: &ScopeSet) -> Result<Credential, Unavailable>;
}

/// Ambient source that never yields a credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAmbient;

#[async_trait]
impl AmbientSource for NoAmbient {
    async fn credential(&self, _scopes: &ScopeSet) -> Result<Credential, Unavailable> {
        Err(Unavailable::new("ambient credentials disabled"))
    }
}

/// Key file formats accepted as application default credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyFile {
    /// Written by `gcloud auth application-default login`.
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_uri: Option<String>,
    },
    /// Service account JSON key.
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        private_key_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_uri: Option<String>,
    },
}

impl KeyFile {
    fn read(path: &Path) -> Result<Self, Unavailable> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Unavailable::new(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Unavailable::new(format!("{}: unsupported key file: {e}", path.display())))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Google application default credentials.
#[derive(Debug, Clone)]
pub struct ApplicationDefault {
    client: reqwest::Client,
    key_file: Option<PathBuf>,
    well_known_file: Option<PathBuf>,
    metadata_host: Option<String>,
}

impl ApplicationDefault {
    /// Sources as discovered from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let key_file = std::env::var_os(CREDENTIALS_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let well_known_file = dirs::config_dir()
            .map(|dir| dir.join("gcloud").join("application_default_credentials.json"));
        let metadata_host = std::env::var(METADATA_HOST_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());

        Self {
            client: http_client(),
            key_file,
            well_known_file,
            metadata_host: Some(metadata_host),
        }
    }

    /// Only the given key file; no well-known file, no metadata server.
    #[must_use]
    pub fn key_file_only(path: impl Into<PathBuf>) -> Self {
        Self {
            client: http_client(),
            key_file: Some(path.into()),
            well_known_file: None,
            metadata_host: None,
        }
    }

    /// Skip the metadata server probe.
    #[must_use]
    pub fn without_metadata_server(mut self) -> Self {
        self.metadata_host = None;
        self
    }

    async fn key_file_credential(&self, path: &Path, scopes: &ScopeSet) -> Result<Credential, Unavailable> {
        match KeyFile::read(path)? {
            KeyFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => {
                let uri = token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URI);
                let response = request_token(
                    &self.client,
                    uri,
                    &[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token.as_str()),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                    ],
                )
                .await
                .map_err(|e| Unavailable::new(e.to_string()))?;

                Ok(response.into_credential(
                    scopes,
                    CredentialSource::ApplicationDefault(AmbientKind::AuthorizedUser),
                ))
            }
            KeyFile::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
            } => {
                let uri = token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URI);
                let assertion = sign_assertion(
                    &client_email,
                    &private_key,
                    private_key_id,
                    uri,
                    scopes,
                )?;
                let response = request_token(
                    &self.client,
                    uri,
                    &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
                )
                .await
                .map_err(|e| Unavailable::new(e.to_string()))?;

                Ok(response.into_credential(
                    scopes,
                    CredentialSource::ApplicationDefault(AmbientKind::ServiceAccount),
                ))
            }
        }
    }

    async fn metadata_credential(&self, host: &str, scopes: &ScopeSet) -> Result<Credential, Unavailable> {
        let url = format!(
            "http://{host}/computeMetadata/v1/instance/service-accounts/default/token?scopes={}",
            urlencoding::encode(&scopes.iter().collect::<Vec<_>>().join(","))
        );

        let client = reqwest::Client::builder()
            .connect_timeout(METADATA_CONNECT_TIMEOUT)
            .timeout(METADATA_TIMEOUT)
            .build()
            .map_err(|e| Unavailable::new(format!("metadata client: {e}")))?;

        let response = client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Unavailable::new(format!("metadata server unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Unavailable::new(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Unavailable::new(format!("metadata token response: {e}")))?;

        Ok(token.into_credential(
            scopes,
            CredentialSource::ApplicationDefault(AmbientKind::MetadataServer),
        ))
    }
}

#[async_trait]
impl AmbientSource for ApplicationDefault {
    async fn credential(&self, scopes: &ScopeSet) -> Result<Credential, Unavailable> {
        let mut reasons = Vec::new();

        if let Some(path) = &self.key_file {
            // An explicitly named key file is authoritative
            return self.key_file_credential(path, scopes).await.map_err(|e| {
                Unavailable::new(format!("{CREDENTIALS_ENV}: {}", e.reason))
            });
        }

        if let Some(path) = self.well_known_file.as_deref().filter(|p| p.exists()) {
            match self.key_file_credential(path, scopes).await {
                Ok(credential) => return Ok(credential),
                Err(e) => reasons.push(e.reason),
            }
        } else {
            reasons.push("no well-known credentials file".into());
        }

        if let Some(host) = &self.metadata_host {
            match self.metadata_credential(host, scopes).await {
                Ok(credential) => return Ok(credential),
                Err(e) => reasons.push(e.reason),
            }
        }

        Err(Unavailable::new(reasons.join("; ")))
    }
}

fn sign_assertion(
    client_email: &str,
    private_key: &str,
    private_key_id: Option<String>,
    audience: &str,
    scopes: &ScopeSet,
) -> Result<String, Unavailable> {
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
        .map_err(|e| Unavailable::new(format!("invalid service account key: {e}")))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = private_key_id;

    let now = chrono::Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: client_email,
        scope: scopes.joined(),
        aud: audience,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    encode(&header, &claims, &key)
        .map_err(|e| Unavailable::new(format!("failed to sign assertion: {e}")))
}
