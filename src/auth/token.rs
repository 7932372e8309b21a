//! OAuth token endpoint calls.

use super::credential::{Credential, CredentialSource};
use super::scope::ScopeSet;
use super::secrets::ClientSecrets;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;

const TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Token endpoint response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated granted scopes; absent on some grants.
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Build a credential. When the response carries no `scope`, the
    /// requested scopes are taken as granted.
    #[must_use]
    pub fn into_credential(self, requested: &ScopeSet, source: CredentialSource) -> Credential {
        let scopes = match self.scope.as_deref() {
            Some(granted) if !granted.trim().is_empty() => {
                granted.split_whitespace().map(str::to_string).collect()
            }
            _ => requested.iter().map(str::to_string).collect(),
        };

        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scopes,
            // Out-of-range lifetimes are treated as unknown expiry
            expires_at: self
                .expires_in
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime)),
            source,
        }
    }
}

/// Exchanges authorization codes and refresh tokens for access tokens.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code (with its PKCE verifier).
    async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse>;

    /// Obtain a fresh access token from a refresh token.
    async fn refresh(&self, secrets: &ClientSecrets, refresh_token: &str)
    -> Result<TokenResponse>;
}

/// Token endpoint named by the client secrets (`token_uri`).
#[derive(Debug, Clone)]
pub struct GoogleTokenEndpoint {
    client: reqwest::Client,
}

impl GoogleTokenEndpoint {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for GoogleTokenEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenEndpoint for GoogleTokenEndpoint {
    async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse> {
        tracing::info!("Exchanging authorization code for tokens");
        request_token(
            &self.client,
            &secrets.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("code_verifier", code_verifier),
            ],
        )
        .await
    }

    async fn refresh(
        &self,
        secrets: &ClientSecrets,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        tracing::debug!("Refreshing stored access token");
        request_token(
            &self.client,
            &secrets.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
            ],
        )
        .await
    }
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// POST a form to a token endpoint.
///
/// A non-success status is a credential error carrying the endpoint's
/// error message.
pub(crate) async fn request_token(
    client: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = client.post(token_uri).form(form).send().await?;

    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        let detail = crate::error::remote_error_message(&text).unwrap_or(text);
        return Err(Error::credential(format!(
            "Token request rejected ({status}): {detail}"
        )));
    }

    serde_json::from_str(&text)
        .map_err(|e| Error::credential(format!("Unparseable token response: {e}")))
}
