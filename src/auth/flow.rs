//! Installed-application consent flow.
//!
//! ```text
//! NoCredential -> AwaitingStoredToken -> Authorized
//!                                     -> AwaitingUserConsent -> CodeReceived -> TokenExchanged -> Authorized
//! ```
//!
//! `Aborted` is reachable from every state after `AwaitingStoredToken`.

use super::credential::{Credential, CredentialSource};
use super::pkce::{CHALLENGE_METHOD, Pkce, state_token};
use super::scope::ScopeSet;
use super::secrets::ClientSecrets;
use super::server::{CallbackResult, CallbackServer};
use super::storage::{ConsentRecord, ConsentStore};
use super::token::TokenEndpoint;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Sends the user to the authorization page.
pub trait ConsentPrompt: Send + Sync {
    fn present(&self, auth_url: &str) -> Result<()>;
}

/// Prints the authorization URL and opens the system browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserPrompt;

impl ConsentPrompt for BrowserPrompt {
    fn present(&self, auth_url: &str) -> Result<()> {
        println!("Opening browser for AdMob API authorization...");
        println!("If the browser doesn't open, visit:");
        println!("  {auth_url}");
        println!();

        if let Err(e) = open::that(auth_url) {
            eprintln!("Failed to open browser: {e}");
            eprintln!("Please open the URL above manually.");
        }
        Ok(())
    }
}

enum ConsentState {
    NoCredential,
    AwaitingStoredToken,
    AwaitingUserConsent,
    CodeReceived {
        callback: CallbackResult,
        redirect_uri: String,
        pkce: Pkce,
    },
    TokenExchanged(Credential),
    Authorized(Credential),
    Aborted(Error),
}

impl ConsentState {
    fn name(&self) -> &'static str {
        match self {
            Self::NoCredential => "NoCredential",
            Self::AwaitingStoredToken => "AwaitingStoredToken",
            Self::AwaitingUserConsent => "AwaitingUserConsent",
            Self::CodeReceived { .. } => "CodeReceived",
            Self::TokenExchanged(_) => "TokenExchanged",
            Self::Authorized(_) => "Authorized",
            Self::Aborted(_) => "Aborted",
        }
    }
}

/// Tier 2 credential acquisition with a persisted consent record.
pub struct InstalledFlow {
    secrets_path: PathBuf,
    store: ConsentStore,
    user_id: String,
    callback_timeout: Option<Duration>,
    tokens: Arc<dyn TokenEndpoint>,
    prompt: Arc<dyn ConsentPrompt>,
}

impl InstalledFlow {
    pub fn new(
        secrets_path: PathBuf,
        store: ConsentStore,
        user_id: String,
        callback_timeout: Option<Duration>,
        tokens: Arc<dyn TokenEndpoint>,
        prompt: Arc<dyn ConsentPrompt>,
    ) -> Self {
        Self {
            secrets_path,
            store,
            user_id,
            callback_timeout,
            tokens,
            prompt,
        }
    }

    /// Produce a credential covering `scopes`, prompting only when the
    /// consent record cannot satisfy the request.
    pub async fn authorize(&self, scopes: &ScopeSet) -> Result<Credential> {
        let secrets = ClientSecrets::load(&self.secrets_path)?;
        let mut state = ConsentState::NoCredential;

        loop {
            let next = match state {
                ConsentState::NoCredential => ConsentState::AwaitingStoredToken,
                ConsentState::AwaitingStoredToken => {
                    match self.stored_credential(&secrets, scopes).await? {
                        Some(credential) => ConsentState::Authorized(credential),
                        None => ConsentState::AwaitingUserConsent,
                    }
                }
                ConsentState::AwaitingUserConsent => {
                    match self.request_consent(&secrets, scopes).await {
                        Ok((callback, redirect_uri, pkce)) => ConsentState::CodeReceived {
                            callback,
                            redirect_uri,
                            pkce,
                        },
                        Err(e) => ConsentState::Aborted(e),
                    }
                }
                ConsentState::CodeReceived {
                    callback,
                    redirect_uri,
                    pkce,
                } => match self
                    .tokens
                    .exchange_code(&secrets, &callback.code, &redirect_uri, &pkce.verifier)
                    .await
                {
                    Ok(response) => {
                        let credential = response
                            .into_credential(scopes, CredentialSource::InteractiveConsent);
                        if credential.grants(scopes) {
                            ConsentState::TokenExchanged(credential)
                        } else {
                            ConsentState::Aborted(Error::credential(format!(
                                "Authorization granted fewer scopes than requested ({scopes})"
                            )))
                        }
                    }
                    Err(e) => ConsentState::Aborted(e),
                },
                ConsentState::TokenExchanged(credential) => {
                    self.store.save(
                        &self.user_id,
                        ConsentRecord::from_credential(&credential, &secrets.client_id),
                    )?;
                    tracing::info!("Stored consent in {}", self.store.path().display());
                    ConsentState::Authorized(credential)
                }
                ConsentState::Authorized(credential) => return Ok(credential),
                ConsentState::Aborted(e) => {
                    tracing::warn!("Authorization aborted: {e}");
                    return Err(e);
                }
            };

            tracing::debug!(state = next.name(), "consent flow transition");
            state = next;
        }
    }

    async fn stored_credential(
        &self,
        secrets: &ClientSecrets,
        scopes: &ScopeSet,
    ) -> Result<Option<Credential>> {
        let Some(record) = self.store.load(&self.user_id)? else {
            tracing::debug!("No stored consent for user {}", self.user_id);
            return Ok(None);
        };

        if record.client_id != secrets.client_id {
            tracing::info!("Stored consent was issued to a different client, re-authorizing");
            return Ok(None);
        }

        let stored = record.to_credential();
        if !stored.grants(scopes) {
            tracing::info!("Stored consent does not cover the requested scopes, re-authorizing");
            return Ok(None);
        }

        if !stored.needs_refresh() {
            return Ok(Some(stored));
        }

        let Some(refresh_token) = stored.refresh_token.clone() else {
            tracing::info!("Stored access token expired and no refresh token is available");
            return Ok(None);
        };

        let response = match self.tokens.refresh(secrets, &refresh_token).await {
            Ok(response) => response,
            Err(e) if e.is_credential() => {
                tracing::warn!("Stored refresh token rejected: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let scope_reported = response.scope.is_some();
        let mut refreshed = response.into_credential(scopes, CredentialSource::StoredConsent);
        if !scope_reported {
            refreshed.scopes = stored.scopes;
        }
        // Refresh responses usually omit the refresh token
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token);
        }
        if !refreshed.grants(scopes) {
            return Ok(None);
        }

        self.store.save(
            &self.user_id,
            ConsentRecord::from_credential(&refreshed, &secrets.client_id),
        )?;
        Ok(Some(refreshed))
    }

    async fn request_consent(
        &self,
        secrets: &ClientSecrets,
        scopes: &ScopeSet,
    ) -> Result<(CallbackResult, String, Pkce)> {
        let pkce = Pkce::generate();
        let state = state_token();

        let server = CallbackServer::bind(state.clone())?;
        let redirect_uri = server.redirect_uri();
        let auth_url = authorization_url(secrets, &redirect_uri, &state, &pkce, scopes)?;

        self.prompt.present(auth_url.as_str())?;
        tracing::info!("Waiting for authorization callback on {redirect_uri}");

        let timeout = self.callback_timeout;
        let callback = tokio::task::spawn_blocking(move || server.wait_for_callback(timeout))
            .await
            .map_err(|e| Error::credential(format!("OAuth callback task failed: {e}")))??;

        Ok((callback, redirect_uri, pkce))
    }
}

fn authorization_url(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    state: &str,
    pkce: &Pkce,
    scopes: &ScopeSet,
) -> Result<Url> {
    let scope = scopes.joined();
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", CHALLENGE_METHOD),
            ("access_type", "offline"),
            ("include_granted_scopes", "true"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| Error::credential(format!("Invalid auth_uri in client secrets: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::scope::{ADMOB_MONETIZATION, ADMOB_REPORT};
    use crate::auth::secrets::GOOGLE_AUTH_URI;
    use std::collections::HashMap;

    fn secrets(auth_uri: &str) -> ClientSecrets {
        serde_json::from_value(serde_json::json!({
            "client_id": "id.apps.googleusercontent.com",
            "client_secret": "s",
            "auth_uri": auth_uri,
        }))
        .unwrap()
    }

    #[test]
    fn test_authorization_url_params() {
        let pkce = Pkce::generate();
        let scopes = ScopeSet::new([ADMOB_REPORT, ADMOB_MONETIZATION]).unwrap();
        let url = authorization_url(
            &secrets(GOOGLE_AUTH_URI),
            "http://127.0.0.1:4321/callback",
            "st",
            &pkce,
            &scopes,
        )
        .unwrap();

        assert!(url.as_str().starts_with(GOOGLE_AUTH_URI));
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "id.apps.googleusercontent.com");
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:4321/callback");
        assert_eq!(params["scope"], scopes.joined());
        assert_eq!(params["state"], "st");
        assert_eq!(params["code_challenge"], pkce.challenge);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
    }

    #[test]
    fn test_invalid_auth_uri() {
        let scopes = ScopeSet::new([ADMOB_REPORT]).unwrap();
        let err = authorization_url(&secrets("not a url"), "r", "s", &Pkce::generate(), &scopes)
            .unwrap_err();
        assert!(err.is_credential());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ConsentState::NoCredential.name(), "NoCredential");
        assert_eq!(
            ConsentState::Aborted(Error::credential("x")).name(),
            "Aborted"
        );
    }
}
