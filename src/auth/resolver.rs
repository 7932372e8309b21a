//! Two-tier credential resolution and client construction.

use super::ambient::{AmbientSource, ApplicationDefault};
use super::credential::Credential;
use super::flow::{BrowserPrompt, ConsentPrompt, InstalledFlow};
use super::scope::ScopeSet;
use super::storage::ConsentStore;
use super::token::{GoogleTokenEndpoint, TokenEndpoint};
use crate::client::{AdMobClient, ApiVersion, DEFAULT_APPLICATION_NAME, DEFAULT_ENDPOINT};
use crate::error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// User id the consent record is stored under.
pub const DEFAULT_USER_ID: &str = "user";

/// Everything the resolver needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Client identity file (`client_secrets.json`).
    pub client_secrets: PathBuf,
    /// Directory holding the consent record.
    pub store_dir: PathBuf,
    pub user_id: String,
    /// How long to wait for the OAuth redirect; `None` waits indefinitely.
    pub callback_timeout: Option<Duration>,
    pub endpoint: String,
    pub application_name: String,
}

impl ResolverConfig {
    pub fn new(client_secrets: impl Into<PathBuf>, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            client_secrets: client_secrets.into(),
            store_dir: store_dir.into(),
            user_id: DEFAULT_USER_ID.to_string(),
            callback_timeout: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        }
    }
}

/// Resolves credentials with the least interaction available and binds
/// them into [`AdMobClient`]s.
pub struct CredentialResolver {
    config: ResolverConfig,
    ambient: Box<dyn AmbientSource>,
    tokens: Arc<dyn TokenEndpoint>,
    prompt: Arc<dyn ConsentPrompt>,
}

impl CredentialResolver {
    /// Resolver with application default credentials, Google's token
    /// endpoint and the browser prompt.
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            ambient: Box::new(ApplicationDefault::from_env()),
            tokens: Arc::new(GoogleTokenEndpoint::new()),
            prompt: Arc::new(BrowserPrompt),
        }
    }

    #[must_use]
    pub fn with_ambient(mut self, ambient: impl AmbientSource + 'static) -> Self {
        self.ambient = Box::new(ambient);
        self
    }

    #[must_use]
    pub fn with_token_endpoint(mut self, tokens: impl TokenEndpoint + 'static) -> Self {
        self.tokens = Arc::new(tokens);
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl ConsentPrompt + 'static) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[must_use]
    pub fn consent_store(&self) -> ConsentStore {
        ConsentStore::new(&self.config.store_dir)
    }

    /// Resolve a credential whose granted scopes cover `scopes`.
    pub async fn resolve(&self, scopes: &ScopeSet) -> Result<Credential> {
        match self.ambient.credential(scopes).await {
            Ok(credential) if credential.grants(scopes) => {
                tracing::info!(source = %credential.source, "Using ambient credentials");
                return Ok(credential);
            }
            Ok(credential) => {
                tracing::debug!(
                    source = %credential.source,
                    "Ambient credential does not cover {scopes}, falling back to user consent"
                );
            }
            Err(unavailable) => {
                tracing::debug!("{unavailable}, falling back to user consent");
            }
        }

        let flow = InstalledFlow::new(
            self.config.client_secrets.clone(),
            self.consent_store(),
            self.config.user_id.clone(),
            self.config.callback_timeout,
            Arc::clone(&self.tokens),
            Arc::clone(&self.prompt),
        );
        flow.authorize(scopes).await
    }

    /// Resolve a credential and bind it to `version` of the configured endpoint.
    pub async fn acquire_client(&self, scopes: &ScopeSet, version: ApiVersion) -> Result<AdMobClient> {
        let credential = self.resolve(scopes).await?;
        Ok(AdMobClient::new(
            &self.config.endpoint,
            version,
            &self.config.application_name,
            credential,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::{AmbientKind, CredentialSource};
    use crate::auth::scope::{ADMOB_MONETIZATION, ADMOB_READONLY, ADMOB_REPORT};
    use crate::auth::storage::ConsentRecord;
    use crate::auth::testing::{
        BrowserSimulator, DecliningPrompt, FakeAmbient, FakeTokenEndpoint, write_client_secrets,
    };
    use crate::auth::NoAmbient;
    use tempfile::{TempDir, tempdir};

    struct Env {
        dir: TempDir,
        tokens: FakeTokenEndpoint,
        browser: BrowserSimulator,
    }

    impl Env {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            write_client_secrets(&dir.path().join("client_secrets.json"));
            Self {
                dir,
                tokens: FakeTokenEndpoint::default(),
                browser: BrowserSimulator::default(),
            }
        }

        fn config(&self) -> ResolverConfig {
            let mut config = ResolverConfig::new(
                self.dir.path().join("client_secrets.json"),
                self.dir.path().join("store"),
            );
            config.callback_timeout = Some(Duration::from_secs(10));
            config
        }

        fn resolver(&self) -> CredentialResolver {
            CredentialResolver::new(self.config())
                .with_ambient(NoAmbient)
                .with_token_endpoint(self.tokens.clone())
                .with_prompt(self.browser.clone())
        }
    }

    fn scopes(list: &[&str]) -> ScopeSet {
        ScopeSet::new(list.iter().copied()).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_environment_runs_consent_then_reuses_record() {
        let env = Env::new();
        let requested = scopes(&[ADMOB_READONLY, ADMOB_REPORT]);

        let client = env
            .resolver()
            .acquire_client(&requested, ApiVersion::V1)
            .await
            .unwrap();
        assert_eq!(client.credential().source, CredentialSource::InteractiveConsent);
        assert!(client.credential().grants(&requested));
        assert_eq!(env.browser.launches(), 1);
        assert_eq!(env.tokens.exchanges(), 1);
        assert!(env.resolver().consent_store().load(DEFAULT_USER_ID).unwrap().is_some());

        let second = env
            .resolver()
            .acquire_client(&requested, ApiVersion::V1beta)
            .await
            .unwrap();
        assert_eq!(second.credential().source, CredentialSource::StoredConsent);
        assert_eq!(second.version(), ApiVersion::V1beta);
        assert_eq!(env.browser.launches(), 1);
        assert_eq!(env.tokens.exchanges(), 1);
        assert_eq!(env.tokens.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_record_missing_scope_triggers_consent() {
        let env = Env::new();
        env.resolver()
            .resolve(&scopes(&[ADMOB_READONLY]))
            .await
            .unwrap();
        assert_eq!(env.browser.launches(), 1);

        let wider = scopes(&[ADMOB_READONLY, ADMOB_MONETIZATION]);
        let credential = env.resolver().resolve(&wider).await.unwrap();
        assert_eq!(credential.source, CredentialSource::InteractiveConsent);
        assert!(credential.grants(&wider));
        assert_eq!(env.browser.launches(), 2);

        let record = env
            .resolver()
            .consent_store()
            .load(DEFAULT_USER_ID)
            .unwrap()
            .unwrap();
        assert!(record.scopes.iter().any(|s| s == ADMOB_MONETIZATION));
    }

    #[tokio::test]
    async fn test_ambient_credentials_skip_consent() {
        let env = Env::new();
        let requested = scopes(&[ADMOB_REPORT]);

        let credential = env
            .resolver()
            .with_ambient(FakeAmbient::granting(&[ADMOB_REPORT]))
            .resolve(&requested)
            .await
            .unwrap();

        assert_eq!(
            credential.source,
            CredentialSource::ApplicationDefault(AmbientKind::ServiceAccount)
        );
        assert_eq!(env.browser.launches(), 0);
        assert_eq!(env.tokens.exchanges(), 0);
        assert!(!env.dir.path().join("store").exists());
    }

    #[tokio::test]
    async fn test_underscoped_ambient_falls_through() {
        let env = Env::new();
        let requested = scopes(&[ADMOB_REPORT, ADMOB_MONETIZATION]);

        let credential = env
            .resolver()
            .with_ambient(FakeAmbient::granting(&[ADMOB_REPORT]))
            .resolve(&requested)
            .await
            .unwrap();
        assert_eq!(credential.source, CredentialSource::InteractiveConsent);
        assert_eq!(env.browser.launches(), 1);
    }

    #[tokio::test]
    async fn test_missing_client_secrets_fails_before_network() {
        let env = Env::new();
        let mut config = env.config();
        config.client_secrets = env.dir.path().join("absent.json");

        let err = CredentialResolver::new(config)
            .with_ambient(NoAmbient)
            .with_token_endpoint(env.tokens.clone())
            .with_prompt(env.browser.clone())
            .resolve(&scopes(&[ADMOB_REPORT]))
            .await
            .unwrap_err();

        assert!(err.is_credential());
        assert_eq!(env.browser.launches(), 0);
        assert_eq!(env.tokens.exchanges() + env.tokens.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_malformed_client_secrets_fails_before_network() {
        let env = Env::new();
        std::fs::write(env.dir.path().join("client_secrets.json"), "{\"installed\": 1}").unwrap();

        let err = env
            .resolver()
            .resolve(&scopes(&[ADMOB_REPORT]))
            .await
            .unwrap_err();
        assert!(err.is_credential());
        assert_eq!(env.browser.launches(), 0);
        assert_eq!(env.tokens.exchanges(), 0);
    }

    #[tokio::test]
    async fn test_user_declines_consent() {
        let env = Env::new();
        let err = env
            .resolver()
            .with_prompt(DecliningPrompt)
            .resolve(&scopes(&[ADMOB_REPORT]))
            .await
            .unwrap_err();

        assert!(err.is_credential());
        assert!(err.to_string().contains("access_denied"));
        assert_eq!(env.tokens.exchanges(), 0);
        assert!(env.resolver().consent_store().load(DEFAULT_USER_ID).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_consent_times_out() {
        let env = Env::new();
        let mut config = env.config();
        config.callback_timeout = Some(Duration::from_millis(200));

        let err = CredentialResolver::new(config)
            .with_ambient(NoAmbient)
            .with_token_endpoint(env.tokens.clone())
            .with_prompt(BrowserSimulator::abandoning())
            .resolve(&scopes(&[ADMOB_REPORT]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Timed out"));
    }

    #[tokio::test]
    async fn test_insufficient_granted_scopes_rejected() {
        let env = Env::new();
        let requested = scopes(&[ADMOB_REPORT, ADMOB_MONETIZATION]);

        let err = env
            .resolver()
            .with_token_endpoint(FakeTokenEndpoint::granting_only(&[ADMOB_REPORT]))
            .resolve(&requested)
            .await
            .unwrap_err();
        assert!(err.is_credential());
        assert!(err.to_string().contains("fewer scopes"));
        assert!(env.resolver().consent_store().load(DEFAULT_USER_ID).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_record_is_refreshed_silently() {
        let env = Env::new();
        let store = env.resolver().consent_store();
        store
            .save(
                DEFAULT_USER_ID,
                ConsentRecord {
                    access_token: "stale".into(),
                    refresh_token: Some("1//stored".into()),
                    expires_at_ms: Some(0),
                    scopes: vec![ADMOB_REPORT.into()],
                    client_id: crate::auth::testing::CLIENT_ID.into(),
                },
            )
            .unwrap();

        let credential = env
            .resolver()
            .resolve(&scopes(&[ADMOB_REPORT]))
            .await
            .unwrap();
        assert_eq!(credential.source, CredentialSource::StoredConsent);
        assert_ne!(credential.access_token, "stale");
        assert_eq!(credential.refresh_token.as_deref(), Some("1//stored"));
        assert_eq!(env.tokens.refreshes(), 1);
        assert_eq!(env.browser.launches(), 0);

        let record = store.load(DEFAULT_USER_ID).unwrap().unwrap();
        assert_eq!(record.access_token, credential.access_token);
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_triggers_consent() {
        let env = Env::new();
        env.resolver()
            .consent_store()
            .save(
                DEFAULT_USER_ID,
                ConsentRecord {
                    access_token: "stale".into(),
                    refresh_token: Some("1//revoked".into()),
                    expires_at_ms: Some(0),
                    scopes: vec![ADMOB_REPORT.into()],
                    client_id: crate::auth::testing::CLIENT_ID.into(),
                },
            )
            .unwrap();

        let credential = env
            .resolver()
            .with_token_endpoint(FakeTokenEndpoint::rejecting_refresh())
            .resolve(&scopes(&[ADMOB_REPORT]))
            .await
            .unwrap();
        assert_eq!(credential.source, CredentialSource::InteractiveConsent);
        assert_eq!(env.browser.launches(), 1);
    }

    #[tokio::test]
    async fn test_record_for_other_client_ignored() {
        let env = Env::new();
        env.resolver()
            .consent_store()
            .save(
                DEFAULT_USER_ID,
                ConsentRecord {
                    access_token: "other".into(),
                    refresh_token: Some("1//other".into()),
                    expires_at_ms: None,
                    scopes: vec![ADMOB_REPORT.into()],
                    client_id: "someone-else.apps.googleusercontent.com".into(),
                },
            )
            .unwrap();

        let credential = env
            .resolver()
            .resolve(&scopes(&[ADMOB_REPORT]))
            .await
            .unwrap();
        assert_eq!(credential.source, CredentialSource::InteractiveConsent);
    }
}
