//! OAuth2 credential resolution for the AdMob API.
//!
//! Credentials are resolved in two tiers:
//!
//! 1. Ambient credentials from the environment ([`ApplicationDefault`]),
//!    never interactive.
//! 2. The installed-application consent flow ([`InstalledFlow`]): a stored
//!    consent record if it covers the requested scopes, otherwise a browser
//!    consent round trip through a loopback listener, persisted for the
//!    next run.
//!
//! [`CredentialResolver`] ties both together and hands out
//! [`AdMobClient`](crate::client::AdMobClient) handles.

mod ambient;
mod credential;
mod flow;
mod pkce;
mod resolver;
mod scope;
mod secrets;
mod server;
mod storage;
mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use ambient::{
    AmbientSource, ApplicationDefault, CREDENTIALS_ENV, KeyFile, METADATA_HOST_ENV, NoAmbient,
    Unavailable,
};
pub use credential::{AmbientKind, Credential, CredentialSource};
pub use flow::{BrowserPrompt, ConsentPrompt, InstalledFlow};
pub use pkce::{Pkce, state_token};
pub use resolver::{CredentialResolver, DEFAULT_USER_ID, ResolverConfig};
pub use scope::{ADMOB_MONETIZATION, ADMOB_READONLY, ADMOB_REPORT, ScopeSet};
pub use secrets::{ClientSecrets, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI};
pub use server::{CALLBACK_PATH, CallbackResult, CallbackServer};
pub use storage::{ConsentRecord, ConsentStore, STORE_FILE};
pub use token::{GoogleTokenEndpoint, TokenEndpoint, TokenResponse};
