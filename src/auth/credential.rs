//! Resolved bearer credentials.

use super::scope::ScopeSet;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::fmt;

/// Seconds before expiry at which a token is considered stale.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Tier 1: discovered in the execution environment.
    ApplicationDefault(AmbientKind),
    /// Tier 2: loaded (and possibly refreshed) from the consent record.
    StoredConsent,
    /// Tier 2: obtained through the browser consent flow in this run.
    InteractiveConsent,
}

/// Which ambient mechanism produced a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbientKind {
    AuthorizedUser,
    ServiceAccount,
    MetadataServer,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplicationDefault(AmbientKind::AuthorizedUser) => {
                f.write_str("application default (authorized user)")
            }
            Self::ApplicationDefault(AmbientKind::ServiceAccount) => {
                f.write_str("application default (service account)")
            }
            Self::ApplicationDefault(AmbientKind::MetadataServer) => {
                f.write_str("application default (metadata server)")
            }
            Self::StoredConsent => f.write_str("stored consent"),
            Self::InteractiveConsent => f.write_str("interactive consent"),
        }
    }
}

/// An OAuth2 bearer credential.
#[derive(Clone)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Scopes the issuer granted.
    pub scopes: BTreeSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub source: CredentialSource,
}

impl Credential {
    /// True if the access token expires within the refresh margin.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    pub(crate) fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - now < Duration::seconds(REFRESH_MARGIN_SECS))
    }

    /// True if the granted scopes cover every requested scope.
    #[must_use]
    pub fn grants(&self, requested: &ScopeSet) -> bool {
        requested.is_covered_by(self.scopes.iter().map(String::as_str))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::scope::{ADMOB_READONLY, ADMOB_REPORT};

    fn credential(expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential {
            access_token: "ya29.secret".into(),
            refresh_token: Some("1//refresh".into()),
            scopes: [ADMOB_READONLY.to_string()].into_iter().collect(),
            expires_at,
            source: CredentialSource::StoredConsent,
        }
    }

    #[test]
    fn test_needs_refresh() {
        let now = Utc::now();
        assert!(credential(Some(now + Duration::seconds(30))).needs_refresh_at(now));
        assert!(credential(Some(now - Duration::seconds(1))).needs_refresh_at(now));
        assert!(!credential(Some(now + Duration::minutes(10))).needs_refresh_at(now));
        // Unknown expiry is treated as fresh
        assert!(!credential(None).needs_refresh_at(now));
    }

    #[test]
    fn test_grants() {
        let cred = credential(None);
        assert!(cred.grants(&ScopeSet::new([ADMOB_READONLY]).unwrap()));
        assert!(!cred.grants(&ScopeSet::new([ADMOB_READONLY, ADMOB_REPORT]).unwrap()));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug = format!("{:?}", credential(None));
        assert!(!debug.contains("ya29.secret"));
        assert!(!debug.contains("1//refresh"));
        assert!(debug.contains("REDACTED"));
    }
}
