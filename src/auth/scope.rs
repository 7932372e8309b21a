//! OAuth scope sets.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// See and download AdMob data.
pub const ADMOB_READONLY: &str = "https://www.googleapis.com/auth/admob.readonly";
/// See AdMob reports.
pub const ADMOB_REPORT: &str = "https://www.googleapis.com/auth/admob.report";
/// Manage apps, ad units and mediation.
pub const ADMOB_MONETIZATION: &str = "https://www.googleapis.com/auth/admob.monetization";

/// Immutable, non-empty set of scope identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Build a scope set. Blank entries are ignored; an empty result is an error.
    pub fn new<I, S>(scopes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = scopes
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if set.is_empty() {
            return Err(Error::Config("scope set must not be empty".into()));
        }
        Ok(Self(set))
    }

    /// Scopes used by the samples when nothing else is configured.
    #[must_use]
    pub fn admob_default() -> Self {
        Self(
            [ADMOB_READONLY, ADMOB_REPORT]
                .into_iter()
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// Space-separated form used in authorization URLs and token requests.
    #[must_use]
    pub fn joined(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }

    /// True if every scope in `self` is present in `granted`.
    #[must_use]
    pub fn is_covered_by<'a, I>(&self, granted: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let granted: BTreeSet<&str> = granted.into_iter().collect();
        self.iter().all(|s| granted.contains(s))
    }
}

impl TryFrom<Vec<String>> for ScopeSet {
    type Error = Error;

    fn try_from(value: Vec<String>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ScopeSet> for Vec<String> {
    fn from(value: ScopeSet) -> Self {
        value.0.into_iter().collect()
    }
}

impl FromStr for ScopeSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.split_whitespace())
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}
