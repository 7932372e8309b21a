//! AdMob API client handle.

mod http;

pub use http::HttpClient;

use crate::auth::Credential;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use std::str::FromStr;

/// Production REST endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://admob.googleapis.com";
/// Sent as `User-Agent` unless configured otherwise.
pub const DEFAULT_APPLICATION_NAME: &str = "admobapi-rust-samples";

/// Published API versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    #[default]
    V1,
    V1beta,
    V1alpha,
}

impl ApiVersion {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V1beta => "v1beta",
            Self::V1alpha => "v1alpha",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "v1beta" => Ok(Self::V1beta),
            "v1alpha" => Ok(Self::V1alpha),
            other => Err(Error::Config(format!(
                "unknown API version '{other}' (expected v1, v1beta or v1alpha)"
            ))),
        }
    }
}

/// A credential bound to one endpoint and API version.
#[derive(Debug)]
pub struct AdMobClient {
    http: HttpClient,
    version: ApiVersion,
    credential: Credential,
}

impl AdMobClient {
    pub fn new(
        endpoint: &str,
        version: ApiVersion,
        application_name: &str,
        credential: Credential,
    ) -> Self {
        Self {
            http: HttpClient::new(endpoint, credential.access_token.clone(), application_name),
            version,
            credential,
        }
    }

    #[must_use]
    pub fn version(&self) -> ApiVersion {
        self.version
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.http.base_url()
    }

    /// Versioned path for a resource name such as `accounts/pub-123/apps`.
    #[must_use]
    pub fn resource_path(&self, resource: &str) -> String {
        format!("{}/{}", self.version, resource.trim_matches('/'))
    }

    /// GET a resource.
    pub async fn get<R: DeserializeOwned>(&self, resource: &str) -> Result<R> {
        self.http.get_json(&self.resource_path(resource)).await
    }

    /// POST a JSON body to a resource or custom method
    /// (e.g. `accounts/pub-123/networkReport:generate`).
    pub async fn post<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        resource: &str,
        body: &T,
    ) -> Result<R> {
        self.http
            .post_json(&self.resource_path(resource), body)
            .await
    }
}
