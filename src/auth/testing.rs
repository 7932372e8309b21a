//! In-process doubles for resolver tests.

use super::ambient::{AmbientSource, Unavailable};
use super::credential::{AmbientKind, Credential, CredentialSource};
use super::flow::ConsentPrompt;
use super::scope::ScopeSet;
use super::secrets::ClientSecrets;
use super::token::{TokenEndpoint, TokenResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use url::Url;

pub const CLIENT_ID: &str = "1234-test.apps.googleusercontent.com";

pub fn write_client_secrets(path: &Path) {
    let content = serde_json::json!({
        "installed": {
            "client_id": CLIENT_ID,
            "client_secret": "test-secret",
            "redirect_uris": ["http://localhost"]
        }
    });
    std::fs::write(path, content.to_string()).unwrap();
}

/// Counts calls and hands out predictable tokens.
#[derive(Clone, Default)]
pub struct FakeTokenEndpoint {
    exchanges: Arc<AtomicUsize>,
    refreshes: Arc<AtomicUsize>,
    granted: Option<String>,
    reject_refresh: bool,
}

impl FakeTokenEndpoint {
    pub fn granting_only(scopes: &[&str]) -> Self {
        Self {
            granted: Some(scopes.join(" ")),
            ..Self::default()
        }
    }

    pub fn rejecting_refresh() -> Self {
        Self {
            reject_refresh: true,
            ..Self::default()
        }
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse> {
        assert_eq!(secrets.client_id, CLIENT_ID);
        assert_eq!(code, BrowserSimulator::CODE);
        assert!(redirect_uri.starts_with("http://127.0.0.1:"));
        assert_eq!(code_verifier.len(), 43);

        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenResponse {
            access_token: format!("access-{n}"),
            refresh_token: Some(format!("refresh-{n}")),
            expires_in: Some(3600),
            scope: self.granted.clone(),
        })
    }

    async fn refresh(&self, _secrets: &ClientSecrets, _refresh_token: &str) -> Result<TokenResponse> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_refresh {
            return Err(Error::credential(
                "Token request rejected (400 Bad Request): invalid_grant",
            ));
        }
        Ok(TokenResponse {
            access_token: format!("refreshed-{n}"),
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
        })
    }
}

/// Follows the redirect the way a browser would after the user consents.
#[derive(Clone, Default)]
pub struct BrowserSimulator {
    launches: Arc<AtomicUsize>,
    abandon: bool,
}

impl BrowserSimulator {
    pub const CODE: &'static str = "4/0-test-code";

    /// A user who never completes the consent page.
    pub fn abandoning() -> Self {
        Self {
            abandon: true,
            ..Self::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl ConsentPrompt for BrowserSimulator {
    fn present(&self, auth_url: &str) -> Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.abandon {
            follow_redirect(auth_url, &[("code", Self::CODE)]);
        }
        Ok(())
    }
}

/// A user who denies access on the consent page.
pub struct DecliningPrompt;

impl ConsentPrompt for DecliningPrompt {
    fn present(&self, auth_url: &str) -> Result<()> {
        follow_redirect(auth_url, &[("error", "access_denied")]);
        Ok(())
    }
}

fn follow_redirect(auth_url: &str, extra: &[(&str, &str)]) {
    let auth_url = Url::parse(auth_url).unwrap();
    let params: HashMap<_, _> = auth_url.query_pairs().into_owned().collect();

    let mut redirect = Url::parse(&params["redirect_uri"]).unwrap();
    redirect
        .query_pairs_mut()
        .extend_pairs(extra)
        .append_pair("state", &params["state"]);

    let addr = format!(
        "{}:{}",
        redirect.host_str().unwrap(),
        redirect.port().unwrap()
    );
    let target = format!("{}?{}", redirect.path(), redirect.query().unwrap_or_default());

    thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "GET {target} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n").unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response);
    });
}

/// Ambient source that yields a service-account credential.
pub struct FakeAmbient {
    granted: Vec<String>,
}

impl FakeAmbient {
    pub fn granting(scopes: &[&str]) -> Self {
        Self {
            granted: scopes.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

#[async_trait]
impl AmbientSource for FakeAmbient {
    async fn credential(&self, _scopes: &ScopeSet) -> std::result::Result<Credential, Unavailable> {
        Ok(Credential {
            access_token: "ambient-token".into(),
            refresh_token: None,
            scopes: self.granted.iter().cloned().collect(),
            expires_at: None,
            source: CredentialSource::ApplicationDefault(AmbientKind::ServiceAccount),
        })
    }
}

/// Serve one canned HTTP response on an ephemeral port.
///
/// Returns the base URL and a handle yielding the raw request, body included.
pub fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&request) {
                break;
            }
        }
        write!(
            stream,
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
        .unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });

    (base, handle)
}

fn request_complete(request: &[u8]) -> bool {
    let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= end + 4 + length
}
