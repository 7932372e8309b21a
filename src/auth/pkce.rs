//! PKCE (Proof Key for Code Exchange) and anti-forgery state tokens.
//!
//! RFC 7636: <https://datatracker.ietf.org/doc/html/rfc7636>

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Code challenge method sent with the authorization request.
pub const CHALLENGE_METHOD: &str = "S256";

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// Sent with the token exchange (43 chars, base64url).
    pub verifier: String,
    /// Sent with the authorization request.
    pub challenge: String,
}

impl Pkce {
    #[must_use]
    pub fn generate() -> Self {
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes());
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// S256 challenge for a verifier.
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random state value echoed back on the redirect.
#[must_use]
pub fn state_token() -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(random_bytes()))
}

fn random_bytes() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    bytes
}
