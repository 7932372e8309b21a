use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote API error: HTTP {status}: {body}")]
    RemoteApi { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    /// True for failures where no usable credential could be obtained.
    #[must_use]
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential(_))
    }

    /// Short human-readable description, extracting the Google error message
    /// from remote API bodies when one is present.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::RemoteApi { status, body } => match remote_error_message(body) {
                Some(msg) => format!("HTTP {status}: {msg}"),
                None => self.to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Extract the message from a Google API error body.
///
/// Handles `{"error": {"message": "...", "status": "..."}}`,
/// `{"error": "...", "error_description": "..."}` (OAuth endpoints) and
/// `{"message": "..."}`.
#[must_use]
pub fn remote_error_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;

    if let Some(error) = json.get("error") {
        if let Some(msg) = error.get("message").and_then(|v| v.as_str()) {
            return Some(match error.get("status").and_then(|v| v.as_str()) {
                Some(status) => format!("{msg} (status: {status})"),
                None => msg.to_string(),
            });
        }

        if let Some(code) = error.as_str() {
            return Some(match json.get("error_description").and_then(|v| v.as_str()) {
                Some(desc) => format!("{code}: {desc}"),
                None => code.to_string(),
            });
        }
    }

    json.get("message")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

pub type Result<T> = std::result::Result<T, Error>;
