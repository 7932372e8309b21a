//! Persisted consent records.

use super::credential::{Credential, CredentialSource};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name inside the store directory.
pub const STORE_FILE: &str = "StoredCredential.json";

/// Tokens obtained from a completed consent flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry (milliseconds since epoch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,
    /// Scopes granted with this token.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Client the refresh token was issued to.
    pub client_id: String,
}

impl ConsentRecord {
    #[must_use]
    pub fn from_credential(credential: &Credential, client_id: &str) -> Self {
        Self {
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            expires_at_ms: credential.expires_at.map(|at| at.timestamp_millis()),
            scopes: credential.scopes.iter().cloned().collect(),
            client_id: client_id.to_string(),
        }
    }

    #[must_use]
    pub fn to_credential(&self) -> Credential {
        Credential {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            scopes: self.scopes.iter().cloned().collect(),
            expires_at: self.expires_at_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
            source: CredentialSource::StoredConsent,
        }
    }
}

/// Storage file format: user id to record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(flatten)]
    users: HashMap<String, ConsentRecord>,
}

/// Consent record store rooted at a directory.
#[derive(Debug, Clone)]
pub struct ConsentStore {
    path: PathBuf,
}

impl ConsentStore {
    /// Open the store in `dir`. The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STORE_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record for a user.
    pub fn load(&self, user_id: &str) -> Result<Option<ConsentRecord>> {
        let file = self.read_file()?;
        Ok(file.users.get(user_id).cloned())
    }

    /// Save the record for a user, replacing any previous one.
    pub fn save(&self, user_id: &str, record: ConsentRecord) -> Result<()> {
        let mut file = self.read_file()?;
        file.users.insert(user_id.to_string(), record);
        self.write_file(&file)
    }

    /// Remove the record for a user. Returns whether one existed.
    pub fn clear(&self, user_id: &str) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let mut file = self.read_file()?;
        let removed = file.users.remove(user_id).is_some();
        if removed {
            self.write_file(&file)?;
        }
        Ok(removed)
    }

    /// List user ids with stored records.
    pub fn list(&self) -> Result<Vec<String>> {
        let file = self.read_file()?;
        let mut users: Vec<_> = file.users.into_keys().collect();
        users.sort();
        Ok(users)
    }

    fn read_file(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }

        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&content) {
            Ok(file) => Ok(file),
            Err(e) => {
                // A corrupt store behaves like an empty one; the next save rewrites it.
                tracing::warn!("Ignoring unreadable consent store {}: {e}", self.path.display());
                Ok(StoreFile::default())
            }
        }
    }

    fn write_file(&self, file: &StoreFile) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = serde_json::to_string_pretty(file)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut out = options.open(&self.path)?;

        // mode() only applies when the file is created
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            out.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        out.write_all(content.as_bytes())?;
        Ok(())
    }
}
