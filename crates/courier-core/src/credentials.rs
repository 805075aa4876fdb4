use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::PersonalKey;
use crate::error::{CodecError, StoreError};

/// Credential set issued by the relay on registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub client_id: String,
    pub api_token: String,
    /// Base64 of the 32-byte AES-256-GCM key shared with the relay.
    pub personal_token: String,
    #[serde(default)]
    pub fingerprint: String,
}

impl Credentials {
    pub fn personal_key(&self) -> Result<PersonalKey, CodecError> {
        PersonalKey::from_base64(&self.personal_token)
    }

    pub fn matches_fingerprint(&self, fingerprint: &str) -> bool {
        !self.fingerprint.is_empty() && self.fingerprint == fingerprint
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("api_token", &"<redacted>")
            .field("personal_token", &"<redacted>")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Single JSON credentials record on local disk.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Credentials>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path).map_err(|e| self.io(e))?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    pub fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        let data = serde_json::to_vec_pretty(credentials)?;
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(|e| self.io(e))?;
        file.write_all(&data).map_err(|e| self.io(e))?;
        file.flush().map_err(|e| self.io(e))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| self.io(e))?;
        }
        Ok(())
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
