use chrono::{DateTime, Utc};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECS: i64 = 30;

/// An OAuth2 token as persisted on disk.
///
/// Field names follow the common `oauth2` JSON layout (`access_token`,
/// `token_type`, `refresh_token`, `expiry`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + chrono::Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    pub fn from_token_response(token: &BasicTokenResponse) -> Self {
        let expiry = token.expires_in().map(|expires_in: Duration| {
            Utc::now() + chrono::Duration::seconds(expires_in.as_secs() as i64)
        });

        Self {
            access_token: token.access_token().secret().clone(),
            token_type: default_token_type(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expiry,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("no saved token at {0}")]
    NotFound(PathBuf),

    #[error("saved token at {path} is unreadable: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode token: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reads and writes the single saved token file
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<StoredToken, TokenStoreError> {
        let json = fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                TokenStoreError::NotFound(self.path.clone())
            } else {
                self.io_error(source)
            }
        })?;

        serde_json::from_str(&json).map_err(|source| TokenStoreError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    /// Overwrite the saved token.
    ///
    /// The token is written to a temp file next to the target and renamed
    /// into place, so readers see either the old or the new token.
    pub fn save(&self, token: &StoredToken) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            create_private_dir(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec_pretty(token).map_err(TokenStoreError::Encode)?;

        let tmp_path = self.path.with_extension("json.tmp");
        let result = write_private_file(&tmp_path, &json)
            .and_then(|_| fs::rename(&tmp_path, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.io_error(e));
        }

        tracing::debug!("Saved token to {}", self.path.display());
        Ok(())
    }

    /// Delete the saved token. Returns false if there was none.
    pub fn remove(&self) -> Result<bool, TokenStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: io::Error) -> TokenStoreError {
        TokenStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
