//! Credential storage
//!
//! The lifecycle manager is the only writer: it stores the rotated pair after a
//! refresh and clears it on logout. Everything else in the application reads.

use crate::models::TokenPair;
use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Credential store failures
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("credential serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value holder of the current access/refresh token pair
pub trait CredentialStore: Send + Sync {
    /// Current token pair, if any
    fn get(&self) -> Option<TokenPair>;

    /// Replace the stored token pair
    ///
    /// # Errors
    ///
    /// Returns an error if the pair cannot be persisted.
    fn set(&self, tokens: TokenPair) -> Result<(), CredentialError>;

    /// Remove the stored token pair; clearing an empty store succeeds
    ///
    /// # Errors
    ///
    /// Returns an error if persisted credentials cannot be removed.
    fn clear(&self) -> Result<(), CredentialError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<TokenPair> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, tokens: TokenPair) -> Result<(), CredentialError> {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Store persisting the token pair as a JSON file
///
/// A missing file reads as "no credentials". A corrupt file is logged and
/// also treated as empty so the user is simply asked to sign in again.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes read-modify-write access from different tasks
    lock: RwLock<()>,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<TokenPair> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(
                    "Failed to read credential file {}: {e}",
                    self.path.display()
                );
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!(
                    "Ignoring unreadable credential file {}: {e}",
                    self.path.display()
                );
                None
            }
        }
    }

    fn set(&self, tokens: TokenPair) -> Result<(), CredentialError> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write then rename so readers never observe a half-written file
        let tmp_path = self.path.with_extension("tmp");
        write_owner_only(&tmp_path, &serde_json::to_vec(&tokens)?)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!("Stored credentials in {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);

        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed credential file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `contents` to `path` readable by the owner only
fn write_owner_only(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path)?;
    // mode() only applies on creation; a leftover tmp file keeps its old bits
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    file.sync_all()
}
