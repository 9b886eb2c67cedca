//! Persisted local identity
//!
//! Each participant presents a stable random identity string when joining a
//! room; the host keys its per-joiner negotiation state by it. The value is
//! generated once from the OS RNG and persisted under a fixed location so
//! restarts keep the same identity.

use std::path::{Path, PathBuf};

use rand::RngCore;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Length of a generated identity string
pub const IDENTITY_LEN: usize = 64;

const IDENTITY_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

const STATE_DIR: &str = "peerlink";
const IDENTITY_FILE: &str = "identity";

/// Generate a fresh random identity from the OS RNG
pub fn generate_identity() -> String {
    let mut bytes = [0u8; IDENTITY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| IDENTITY_CHARSET[*b as usize % IDENTITY_CHARSET.len()] as char)
        .collect()
}

/// File-backed identity storage: read on startup, written once if absent
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Identity stored at an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Identity stored in the per-user state directory
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| Error::Identity("no local data directory available".to_string()))?;
        Ok(Self::new(base.join(STATE_DIR).join(IDENTITY_FILE)))
    }

    /// The backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the persisted identity, generating and persisting one first
    /// if none exists yet.
    pub async fn load_or_generate(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let identity = contents.trim().to_string();
                if !identity.is_empty() {
                    debug!(path = %self.path.display(), "loaded persisted identity");
                    return Ok(identity);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let identity = generate_identity();
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, &identity).await?;
        info!(path = %self.path.display(), "generated new local identity");
        Ok(identity)
    }
}
