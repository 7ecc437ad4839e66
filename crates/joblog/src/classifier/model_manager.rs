//! Integrity-checked access to the classifier's model asset.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::ClassifierConfig;

/// Errors that can occur while locating or verifying a model asset.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model asset not found: {0}")]
    Missing(PathBuf),

    #[error("Checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Invalid checksum '{0}': expected 64 hex characters")]
    InvalidChecksum(String),

    #[error("Failed to read model asset '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid model asset '{path}': {reason}")]
    InvalidAsset { path: PathBuf, reason: String },

    #[error("No model asset configured")]
    NotConfigured,
}

/// Locates the model asset and refuses to hand it out unless its SHA-256
/// matches the expected checksum. There is no fallback asset.
#[derive(Debug, Clone)]
pub struct ModelManager {
    asset_path: PathBuf,
    expected_sha256: String,
}

impl ModelManager {
    /// Creates a manager for `asset_path` with a hex SHA-256 checksum.
    pub fn new(asset_path: impl AsRef<Path>, expected_sha256: &str) -> Result<Self, ModelError> {
        let expected_sha256 = expected_sha256.trim().to_ascii_lowercase();
        let valid = hex::decode(&expected_sha256).is_ok_and(|bytes| bytes.len() == 32);
        if !valid {
            return Err(ModelError::InvalidChecksum(expected_sha256));
        }
        Ok(Self {
            asset_path: asset_path.as_ref().to_path_buf(),
            expected_sha256,
        })
    }

    /// Creates a model manager from classifier config.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ModelError> {
        match (&config.lexicon_path, &config.sha256) {
            (Some(path), Some(sha256)) => Self::new(path, sha256),
            _ => Err(ModelError::NotConfigured),
        }
    }

    pub fn asset_path(&self) -> &Path {
        &self.asset_path
    }

    pub fn expected_sha256(&self) -> &str {
        &self.expected_sha256
    }

    pub fn is_asset_available(&self) -> bool {
        self.asset_path.is_file()
    }

    /// Returns the asset size in bytes if available.
    pub fn asset_size(&self) -> Option<u64> {
        std::fs::metadata(&self.asset_path).ok().map(|m| m.len())
    }

    /// Hex SHA-256 of the file at `path`.
    pub fn compute_sha256(path: &Path) -> Result<String, ModelError> {
        let mut file = File::open(path).map_err(|e| ModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher).map_err(|e| ModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(hex::encode(hasher.finalize()))
    }

    /// Returns the asset path once it exists and its checksum matches.
    pub fn ensure_asset(&self) -> Result<&Path, ModelError> {
        if !self.is_asset_available() {
            return Err(ModelError::Missing(self.asset_path.clone()));
        }

        let actual = Self::compute_sha256(&self.asset_path)?;
        if actual != self.expected_sha256 {
            return Err(ModelError::ChecksumMismatch {
                path: self.asset_path.clone(),
                expected: self.expected_sha256.clone(),
                actual,
            });
        }

        debug!("Model asset verified: {}", self.asset_path.display());
        Ok(&self.asset_path)
    }

    /// Verifies and reads the whole asset.
    pub fn read_verified(&self) -> Result<Vec<u8>, ModelError> {
        let path = self.ensure_asset()?;
        let bytes = std::fs::read(path).map_err(|e| ModelError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(
            "Loaded model asset {} ({} bytes)",
            path.display(),
            bytes.len()
        );
        Ok(bytes)
    }
}
