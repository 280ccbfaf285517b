// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Classification cache keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use crate::error::Stage;
use crate::{MagicHandError, Result};

/// Fingerprint of a file's name and content, used to index the cache.
///
/// The digest covers the lower-cased file name, the byte length and the
/// full content, so an edited file never reuses a stale classification
/// and two identical blobs with different extensions stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationKey(String);

impl ClassificationKey {
    /// Fingerprint the file at `path`
    pub fn for_file(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut file = File::open(path).map_err(|e| MagicHandError::transient(Stage::Fingerprint, path, e))?;
        let len = file
            .metadata()
            .map_err(|e| MagicHandError::transient(Stage::Fingerprint, path, e))?
            .len();

        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&len.to_le_bytes());
        io::copy(&mut file, &mut hasher).map_err(|e| MagicHandError::transient(Stage::Fingerprint, path, e))?;

        Ok(Self(format!("blake3:{}", hasher.finalize().to_hex())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClassificationKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for ClassificationKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for ClassificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
