// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for MagicHand

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for MagicHand operations
pub type Result<T> = std::result::Result<T, MagicHandError>;

/// Pipeline stage an error was raised in, for log context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fingerprint,
    Preview,
    Classify,
    Resolve,
    Move,
    Journal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fingerprint => "fingerprint",
            Stage::Preview => "preview",
            Stage::Classify => "classify",
            Stage::Resolve => "resolve",
            Stage::Move => "move",
            Stage::Journal => "journal",
        };
        f.write_str(name)
    }
}

/// MagicHand error types
#[derive(Error, Debug)]
pub enum MagicHandError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// File vanished, permission denied, path too long. Retried on the next event.
    #[error("I/O error during {stage} for {path:?}: {source}")]
    TransientIo {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Remote classification failed: {0}")]
    RemoteClassification(String),

    #[error("Malformed classification response: {0:?}")]
    MalformedResponse(String),

    #[error("No free name for {name:?} in {dir:?} after {attempts} attempts")]
    NamingExhausted {
        dir: PathBuf,
        name: String,
        attempts: u32,
    },

    #[error("Invalid category name: {0:?}")]
    InvalidCategory(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MagicHandError {
    /// Wrap an I/O error with the stage and path it happened on
    pub fn transient(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TransientIo {
            stage,
            path: path.into(),
            source,
        }
    }

    /// Errors the content classifier recovers from by falling back to `Others`
    pub fn is_classification_fallback(&self) -> bool {
        matches!(
            self,
            Self::RemoteClassification(_) | Self::MalformedResponse(_)
        )
    }

    /// Stage the error belongs to, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::TransientIo { stage, .. } => Some(*stage),
            Self::RemoteClassification(_) | Self::MalformedResponse(_) => Some(Stage::Classify),
            Self::NamingExhausted { .. } => Some(Stage::Resolve),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MagicHandError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::RemoteClassification(format!("request timed out: {}", err))
        } else {
            Self::RemoteClassification(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_classification() {
        assert!(MagicHandError::RemoteClassification("timeout".into()).is_classification_fallback());
        assert!(MagicHandError::MalformedResponse("Banana".into()).is_classification_fallback());
        assert!(!MagicHandError::Config("bad".into()).is_classification_fallback());
    }

    #[test]
    fn test_transient_carries_stage() {
        let err = MagicHandError::transient(
            Stage::Move,
            "/tmp/a.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.stage(), Some(Stage::Move));
        assert!(err.to_string().contains("move"));
    }
}
