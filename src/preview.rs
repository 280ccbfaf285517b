// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Bounded content excerpts for the content classifier

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Stage;
use crate::{MagicHandError, Result};

/// What the language model gets to see of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPreview {
    /// Leading text, cut on a char boundary
    Text { excerpt: String, truncated: bool },
    /// Non-text data, described instead of quoted
    Binary { size: u64, mime: String },
}

impl ContentPreview {
    pub fn is_binary(&self) -> bool {
        matches!(self, ContentPreview::Binary { .. })
    }
}

impl fmt::Display for ContentPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentPreview::Text { excerpt, truncated } => {
                f.write_str(excerpt)?;
                if *truncated {
                    f.write_str("\n[...]")?;
                }
                Ok(())
            }
            ContentPreview::Binary { size, mime } => {
                write!(f, "[binary data, {} bytes, type {}]", size, mime)
            }
        }
    }
}

/// Read at most `max_bytes` from the start of the file. Nothing is written
/// to disk.
pub fn extract(path: &Path, mime: &str, max_bytes: usize) -> Result<ContentPreview> {
    let file = File::open(path).map_err(|e| MagicHandError::transient(Stage::Preview, path, e))?;
    let size = file
        .metadata()
        .map_err(|e| MagicHandError::transient(Stage::Preview, path, e))?
        .len();

    let mut buf = Vec::with_capacity(max_bytes.min(64 * 1024));
    file.take(max_bytes as u64)
        .read_to_end(&mut buf)
        .map_err(|e| MagicHandError::transient(Stage::Preview, path, e))?;

    let truncated = (buf.len() as u64) < size;
    Ok(match decode_text(&buf) {
        Some(excerpt) => ContentPreview::Text { excerpt, truncated },
        None => ContentPreview::Binary {
            size,
            mime: mime.to_string(),
        },
    })
}

/// Decode as UTF-8 text, tolerating a multi-byte char cut off at the end
fn decode_text(bytes: &[u8]) -> Option<String> {
    if bytes.contains(&0) {
        return None;
    }

    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => {
            // Incomplete sequence at the very end
            std::str::from_utf8(&bytes[..e.valid_up_to()]).ok()?
        }
        Err(_) => return None,
    };

    let control = text
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\u{c}'))
        .count();
    if control * 10 > text.chars().count().max(1) {
        return None;
    }

    Some(text.to_string())
}
