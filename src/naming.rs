// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Collision-free destination names and the move itself

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Stage;
use crate::{MagicHandError, Result};

/// Highest numeric suffix tried before giving up
pub const MAX_SUFFIX: u32 = 9_999;

/// `name`, then `stem (1).ext`, `stem (2).ext`, ...
fn candidate(original_name: &str, n: u32) -> String {
    if n == 0 {
        return original_name.to_string();
    }

    let path = Path::new(original_name);
    let stem = path.file_stem().and_then(|s| s.to_str());
    let ext = path.extension().and_then(|e| e.to_str());
    match (stem, ext) {
        (Some(stem), Some(ext)) => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", original_name, n),
    }
}

/// First name in `dir` that does not exist yet. Only a hint: use
/// [`move_into`] to claim the name and move in one step.
pub fn resolve(dir: &Path, original_name: &str) -> Result<PathBuf> {
    for n in 0..=MAX_SUFFIX {
        let path = dir.join(candidate(original_name, n));
        if fs::symlink_metadata(&path).is_err() {
            return Ok(path);
        }
    }
    Err(exhausted(dir, original_name, MAX_SUFFIX))
}

fn exhausted(dir: &Path, original_name: &str, max_suffix: u32) -> MagicHandError {
    MagicHandError::NamingExhausted {
        dir: dir.to_path_buf(),
        name: original_name.to_string(),
        attempts: max_suffix.saturating_add(1),
    }
}

/// Move `src` into `dir` under the first free variant of `original_name`.
///
/// Each candidate is claimed with an exclusive create before the source is
/// renamed over it, so two concurrent moves can never pick the same name.
/// On any failure the claim is released and `src` is left untouched.
pub fn move_into(src: &Path, dir: &Path, original_name: &str) -> Result<PathBuf> {
    move_into_with_limit(src, dir, original_name, MAX_SUFFIX)
}

/// [`move_into`] trying suffixes up to `max_suffix` only
pub fn move_into_with_limit(src: &Path, dir: &Path, original_name: &str, max_suffix: u32) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| MagicHandError::transient(Stage::Resolve, dir, e))?;

    for n in 0..=max_suffix {
        let target = dir.join(candidate(original_name, n));

        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(MagicHandError::transient(Stage::Resolve, &target, e)),
        }

        return match place(src, &target) {
            Ok(()) => Ok(target),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&target) {
                    warn!("Could not release claimed name {:?}: {}", target, cleanup);
                }
                Err(MagicHandError::transient(Stage::Move, src, e))
            }
        };
    }

    Err(exhausted(dir, original_name, max_suffix))
}

/// Replace the claimed placeholder at `target` with `src`
fn place(src: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(src, target) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // Different volume: copy, verify, then drop the source
            debug!("Rename failed ({}), copying {:?} instead", rename_err, src);
            let expected = fs::metadata(src)?.len();
            let copied = fs::copy(src, target)?;
            if copied != expected {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("short copy: {} of {} bytes", copied, expected),
                ));
            }
            fs::remove_file(src)
        }
    }
}
