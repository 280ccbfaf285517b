// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Journal of completed moves, used for undo

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::cache::ClassificationSource;
use crate::category::Category;
use crate::error::Stage;
use crate::naming;
use crate::{MagicHandError, Result};

/// A single move in the journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub original_path: PathBuf,
    pub new_path: PathBuf,
    pub category: Category,
    pub source: ClassificationSource,
    pub fingerprint: String,
    pub undone: bool,
}

impl HistoryEntry {
    pub fn new(
        original_path: PathBuf,
        new_path: PathBuf,
        category: Category,
        source: ClassificationSource,
        fingerprint: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            original_path,
            new_path,
            category,
            source,
            fingerprint,
            undone: false,
        }
    }
}

/// What an undo run did. Entries in `failed` stay in the journal as not undone.
#[derive(Debug, Default)]
pub struct UndoReport {
    pub restored: Vec<(HistoryEntry, PathBuf)>,
    pub failed: Vec<(HistoryEntry, MagicHandError)>,
}

/// Append-only JSON lines file of moves
pub struct History {
    path: PathBuf,
    lock: Mutex<()>,
}

impl History {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Append an entry to the journal
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());

        let journal_err = |e: std::io::Error| MagicHandError::transient(Stage::Journal, &self.path, e);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(journal_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(journal_err)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json).map_err(journal_err)?;

        Ok(())
    }

    /// Read all journal entries
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("Failed to parse history entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Get the most recent N entries (newest first)
    pub fn get_recent(&self, count: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    /// Mark entries as undone, rewriting the file
    fn mark_undone(&self, ids: &[String]) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let entries = self.read_all()?;

        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut writer = std::io::BufWriter::new(File::create(&tmp)?);
            for mut entry in entries {
                if ids.contains(&entry.id) {
                    entry.undone = true;
                }
                writeln!(writer, "{}", serde_json::to_string(&entry)?)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Move the `count` most recent files out of the library, into `dest_dir`
    /// or else back to the folder they came from. Files restored onto a
    /// watched desktop will be organized again; the Manual Library is the
    /// usual destination. A file that cannot be restored is reported and
    /// the rest carry on.
    pub fn undo(&self, count: usize, dest_dir: Option<&Path>, dry_run: bool) -> Result<UndoReport> {
        let to_undo: Vec<HistoryEntry> = self
            .read_all()?
            .into_iter()
            .filter(|e| !e.undone)
            .rev()
            .take(count)
            .collect();

        let mut report = UndoReport::default();
        for entry in to_undo {
            if !entry.new_path.exists() {
                warn!("File not found (may have been moved/deleted): {:?}", entry.new_path);
                continue;
            }

            let dir = dest_dir.or_else(|| entry.original_path.parent());
            let (dir, name) = match (dir, entry.original_path.file_name()) {
                (Some(dir), Some(name)) => (dir.to_path_buf(), name.to_string_lossy().to_string()),
                _ => {
                    warn!("Cannot restore to {:?}", entry.original_path);
                    continue;
                }
            };

            let back = if dry_run {
                naming::resolve(&dir, &name)
            } else {
                naming::move_into(&entry.new_path, &dir, &name)
            };
            match back {
                Ok(back) => {
                    if !dry_run {
                        info!("Restored {:?} -> {:?}", entry.new_path, back);
                    }
                    report.restored.push((entry, back));
                }
                Err(e) => {
                    warn!("Failed to restore {:?}: {}", entry.new_path, e);
                    report.failed.push((entry, e));
                }
            }
        }

        if !dry_run && !report.restored.is_empty() {
            let ids: Vec<String> = report.restored.iter().map(|(e, _)| e.id.clone()).collect();
            self.mark_undone(&ids)?;
        }

        Ok(report)
    }

    /// Clear the whole journal
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(from: &Path, to: &Path) -> HistoryEntry {
        HistoryEntry::new(
            from.to_path_buf(),
            to.to_path_buf(),
            Category::Documents,
            ClassificationSource::Heuristic,
            "blake3:00".to_string(),
        )
    }

    #[test]
    fn test_append_and_recent() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("history.jsonl"));
        history.append(&entry(Path::new("/d/a"), Path::new("/l/a"))).unwrap();
        history.append(&entry(Path::new("/d/b"), Path::new("/l/b"))).unwrap();

        let recent = history.get_recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].original_path, PathBuf::from("/d/b"));
        assert_eq!(history.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_undo_restores_file() {
        let desk = tempfile::tempdir().unwrap();
        let lib = tempfile::tempdir().unwrap();
        let history = History::new(lib.path().join("history.jsonl"));

        let original = desk.path().join("report.pdf");
        let moved = lib.path().join("report.pdf");
        fs::write(&moved, "content").unwrap();
        history.append(&entry(&original, &moved)).unwrap();

        let preview = history.undo(1, None, true).unwrap();
        assert_eq!(preview.restored.len(), 1);
        assert!(moved.exists());

        let report = history.undo(1, None, false).unwrap();
        assert_eq!(report.restored[0].1, original);
        assert_eq!(fs::read_to_string(&original).unwrap(), "content");
        assert!(!moved.exists());

        // nothing left to undo
        assert!(history.undo(1, None, false).unwrap().restored.is_empty());
        assert!(history.read_all().unwrap()[0].undone);
    }

    #[test]
    fn test_undo_does_not_clobber() {
        let desk = tempfile::tempdir().unwrap();
        let lib = tempfile::tempdir().unwrap();
        let history = History::new(lib.path().join("history.jsonl"));

        let original = desk.path().join("a.txt");
        fs::write(&original, "new file with same name").unwrap();
        let moved = lib.path().join("a.txt");
        fs::write(&moved, "old").unwrap();
        history.append(&entry(&original, &moved)).unwrap();

        let report = history.undo(1, None, false).unwrap();
        assert_eq!(report.restored[0].1, desk.path().join("a (1).txt"));
        assert_eq!(fs::read_to_string(&original).unwrap(), "new file with same name");
    }

    #[test]
    fn test_undo_into_other_dir() {
        let desk = tempfile::tempdir().unwrap();
        let lib = tempfile::tempdir().unwrap();
        let manual = lib.path().join("Manual Library");
        let history = History::new(lib.path().join("history.jsonl"));

        let moved = lib.path().join("a.txt");
        fs::write(&moved, "x").unwrap();
        history.append(&entry(&desk.path().join("a.txt"), &moved)).unwrap();

        let report = history.undo(5, Some(&manual), false).unwrap();
        assert_eq!(report.restored[0].1, manual.join("a.txt"));
        assert!(!desk.path().join("a.txt").exists());
    }

    #[test]
    fn test_undo_failure_keeps_restored_entries_marked() {
        let desk = tempfile::tempdir().unwrap();
        let lib = tempfile::tempdir().unwrap();
        let history = History::new(lib.path().join("history.jsonl"));

        // "a" came from a folder that is now a regular file
        let blocked = desk.path().join("gone");
        fs::write(&blocked, "not a dir").unwrap();
        let moved_a = lib.path().join("a.txt");
        fs::write(&moved_a, "a").unwrap();
        history.append(&entry(&blocked.join("a.txt"), &moved_a)).unwrap();

        let moved_b = lib.path().join("b.txt");
        fs::write(&moved_b, "b").unwrap();
        history.append(&entry(&desk.path().join("b.txt"), &moved_b)).unwrap();

        let report = history.undo(2, None, false).unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(report.restored[0].1, desk.path().join("b.txt"));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.new_path, moved_a);

        assert!(moved_a.exists());
        assert!(desk.path().join("b.txt").exists());
        let undone: Vec<bool> = history.read_all().unwrap().iter().map(|e| e.undone).collect();
        assert_eq!(undone, vec![false, true]);

        // only the failed entry is left to retry
        let again = history.undo(2, None, false).unwrap();
        assert!(again.restored.is_empty());
        assert_eq!(again.failed.len(), 1);
    }

    #[test]
    fn test_append_failure_is_a_journal_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();
        let history = History::new(blocker.join("history.jsonl"));

        let err = history
            .append(&entry(Path::new("/d/a"), Path::new("/l/a")))
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Journal));
    }
}
