// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher for the desktop directory

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::Result;

/// Kind of change that may mean a file needs organizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
}

/// A raw change notification for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub observed_at: Instant,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind) -> Self {
        Self::at(path, kind, Instant::now())
    }

    pub fn at(path: impl Into<PathBuf>, kind: FileEventKind, observed_at: Instant) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at,
        }
    }
}

/// Events emitted by the watcher
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A file was created or written to
    File(FileEvent),
    /// A file was deleted or moved away
    Removed(PathBuf),
    /// Watcher error
    Error(String),
}

/// Non-recursive watcher over a single directory
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    root: Option<PathBuf>,
    event_rx: UnboundedReceiver<WatchEvent>,
}

impl FileWatcher {
    /// Create a new file watcher
    pub fn new() -> Result<Self> {
        let (tx, rx) = unbounded_channel();

        let config = Config::default().with_poll_interval(Duration::from_secs(2));

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| forward(&tx, res),
            config,
        )?;

        Ok(Self {
            watcher,
            root: None,
            event_rx: rx,
        })
    }

    /// Start watching a directory, creating it if needed
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
            info!("Created watch directory: {:?}", path);
        }

        if let Some(previous) = self.root.take() {
            self.watcher.unwatch(&previous)?;
        }

        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.root = Some(path.to_path_buf());
        info!("Watching: {:?}", path);

        Ok(())
    }

    /// Wait for the next event. `None` once the watcher is gone.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.event_rx.recv().await
    }
}

fn forward(tx: &UnboundedSender<WatchEvent>, res: notify::Result<Event>) {
    let events = match res {
        Ok(event) => convert_event(event, Instant::now()),
        Err(e) => vec![WatchEvent::Error(e.to_string())],
    };
    for event in events {
        if tx.send(event).is_err() {
            debug!("Watch receiver dropped");
            return;
        }
    }
}

/// Convert notify event to our event type
fn convert_event(event: Event, now: Instant) -> Vec<WatchEvent> {
    match event.kind {
        EventKind::Create(_) => event
            .paths
            .into_iter()
            .map(|p| WatchEvent::File(FileEvent::at(p, FileEventKind::Created, now)))
            .collect(),
        // A rename pair reports [from, to]; the destination is a new arrival
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let from = paths.next();
            let to = paths.next();
            from.map(WatchEvent::Removed)
                .into_iter()
                .chain(to.map(|p| WatchEvent::File(FileEvent::at(p, FileEventKind::Created, now))))
                .collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(WatchEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .into_iter()
            .map(|p| WatchEvent::File(FileEvent::at(p, FileEventKind::Created, now)))
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event
            .paths
            .into_iter()
            .map(|p| WatchEvent::File(FileEvent::at(p, FileEventKind::Modified, now)))
            .collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(WatchEvent::Removed).collect(),
        _ => Vec::new(),
    }
}

const TEMP_SUFFIXES: [&str; 7] = [
    ".tmp", ".part", ".crdownload", ".partial", ".download", ".swp", ".opdownload",
];

const SYSTEM_FILES: [&str; 3] = ["desktop.ini", "thumbs.db", ".ds_store"];

/// Name-based filter for files that must never be touched
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    extra_suffixes: Vec<String>,
}

impl IgnoreRules {
    pub fn new(extra_suffixes: &[String]) -> Self {
        let extra_suffixes = extra_suffixes
            .iter()
            .map(|s| {
                let s = s.trim().to_lowercase();
                if s.starts_with('.') { s } else { format!(".{}", s) }
            })
            .filter(|s| s.len() > 1)
            .collect();
        Self { extra_suffixes }
    }

    /// Check if a file should be processed
    pub fn should_process(&self, path: &Path) -> bool {
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };

        // Skip hidden files
        if filename.starts_with('.') {
            return false;
        }

        let lower = filename.to_lowercase();
        if TEMP_SUFFIXES.iter().any(|ext| lower.ends_with(ext))
            || self.extra_suffixes.iter().any(|ext| lower.ends_with(ext.as_str()))
        {
            return false;
        }

        if SYSTEM_FILES.iter().any(|n| lower == *n) {
            return false;
        }

        true
    }
}

/// Synthetic `Created` events for files already sitting in `dir`
pub fn scan_existing(dir: &Path, rules: &IgnoreRules) -> Result<Vec<FileEvent>> {
    let mut events = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && rules.should_process(&path) {
            events.push(FileEvent::new(path, FileEventKind::Created));
        }
    }
    events.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(events)
}
