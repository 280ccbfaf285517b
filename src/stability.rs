// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File settling detection
//!
//! A file is only handed to the organizer once its size has stayed the same
//! for a full quiescence window. The default detector polls sizes on every
//! tick of the event loop; platforms with a reliable "write finished" signal
//! can plug in another [`StabilityDetector`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::watcher::{FileEvent, IgnoreRules};

/// Source of current file sizes
pub trait SizeProbe: Send {
    /// Size of the regular file at `path`, or `None` if it is gone or not a file
    fn size(&self, path: &Path) -> Option<u64>;
}

/// Reads sizes from the file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSizeProbe;

impl SizeProbe for FsSizeProbe {
    fn size(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }
}

/// A file waiting to settle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub last_size: Option<u64>,
    pub last_seen_at: Instant,
    pub stable_since: Option<Instant>,
    /// Settled and signalled, waiting for the organizer to take it
    pub ready: bool,
}

/// Decides when a changing file is safe to touch
pub trait StabilityDetector: Send {
    /// Record an event. Returns false if the path is ignored.
    fn observe(&mut self, event: &FileEvent) -> bool;

    /// Re-check tracked files and return those that became ready on this tick.
    /// A path is returned once per stabilization.
    fn tick(&mut self, now: Instant) -> Vec<PathBuf>;

    /// Files that are ready but have not been taken yet
    fn ready_paths(&self) -> Vec<PathBuf>;

    /// Hand a ready file over to the organizer. `None` if it is not ready.
    fn take(&mut self, path: &Path) -> Option<PendingFile>;

    /// Stop tracking a path (deleted or moved away)
    fn forget(&mut self, path: &Path);

    fn is_tracking(&self, path: &Path) -> bool;

    fn pending_count(&self) -> usize;
}

/// Timer-driven detector comparing sizes between ticks
pub struct PollingStabilityDetector<P: SizeProbe = FsSizeProbe> {
    window: Duration,
    rules: IgnoreRules,
    probe: P,
    pending: HashMap<PathBuf, PendingFile>,
}

impl PollingStabilityDetector<FsSizeProbe> {
    pub fn new(window: Duration, rules: IgnoreRules) -> Self {
        Self::with_probe(window, rules, FsSizeProbe)
    }
}

impl<P: SizeProbe> PollingStabilityDetector<P> {
    pub fn with_probe(window: Duration, rules: IgnoreRules, probe: P) -> Self {
        Self {
            window,
            rules,
            probe,
            pending: HashMap::new(),
        }
    }
}

impl<P: SizeProbe> StabilityDetector for PollingStabilityDetector<P> {
    fn observe(&mut self, event: &FileEvent) -> bool {
        if !self.rules.should_process(&event.path) {
            trace!("Ignoring event for {:?}", event.path);
            return false;
        }

        match self.pending.get_mut(&event.path) {
            Some(pending) => {
                if pending.ready {
                    debug!("Re-arming {:?}, touched again before pickup", event.path);
                }
                pending.last_seen_at = event.observed_at;
                pending.stable_since = None;
                pending.ready = false;
            }
            None => {
                debug!("Stabilizing {:?} ({:?})", event.path, event.kind);
                self.pending.insert(
                    event.path.clone(),
                    PendingFile {
                        path: event.path.clone(),
                        last_size: None,
                        last_seen_at: event.observed_at,
                        stable_since: None,
                        ready: false,
                    },
                );
            }
        }
        true
    }

    fn tick(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut ready = Vec::new();
        let mut gone = Vec::new();

        for (path, pending) in self.pending.iter_mut() {
            let size = match self.probe.size(path) {
                Some(size) => size,
                None => {
                    gone.push(path.clone());
                    continue;
                }
            };

            if pending.ready {
                continue;
            }

            match (pending.last_size, pending.stable_since) {
                (Some(last), Some(since)) if last == size => {
                    if now.saturating_duration_since(since) >= self.window {
                        pending.ready = true;
                        ready.push(path.clone());
                    }
                }
                _ => {
                    trace!("{:?} size now {} bytes, restarting window", path, size);
                    pending.last_size = Some(size);
                    pending.stable_since = Some(now);
                }
            }
        }

        for path in gone {
            debug!("File disappeared before pickup: {:?}", path);
            self.pending.remove(&path);
        }

        ready.sort();
        ready
    }

    fn ready_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .pending
            .values()
            .filter(|p| p.ready)
            .map(|p| p.path.clone())
            .collect();
        paths.sort();
        paths
    }

    fn take(&mut self, path: &Path) -> Option<PendingFile> {
        if self.pending.get(path).is_some_and(|p| p.ready) {
            self.pending.remove(path)
        } else {
            None
        }
    }

    fn forget(&mut self, path: &Path) {
        if self.pending.remove(path).is_some() {
            debug!("Stopped tracking {:?}", path);
        }
    }

    fn is_tracking(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }

    fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
