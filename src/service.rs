// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The long-running event loop
//!
//! One task owns the stability detector and multiplexes watcher events,
//! periodic ticks and the shutdown signal. Settled files are handed to the
//! organizer on worker tasks; on shutdown the workers get a grace period to
//! finish before they are aborted.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::organizer::{transition, FileState, Organizer, Processed};
use crate::stability::StabilityDetector;
use crate::watcher::{scan_existing, FileEvent, FileWatcher, IgnoreRules, WatchEvent};
use crate::Result;

/// Anything that yields watch events
#[async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Option<WatchEvent>;
}

#[async_trait]
impl EventSource for FileWatcher {
    async fn next_event(&mut self) -> Option<WatchEvent> {
        FileWatcher::next_event(self).await
    }
}

#[async_trait]
impl EventSource for UnboundedReceiver<WatchEvent> {
    async fn next_event(&mut self) -> Option<WatchEvent> {
        self.recv().await
    }
}

/// Counts of what happened to the files handed to the organizer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub organized: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Still changing when a one-shot run gave up waiting
    pub unsettled: usize,
}

impl Summary {
    fn record(&mut self, result: &Result<Processed>) {
        match result {
            Ok(Processed::Organized(_)) => self.organized += 1,
            Ok(_) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Detector time follows the tokio clock so paused-time tests line up
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

/// `None` when `after` reaches past what the clock can represent
fn deadline_after(after: Duration) -> Option<tokio::time::Instant> {
    tokio::time::Instant::now().checked_add(after)
}

fn announce_ready(paths: &[PathBuf]) {
    for path in paths {
        transition(path, FileState::Ready);
    }
}

/// Watches one directory and organizes whatever settles there
pub struct Service<D: StabilityDetector> {
    organizer: Arc<Organizer>,
    detector: D,
    tick: Duration,
    shutdown_grace: Duration,
    workers: JoinSet<(PathBuf, Result<Processed>)>,
    summary: Summary,
}

impl<D: StabilityDetector> Service<D> {
    pub fn new(organizer: Arc<Organizer>, detector: D, tick: Duration, shutdown_grace: Duration) -> Self {
        Self {
            organizer,
            detector,
            tick,
            shutdown_grace,
            workers: JoinSet::new(),
            summary: Summary::default(),
        }
    }

    /// Queue files that were already present before watching started
    pub fn seed(&mut self, events: impl IntoIterator<Item = FileEvent>) -> usize {
        let mut queued = 0;
        for event in events {
            if self.detector.observe(&event) {
                queued += 1;
            }
        }
        if queued > 0 {
            info!("Queued {} existing file(s)", queued);
        }
        queued
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    fn handle_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::File(event) => {
                let known = self.detector.is_tracking(&event.path);
                if self.detector.observe(&event) {
                    let state = if known { FileState::Stabilizing } else { FileState::Detected };
                    transition(&event.path, state);
                }
            }
            WatchEvent::Removed(path) => {
                if self.detector.is_tracking(&path) {
                    debug!("No longer tracking {:?}", path);
                }
                self.detector.forget(&path);
            }
            WatchEvent::Error(e) => warn!("Watcher error: {}", e),
        }
    }

    /// Hand every settled file that is not already being worked on to a worker
    fn dispatch_ready(&mut self) {
        announce_ready(&self.detector.tick(now()));

        for path in self.detector.ready_paths() {
            if self.organizer.is_in_flight(&path) {
                continue;
            }
            if self.detector.take(&path).is_none() {
                continue;
            }

            info!("Processing: {:?}", path);
            let organizer = self.organizer.clone();
            self.workers.spawn(async move {
                let result = organizer.process(&path).await;
                (path, result)
            });
        }
    }

    fn reap(&mut self, joined: std::result::Result<(PathBuf, Result<Processed>), tokio::task::JoinError>) {
        match joined {
            Ok((path, result)) => {
                if let Ok(outcome) = &result {
                    if !matches!(outcome, Processed::Organized(_)) {
                        debug!("{:?}: {:?}", path, outcome);
                    }
                }
                self.summary.record(&result);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                error!("Worker panicked: {}", e);
                self.summary.failed += 1;
            }
        }
    }

    /// Run until `shutdown` flips to true or the event source closes
    pub async fn run<S: EventSource>(
        mut self,
        mut events: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Summary {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
                event = events.next_event() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("Watcher closed, stopping");
                        break;
                    }
                },
                _ = ticker.tick() => self.dispatch_ready(),
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    self.reap(joined);
                }
            }
        }

        self.drain().await;
        self.summary
    }

    /// Let running workers finish, up to the grace period
    async fn drain(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        info!(
            "Waiting up to {:?} for {} file(s) in progress",
            self.shutdown_grace,
            self.workers.len()
        );

        let deadline = match deadline_after(self.shutdown_grace) {
            Some(deadline) => deadline,
            None => {
                while let Some(joined) = self.workers.join_next().await {
                    self.reap(joined);
                }
                return;
            }
        };
        loop {
            match tokio::time::timeout_at(deadline, self.workers.join_next()).await {
                Ok(Some(joined)) => self.reap(joined),
                Ok(None) => break,
                Err(_) => {
                    warn!("Aborting {} unfinished file(s)", self.workers.len());
                    self.workers.abort_all();
                    while let Some(joined) = self.workers.join_next().await {
                        self.reap(joined);
                    }
                    break;
                }
            }
        }
    }
}

/// Organize the files currently in `dir` once, still waiting for each to
/// settle. Gives up on files that keep changing after `max_wait`.
pub async fn organize_directory<D: StabilityDetector>(
    organizer: &Organizer,
    mut detector: D,
    dir: &Path,
    rules: &IgnoreRules,
    tick: Duration,
    max_wait: Duration,
) -> Result<Summary> {
    let mut summary = Summary::default();
    for event in scan_existing(dir, rules)? {
        detector.observe(&event);
    }
    info!("Found {} file(s) in {:?}", detector.pending_count(), dir);

    let deadline = deadline_after(max_wait);
    loop {
        announce_ready(&detector.tick(now()));
        for path in detector.ready_paths() {
            if detector.take(&path).is_some() {
                summary.record(&organizer.process(&path).await);
            }
        }

        if detector.pending_count() == 0 {
            break;
        }
        if deadline.is_some_and(|deadline| tokio::time::Instant::now() >= deadline) {
            summary.unsettled = detector.pending_count();
            warn!("{} file(s) still changing, left in place", summary.unsettled);
            break;
        }
        tokio::time::sleep(tick).await;
    }

    Ok(summary)
}
