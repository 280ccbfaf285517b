// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The organizer pipeline
//!
//! `process` takes one settled file through fingerprinting, classification
//! (cache, then heuristics, then the content classifier) and the move into
//! its category folder. A failure at any stage leaves the source where it
//! was and counts against a per-path retry budget.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::cache::{ClassificationResult, ClassificationSource, ClassifierCache};
use crate::category::Category;
use crate::config::AppConfig;
use crate::content::ContentClassifier;
use crate::error::Stage;
use crate::fingerprint::ClassificationKey;
use crate::heuristic::{guess_mime, HeuristicClassifier};
use crate::history::{History, HistoryEntry};
use crate::watcher::IgnoreRules;
use crate::{naming, preview, MagicHandError, Result};

/// Where a file is in its trip through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Detected,
    Stabilizing,
    Ready,
    Classifying,
    Resolving,
    Moving,
    Done,
    Failed,
}

/// Library folders the organizer writes to or must stay out of
#[derive(Debug, Clone)]
pub struct Libraries {
    pub root: PathBuf,
    pub ai_library: PathBuf,
    pub manual_library: PathBuf,
}

impl Libraries {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            root: config.library_root(),
            ai_library: config.ai_library(),
            manual_library: config.manual_library(),
        }
    }

    /// Anything under the library root is user or organizer territory
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            || path.starts_with(&self.ai_library)
            || path.starts_with(&self.manual_library)
    }
}

#[derive(Debug, Clone)]
pub struct OrganizerOptions {
    pub dry_run: bool,
    pub preview_bytes: usize,
    pub max_attempts: u32,
    pub retry_window: Duration,
}

impl Default for OrganizerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            preview_bytes: 1024,
            max_attempts: 3,
            retry_window: Duration::from_secs(600),
        }
    }
}

/// Why a path was not even attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Directory,
    InsideLibrary,
    Ignored,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::Directory => "directory",
            SkipReason::InsideLibrary => "inside library",
            SkipReason::Ignored => "ignored name",
        };
        f.write_str(reason)
    }
}

/// A classified (and unless dry-running, moved) file
#[derive(Debug, Clone)]
pub struct Outcome {
    pub from: PathBuf,
    /// `None` in dry-run mode
    pub destination: Option<PathBuf>,
    pub key: ClassificationKey,
    pub result: ClassificationResult,
}

/// Result of one `process` call that did not fail
#[derive(Debug, Clone)]
pub enum Processed {
    Organized(Outcome),
    /// Another run for the same path is still going
    InFlight,
    Skipped(SkipReason),
    /// Too many recent failures for this path
    RetryBudgetExhausted,
}

/// Bounds how often a failing path is retried
#[derive(Debug)]
pub struct RetryBudget {
    max_attempts: u32,
    window: Duration,
    failures: HashMap<PathBuf, Vec<Instant>>,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window,
            failures: HashMap::new(),
        }
    }

    /// Whether another attempt is allowed at `now`
    pub fn allows(&mut self, path: &Path, now: Instant) -> bool {
        let window = self.window;
        match self.failures.get_mut(path) {
            Some(times) => {
                times.retain(|t| now.saturating_duration_since(*t) < window);
                if times.is_empty() {
                    self.failures.remove(path);
                    true
                } else {
                    (times.len() as u32) < self.max_attempts
                }
            }
            None => true,
        }
    }

    pub fn record_failure(&mut self, path: &Path, now: Instant) {
        self.failures.entry(path.to_path_buf()).or_default().push(now);
    }

    pub fn clear(&mut self, path: &Path) {
        self.failures.remove(path);
    }
}

/// Marks a path as mid-pipeline until dropped
pub struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.path);
    }
}

/// Classifies settled files and moves them into the AI Library
pub struct Organizer {
    libraries: Libraries,
    cache: Arc<ClassifierCache>,
    heuristic: HeuristicClassifier,
    content: Option<ContentClassifier>,
    history: Option<Arc<History>>,
    ignore: IgnoreRules,
    options: OrganizerOptions,
    in_flight: Mutex<HashSet<PathBuf>>,
    retry: Mutex<RetryBudget>,
}

impl Organizer {
    pub fn new(libraries: Libraries, cache: Arc<ClassifierCache>, heuristic: HeuristicClassifier) -> Self {
        let options = OrganizerOptions::default();
        let retry = RetryBudget::new(options.max_attempts, options.retry_window);
        Self {
            libraries,
            cache,
            heuristic,
            content: None,
            history: None,
            ignore: IgnoreRules::default(),
            options,
            in_flight: Mutex::new(HashSet::new()),
            retry: Mutex::new(retry),
        }
    }

    pub fn with_content(mut self, content: ContentClassifier) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(Arc::new(history));
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreRules) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_options(mut self, options: OrganizerOptions) -> Self {
        self.retry = Mutex::new(RetryBudget::new(options.max_attempts, options.retry_window));
        self.options = options;
        self
    }

    /// Wire everything up from config: JSON cache, journal, optional content classifier
    pub fn from_config(config: &AppConfig, dry_run: bool) -> Result<Self> {
        let cache = Arc::new(ClassifierCache::open_json(config.cache_path())?);
        let heuristic = HeuristicClassifier::with_rules(&config.rules.extensions);
        let content = ContentClassifier::from_config(&config.engine, heuristic.custom_categories())?;

        let mut organizer = Self::new(Libraries::from_config(config), cache, heuristic)
            .with_history(History::new(config.history_path()))
            .with_ignore(IgnoreRules::new(&config.ignore.temp_suffixes))
            .with_options(OrganizerOptions {
                dry_run,
                preview_bytes: config.engine.preview_bytes,
                max_attempts: config.retry.max_attempts,
                retry_window: config.retry.window(),
            });
        if let Some(content) = content {
            organizer = organizer.with_content(content);
        }
        Ok(organizer)
    }

    pub fn cache(&self) -> &ClassifierCache {
        &self.cache
    }

    pub fn libraries(&self) -> &Libraries {
        &self.libraries
    }

    pub fn has_content_classifier(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(path)
    }

    /// Claim a path for one pipeline run. `None` if a run is already going.
    pub fn begin(&self, path: &Path) -> Option<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !set.insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlightGuard {
            set: &self.in_flight,
            path: path.to_path_buf(),
        })
    }

    fn skip_reason(&self, path: &Path) -> Option<SkipReason> {
        if self.libraries.contains(path) {
            Some(SkipReason::InsideLibrary)
        } else if path.is_dir() {
            Some(SkipReason::Directory)
        } else if !self.ignore.should_process(path) {
            Some(SkipReason::Ignored)
        } else {
            None
        }
    }

    /// Organize one settled file
    pub async fn process(&self, path: &Path) -> Result<Processed> {
        if let Some(reason) = self.skip_reason(path) {
            debug!("Skipping {:?}: {}", path, reason);
            return Ok(Processed::Skipped(reason));
        }

        let _guard = match self.begin(path) {
            Some(guard) => guard,
            None => {
                debug!("Already processing {:?}", path);
                return Ok(Processed::InFlight);
            }
        };

        let allowed = self
            .retry
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .allows(path, Instant::now());
        if !allowed {
            warn!("Giving up on {:?} for now, too many recent failures", path);
            return Ok(Processed::RetryBudgetExhausted);
        }

        match self.run(path).await {
            Ok(outcome) => {
                self.retry.lock().unwrap_or_else(|p| p.into_inner()).clear(path);
                transition(path, FileState::Done);
                Ok(Processed::Organized(outcome))
            }
            Err(e) => {
                transition(path, FileState::Failed);
                let stage = e.stage().map(|s| s.to_string()).unwrap_or_else(|| "unknown".into());
                if matches!(e, MagicHandError::NamingExhausted { .. }) {
                    error!("NAMING EXHAUSTED, leaving {:?} in place: {}", path, e);
                } else {
                    error!("Failed to organize {:?} at {} stage: {}", path, stage, e);
                }
                self.retry
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .record_failure(path, Instant::now());
                Err(e)
            }
        }
    }

    async fn run(&self, path: &Path) -> Result<Outcome> {
        transition(path, FileState::Classifying);

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| MagicHandError::Config(format!("no file name in {:?}", path)))?;
        let mime = guess_mime(path);

        let key = {
            let owned = path.to_path_buf();
            blocking(Stage::Fingerprint, path, move || ClassificationKey::for_file(&owned)).await?
        };

        let result = self.classify(path, &filename, &mime, &key).await?;
        info!(
            "Classified {} as {} ({})",
            filename, result.category, result.source
        );

        transition(path, FileState::Resolving);
        let dir = result.category.dir_in(&self.libraries.ai_library);

        if self.options.dry_run {
            let would_be = naming::resolve(&dir, &filename)?;
            info!("DRY RUN: Would move {:?} to {:?}", path, would_be);
            return Ok(Outcome {
                from: path.to_path_buf(),
                destination: None,
                key,
                result,
            });
        }

        // Move and journal share one blocking task, which runs to completion
        // even if this worker is aborted on shutdown
        transition(path, FileState::Moving);
        let destination = {
            let src = path.to_path_buf();
            let history = self.history.clone();
            let category = result.category.clone();
            let source = result.source;
            let fingerprint = key.to_string();
            let name = filename.clone();
            blocking(Stage::Move, path, move || {
                let destination = naming::move_into(&src, &dir, &name)?;
                if let Some(history) = history {
                    let entry = HistoryEntry::new(src, destination.clone(), category, source, fingerprint);
                    if let Err(e) = history.append(&entry) {
                        warn!("Failed to write history entry: {}", e);
                    }
                }
                Ok(destination)
            })
            .await?
        };
        info!("Organized {} -> {}/{:?}", filename, result.category, destination.file_name().unwrap_or_default());

        Ok(Outcome {
            from: path.to_path_buf(),
            destination: Some(destination),
            key,
            result,
        })
    }

    /// Cache, then heuristics, then the content classifier
    async fn classify(
        &self,
        path: &Path,
        filename: &str,
        mime: &str,
        key: &ClassificationKey,
    ) -> Result<ClassificationResult> {
        if let Some(hit) = self.cache.get(key) {
            debug!("Cache hit for {}: {}", filename, hit.category);
            return Ok(ClassificationResult {
                source: ClassificationSource::Cache,
                ..hit
            });
        }

        let result = match self.heuristic.classify(filename, mime) {
            Some(category) => ClassificationResult::new(category, ClassificationSource::Heuristic),
            None => match &self.content {
                Some(content) => {
                    let preview = {
                        let (owned, mime, max) = (path.to_path_buf(), mime.to_string(), self.options.preview_bytes);
                        blocking(Stage::Preview, path, move || preview::extract(&owned, &mime, max)).await?
                    };
                    content.classify_or_fallback(filename, mime, &preview).await
                }
                None => {
                    debug!("No content classifier, {} goes to Others", filename);
                    ClassificationResult::new(Category::Others, ClassificationSource::Fallback)
                }
            },
        };

        if result.is_persistable() {
            let (cache, key, persisted) = (self.cache.clone(), key.clone(), result.clone());
            let flushed = blocking(Stage::Classify, path, move || cache.put(key, persisted)).await;
            if let Err(e) = flushed {
                warn!("Failed to persist classification for {}: {}", filename, e);
            }
        }

        Ok(result)
    }
}

/// Run file system work off the async worker threads
async fn blocking<T, F>(stage: Stage, path: &Path, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| MagicHandError::transient(stage, path, std::io::Error::other(e)))?
}

pub(crate) fn transition(path: &Path, state: FileState) {
    debug!(path = ?path, state = ?state, "state change");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tests::{classifier, FakeBackend};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        desk: TempDir,
        libraries: Libraries,
        cache: Arc<ClassifierCache>,
    }

    impl Fixture {
        fn new() -> Self {
            let desk = tempfile::tempdir().unwrap();
            let root = desk.path().join("Magic Hand");
            let libraries = Libraries {
                ai_library: root.join("AI Library"),
                manual_library: root.join("Manual Library"),
                root,
            };
            fs::create_dir_all(&libraries.ai_library).unwrap();
            fs::create_dir_all(&libraries.manual_library).unwrap();
            Self {
                desk,
                libraries,
                cache: Arc::new(ClassifierCache::in_memory()),
            }
        }

        fn file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.desk.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn organizer(&self) -> Organizer {
            Organizer::new(self.libraries.clone(), self.cache.clone(), HeuristicClassifier::new())
        }

        fn organizer_with(&self, backend: Arc<FakeBackend>) -> Organizer {
            self.organizer().with_content(classifier(backend))
        }

        fn lib(&self, category: &str) -> PathBuf {
            self.libraries.ai_library.join(category)
        }
    }

    fn organized(p: Processed) -> Outcome {
        match p {
            Processed::Organized(o) => o,
            other => panic!("expected Organized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pdf_goes_to_documents_without_network() {
        let fx = Fixture::new();
        let backend = FakeBackend::replying("Images");
        let org = fx.organizer_with(backend.clone());
        let src = fx.file("report.pdf", "%PDF-1.7");

        let out = organized(org.process(&src).await.unwrap());
        assert_eq!(out.result.category, Category::Documents);
        assert_eq!(out.result.source, ClassificationSource::Heuristic);
        assert_eq!(out.destination.unwrap(), fx.lib("Documents").join("report.pdf"));
        assert!(!src.exists());
        assert_eq!(backend.calls(), 0);
        assert_eq!(fx.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_cached_fingerprint_skips_content_classifier() {
        let fx = Fixture::new();
        let backend = FakeBackend::replying("Code");
        let org = fx.organizer_with(backend.clone());
        let src = fx.file("mystery.qqq", "some words");

        let key = ClassificationKey::for_file(&src).unwrap();
        fx.cache
            .put(key, ClassificationResult::new(Category::Images, ClassificationSource::Content))
            .unwrap();

        let out = organized(org.process(&src).await.unwrap());
        assert_eq!(out.result.category, Category::Images);
        assert_eq!(out.result.source, ClassificationSource::Cache);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_content_result_is_cached_for_repeats() {
        let fx = Fixture::new();
        let backend = FakeBackend::replying("Code");
        let org = fx.organizer_with(backend.clone());

        let first = fx.file("snippet.qqq", "fn main() {}");
        let out = organized(org.process(&first).await.unwrap());
        assert_eq!(out.result.category, Category::Code);
        assert_eq!(out.result.source, ClassificationSource::Content);
        assert_eq!(backend.calls(), 1);

        // the same file lands on the desktop again
        let again = fx.file("snippet.qqq", "fn main() {}");
        let out = organized(org.process(&again).await.unwrap());
        assert_eq!(out.result.source, ClassificationSource::Cache);
        assert_eq!(out.destination.unwrap(), fx.lib("Code").join("snippet (1).qqq"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_label_goes_to_others() {
        let fx = Fixture::new();
        let org = fx.organizer_with(FakeBackend::replying("Definitely a spreadsheet"));
        let src = fx.file("data.qqq", "a,b,c");

        let out = organized(org.process(&src).await.unwrap());
        assert_eq!(out.result.category, Category::Others);
        assert_eq!(out.result.source, ClassificationSource::Fallback);
        assert!(fx.lib("Others").join("data.qqq").exists());
        // fallbacks are not remembered
        assert!(fx.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_goes_to_others() {
        let fx = Fixture::new();
        let org = fx.organizer_with(FakeBackend::slow(Duration::from_secs(300)));
        let src = fx.file("slow.qqq", "text");

        let out = organized(org.process(&src).await.unwrap());
        assert_eq!(out.result.category, Category::Others);
        assert!(fx.lib("Others").join("slow.qqq").exists());
    }

    #[tokio::test]
    async fn test_without_api_key_heuristics_still_work() {
        let fx = Fixture::new();
        let org = fx.organizer();
        assert!(!org.has_content_classifier());

        let img = fx.file("cat.png", "png");
        let unknown = fx.file("thing.qqq", "?");
        assert_eq!(organized(org.process(&img).await.unwrap()).result.category, Category::Images);
        let out = organized(org.process(&unknown).await.unwrap());
        assert_eq!(out.result.category, Category::Others);
        assert_eq!(out.result.source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn test_collision_yields_numbered_name() {
        let fx = Fixture::new();
        let org = fx.organizer();
        fs::create_dir_all(fx.lib("Documents")).unwrap();
        fs::write(fx.lib("Documents").join("report.pdf"), "first").unwrap();

        let src = fx.file("report.pdf", "second, unrelated");
        let out = organized(org.process(&src).await.unwrap());
        assert_eq!(out.destination.unwrap(), fx.lib("Documents").join("report (1).pdf"));
        assert_eq!(fs::read_to_string(fx.lib("Documents").join("report.pdf")).unwrap(), "first");
    }

    #[tokio::test]
    async fn test_same_path_never_runs_twice_concurrently() {
        let fx = Fixture::new();
        let backend = FakeBackend::slow(Duration::from_millis(200));
        let org = fx.organizer_with(backend.clone());
        let src = fx.file("busy.qqq", "text");

        let (a, b) = tokio::join!(org.process(&src), org.process(&src));
        let results = [a.unwrap(), b.unwrap()];
        let organized = results.iter().filter(|r| matches!(r, Processed::Organized(_))).count();
        let in_flight = results.iter().filter(|r| matches!(r, Processed::InFlight)).count();
        assert_eq!((organized, in_flight), (1, 1));
        assert_eq!(backend.calls(), 1);
        assert!(!org.is_in_flight(&src));
    }

    #[tokio::test]
    async fn test_held_guard_blocks_processing() {
        let fx = Fixture::new();
        let org = fx.organizer();
        let src = fx.file("a.txt", "x");

        let guard = org.begin(&src).unwrap();
        assert!(matches!(org.process(&src).await.unwrap(), Processed::InFlight));
        assert!(src.exists());
        drop(guard);
        assert!(matches!(org.process(&src).await.unwrap(), Processed::Organized(_)));
    }

    #[tokio::test]
    async fn test_failed_move_leaves_source_untouched() {
        let fx = Fixture::new();
        let org = fx.organizer();
        // a regular file where the category folder should be
        fs::write(fx.lib("Documents"), "not a dir").unwrap();

        let src = fx.file("keep.pdf", "precious bytes");
        let err = org.process(&src).await.unwrap_err();
        assert!(matches!(err, MagicHandError::TransientIo { .. }));
        assert_eq!(fs::read_to_string(&src).unwrap(), "precious bytes");
        assert!(!org.is_in_flight(&src));
    }

    #[tokio::test]
    async fn test_retry_budget_stops_reprocessing() {
        let fx = Fixture::new();
        let org = fx.organizer().with_options(OrganizerOptions {
            max_attempts: 2,
            ..OrganizerOptions::default()
        });
        fs::write(fx.lib("Documents"), "not a dir").unwrap();
        let src = fx.file("stuck.pdf", "x");

        assert!(org.process(&src).await.is_err());
        assert!(org.process(&src).await.is_err());
        assert!(matches!(
            org.process(&src).await.unwrap(),
            Processed::RetryBudgetExhausted
        ));
        assert!(src.exists());
    }

    #[tokio::test]
    async fn test_vanished_file_is_transient() {
        let fx = Fixture::new();
        let org = fx.organizer();
        let err = org.process(&fx.desk.path().join("gone.txt")).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Fingerprint));
    }

    #[tokio::test]
    async fn test_skips_library_directories_and_ignored() {
        let fx = Fixture::new();
        let org = fx.organizer();

        let manual = fx.libraries.manual_library.join("mine.pdf");
        fs::write(&manual, "x").unwrap();
        assert!(matches!(
            org.process(&manual).await.unwrap(),
            Processed::Skipped(SkipReason::InsideLibrary)
        ));
        assert!(manual.exists());

        let folder = fx.desk.path().join("Folder");
        fs::create_dir(&folder).unwrap();
        assert!(matches!(
            org.process(&folder).await.unwrap(),
            Processed::Skipped(SkipReason::Directory)
        ));

        let partial = fx.file("movie.mkv.crdownload", "x");
        assert!(matches!(
            org.process(&partial).await.unwrap(),
            Processed::Skipped(SkipReason::Ignored)
        ));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_move() {
        let fx = Fixture::new();
        let org = fx.organizer().with_options(OrganizerOptions {
            dry_run: true,
            ..OrganizerOptions::default()
        });
        let src = fx.file("song.mp3", "id3");

        let out = organized(org.process(&src).await.unwrap());
        assert_eq!(out.result.category, Category::Media);
        assert!(out.destination.is_none());
        assert!(src.exists());
    }

    #[tokio::test]
    async fn test_history_records_moves() {
        let fx = Fixture::new();
        let history_path = fx.libraries.root.join("history.jsonl");
        let org = fx.organizer().with_history(History::new(history_path.clone()));
        let src = fx.file("a.zip", "PK");

        org.process(&src).await.unwrap();
        let entries = History::new(history_path).read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, Category::Archives);
        assert_eq!(entries[0].original_path, src);
    }

    #[test]
    fn test_retry_budget_window() {
        let mut budget = RetryBudget::new(2, Duration::from_secs(60));
        let path = Path::new("/d/a");
        let t0 = Instant::now();

        assert!(budget.allows(path, t0));
        budget.record_failure(path, t0);
        assert!(budget.allows(path, t0));
        budget.record_failure(path, t0 + Duration::from_secs(1));
        assert!(!budget.allows(path, t0 + Duration::from_secs(2)));

        // both failures age out
        assert!(budget.allows(path, t0 + Duration::from_secs(62)));

        budget.record_failure(path, t0 + Duration::from_secs(70));
        budget.clear(path);
        assert!(budget.allows(path, t0 + Duration::from_secs(71)));
    }
}
