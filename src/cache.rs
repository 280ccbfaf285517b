// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Persistent classification cache
//!
//! Every entry is kept in memory and the whole map is flushed to the backing
//! store after each write. There is no eviction: a desktop only ever sees a
//! bounded number of distinct files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::category::Category;
use crate::fingerprint::ClassificationKey;
use crate::{MagicHandError, Result};

/// Where a classification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Heuristic,
    Content,
    Cache,
    /// `Others` chosen because the content classifier failed or is disabled
    Fallback,
}

impl std::fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Heuristic => "heuristic",
            Self::Content => "content",
            Self::Cache => "cache",
            Self::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// A category decision for one fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub source: ClassificationSource,
    pub classified_at: DateTime<Utc>,
}

impl ClassificationResult {
    pub fn new(category: Category, source: ClassificationSource) -> Self {
        Self {
            category,
            source,
            classified_at: Utc::now(),
        }
    }

    /// Fallback decisions are not stored so a later run can still ask the model
    pub fn is_persistable(&self) -> bool {
        matches!(
            self.source,
            ClassificationSource::Heuristic | ClassificationSource::Content
        )
    }
}

type Entries = HashMap<ClassificationKey, ClassificationResult>;

/// Durable backing for the cache
pub trait CacheStore: Send + Sync {
    fn load(&self) -> Result<Entries>;
    fn save(&self, entries: &Entries) -> Result<()>;
}

/// Pretty-printed JSON object at a fixed path
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<Entries> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        match serde_json::from_str::<Entries>(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                // Keep the damaged file around for inspection and start fresh
                let backup = self.path.with_extension("json.corrupt");
                warn!(
                    "Classification cache {:?} is unreadable ({}), moving it to {:?}",
                    self.path, e, backup
                );
                std::fs::rename(&self.path, &backup)?;
                Ok(Entries::new())
            }
        }
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let sorted: BTreeMap<&ClassificationKey, &ClassificationResult> = entries.iter().collect();
        let json = serde_json::to_string_pretty(&sorted)?;

        // Write beside the target then swap, so a crash never leaves a torn file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store, optionally failing on save
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Entries>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<Entries> {
        Ok(self.saved.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(MagicHandError::FileSystem(std::io::Error::new(
                std::io::ErrorKind::Other,
                "store unavailable",
            )));
        }
        *self.saved.lock().unwrap_or_else(|p| p.into_inner()) = entries.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fingerprint → category map shared by all workers
pub struct ClassifierCache {
    entries: RwLock<Entries>,
    store: Box<dyn CacheStore>,
    // Serializes mutate + flush; readers only take the RwLock
    writer: Mutex<()>,
}

impl ClassifierCache {
    /// Load every entry from the store
    pub fn open(store: Box<dyn CacheStore>) -> Result<Self> {
        let entries = store.load()?;
        debug!("Loaded {} cached classifications", entries.len());
        Ok(Self {
            entries: RwLock::new(entries),
            store,
            writer: Mutex::new(()),
        })
    }

    /// Cache backed by a JSON file
    pub fn open_json(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(Box::new(JsonFileStore::new(path)))
    }

    /// Empty cache that never touches disk
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(Entries::new()),
            store: Box::new(MemoryStore::new()),
            writer: Mutex::new(()),
        }
    }

    pub fn get(&self, key: &ClassificationKey) -> Option<ClassificationResult> {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    /// Insert and flush. On a flush error the entry stays in memory.
    pub fn put(&self, key: ClassificationKey, result: ClassificationResult) -> Result<()> {
        let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());

        let snapshot = {
            let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
            entries.insert(key, result);
            entries.clone()
        };

        self.store.save(&snapshot)
    }

    /// Drop every entry and flush
    pub fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        self.entries.write().unwrap_or_else(|p| p.into_inner()).clear();
        self.store.save(&Entries::new())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, ordered by key
    pub fn entries(&self) -> Vec<(ClassificationKey, ClassificationResult)> {
        let mut all: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Number of entries per category, ordered by name
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for result in self.entries.read().unwrap_or_else(|p| p.into_inner()).values() {
            *counts.entry(result.category.name().to_string()).or_default() += 1;
        }
        counts.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn result(category: Category) -> ClassificationResult {
        ClassificationResult::new(category, ClassificationSource::Content)
    }

    #[test]
    fn test_get_put() {
        let cache = ClassifierCache::in_memory();
        let key = ClassificationKey::from("blake3:abc");
        assert!(cache.get(&key).is_none());

        cache.put(key.clone(), result(Category::Code)).unwrap();
        assert_eq!(cache.get(&key).unwrap().category, Category::Code);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_json_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("classification_cache.json");

        {
            let cache = ClassifierCache::open_json(&path).unwrap();
            cache.put("blake3:one".into(), result(Category::Design)).unwrap();
            cache
                .put("blake3:two".into(), result(Category::Custom("3D".into())))
                .unwrap();
        }

        let reopened = ClassifierCache::open_json(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.get(&"blake3:two".into()).unwrap().category,
            Category::Custom("3D".into())
        );

        // human-inspectable document, no temp file left behind
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"blake3:one\""));
        assert!(text.contains("\"Design\""));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classification_cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cache = ClassifierCache::open_json(&path).unwrap();
        assert!(cache.is_empty());
        assert!(path.with_extension("json.corrupt").exists());
    }

    #[test]
    fn test_flush_after_each_put() {
        let store = Arc::new(MemoryStore::new());
        struct Shared(Arc<MemoryStore>);
        impl CacheStore for Shared {
            fn load(&self) -> Result<Entries> {
                self.0.load()
            }
            fn save(&self, entries: &Entries) -> Result<()> {
                self.0.save(entries)
            }
        }

        let cache = ClassifierCache::open(Box::new(Shared(store.clone()))).unwrap();
        cache.put("k1".into(), result(Category::Media)).unwrap();
        cache.put("k2".into(), result(Category::Images)).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load().unwrap().len(), 2);

        store.set_fail_saves(true);
        assert!(cache.put("k3".into(), result(Category::Code)).is_err());
        // still served from memory
        assert!(cache.get(&"k3".into()).is_some());
    }

    #[test]
    fn test_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classification_cache.json");
        let cache = Arc::new(ClassifierCache::open_json(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let key = ClassificationKey::from(format!("t{}-{}", t, i));
                        cache.put(key.clone(), result(Category::Others)).unwrap();
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.len(), 80);
        let reopened = ClassifierCache::open_json(&path).unwrap();
        assert_eq!(reopened.len(), 80);
    }

    #[test]
    fn test_clear_and_counts() {
        let cache = ClassifierCache::in_memory();
        cache.put("a".into(), result(Category::Code)).unwrap();
        cache.put("b".into(), result(Category::Code)).unwrap();
        cache.put("c".into(), result(Category::Images)).unwrap();
        assert_eq!(
            cache.category_counts(),
            vec![("Code".to_string(), 2), ("Images".to_string(), 1)]
        );

        cache.clear().unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fallback_not_persistable() {
        assert!(!ClassificationResult::new(Category::Others, ClassificationSource::Fallback).is_persistable());
        assert!(ClassificationResult::new(Category::Others, ClassificationSource::Heuristic).is_persistable());
    }
}
