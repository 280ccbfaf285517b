// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Language-model fallback classifier
//!
//! Asks the model for exactly one label out of a closed set. The reply is
//! untrusted input: it is only ever used after matching one of the allowed
//! categories.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{ClassificationResult, ClassificationSource};
use crate::category::Category;
use crate::config::EngineConfig;
use crate::llm::{ChatClient, CompletionBackend};
use crate::preview::ContentPreview;
use crate::ratelimit::RateLimiter;
use crate::{MagicHandError, Result};

/// Content classifier backed by a completion service
pub struct ContentClassifier {
    backend: Arc<dyn CompletionBackend>,
    limiter: Arc<RateLimiter>,
    labels: Vec<Category>,
    timeout: Duration,
    max_rate_wait: Duration,
}

impl ContentClassifier {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
        max_rate_wait: Duration,
    ) -> Self {
        Self {
            backend,
            limiter,
            labels: Category::BUILTIN.to_vec(),
            timeout,
            max_rate_wait,
        }
    }

    /// Also offer user-defined categories to the model
    pub fn with_custom_labels(mut self, custom: impl IntoIterator<Item = Category>) -> Self {
        for category in custom {
            if !self.labels.contains(&category) {
                self.labels.push(category);
            }
        }
        self
    }

    /// Build from config. `None` when no API key is set, in which case only
    /// the heuristic classifier runs.
    pub fn from_config(engine: &EngineConfig, custom: Vec<Category>) -> Result<Option<Self>> {
        let api_key = match engine.api_key() {
            Some(key) => key,
            None => {
                info!(
                    "No API key in ${}, content classification disabled",
                    engine.api_key_env
                );
                return Ok(None);
            }
        };

        let client = ChatClient::new(&engine.url, api_key, &engine.model, engine.timeout())?;
        let limiter = Arc::new(RateLimiter::per_minute(engine.requests_per_minute));
        Ok(Some(
            Self::new(Arc::new(client), limiter, engine.timeout(), engine.max_rate_wait())
                .with_custom_labels(custom),
        ))
    }

    pub fn labels(&self) -> &[Category] {
        &self.labels
    }

    fn system_prompt(&self) -> String {
        let names: Vec<&str> = self.labels.iter().map(|c| c.name()).collect();
        format!(
            "Classify the file into one of these categories: {}. \
             Return only the category name.",
            names.join(", ")
        )
    }

    fn user_prompt(filename: &str, mime_type: &str, preview: &ContentPreview) -> String {
        format!("File: {}\nType: {}\nContent: {}", filename, mime_type, preview)
    }

    /// One rate-limited, time-bounded request. Transport problems surface as
    /// `RemoteClassification`, unknown labels as `MalformedResponse`.
    pub async fn classify(
        &self,
        filename: &str,
        mime_type: &str,
        preview: &ContentPreview,
    ) -> Result<Category> {
        self.limiter.acquire(self.max_rate_wait).await?;

        let system = self.system_prompt();
        let user = Self::user_prompt(filename, mime_type, preview);

        let reply = tokio::time::timeout(self.timeout, self.backend.complete(&system, &user))
            .await
            .map_err(|_| {
                MagicHandError::RemoteClassification(format!(
                    "no reply within {:?}",
                    self.timeout
                ))
            })??;

        debug!("Model replied {:?} for {}", reply, filename);
        self.parse_label(&reply)
    }

    /// Like [`classify`](Self::classify) but never fails: any error becomes
    /// `Others` with a `Fallback` source.
    pub async fn classify_or_fallback(
        &self,
        filename: &str,
        mime_type: &str,
        preview: &ContentPreview,
    ) -> ClassificationResult {
        match self.classify(filename, mime_type, preview).await {
            Ok(category) => ClassificationResult::new(category, ClassificationSource::Content),
            Err(e) => {
                warn!("Content classification failed for {}: {}, using Others", filename, e);
                ClassificationResult::new(Category::Others, ClassificationSource::Fallback)
            }
        }
    }

    /// Match a reply against the allowed labels
    pub fn parse_label(&self, reply: &str) -> Result<Category> {
        let cleaned = reply
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*'))
            .trim_end_matches('.')
            .trim();

        self.labels
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(cleaned))
            .cloned()
            .ok_or_else(|| MagicHandError::MalformedResponse(reply.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted backend counting its calls
    pub(crate) struct FakeBackend {
        pub calls: AtomicUsize,
        pub reply: Mutex<std::result::Result<String, String>>,
        pub delay: Duration,
        pub last_user: Mutex<Option<String>>,
    }

    impl FakeBackend {
        pub fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Mutex::new(Ok(reply.to_string())),
                delay: Duration::ZERO,
                last_user: Mutex::new(None),
            })
        }

        pub fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Mutex::new(Err(message.to_string())),
                delay: Duration::ZERO,
                last_user: Mutex::new(None),
            })
        }

        pub fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Mutex::new(Ok("Code".to_string())),
                delay,
                last_user: Mutex::new(None),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for FakeBackend {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_user.lock().unwrap() = Some(user.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply
                .lock()
                .unwrap()
                .clone()
                .map_err(MagicHandError::RemoteClassification)
        }
    }

    pub(crate) fn classifier(backend: Arc<FakeBackend>) -> ContentClassifier {
        ContentClassifier::new(
            backend,
            Arc::new(RateLimiter::per_minute(100)),
            Duration::from_secs(20),
            Duration::from_secs(1),
        )
    }

    fn text(s: &str) -> ContentPreview {
        ContentPreview::Text {
            excerpt: s.to_string(),
            truncated: false,
        }
    }

    #[tokio::test]
    async fn test_valid_label() {
        let backend = FakeBackend::replying(" code.\n");
        let c = classifier(backend.clone());
        let category = c.classify("notes", "text/plain", &text("fn main() {}")).await.unwrap();
        assert_eq!(category, Category::Code);
        assert_eq!(backend.calls(), 1);

        let user = backend.last_user.lock().unwrap().clone().unwrap();
        assert!(user.contains("File: notes"));
        assert!(user.contains("Type: text/plain"));
        assert!(user.contains("fn main() {}"));
    }

    #[tokio::test]
    async fn test_unknown_label_is_malformed() {
        let c = classifier(FakeBackend::replying("Spreadsheets"));
        let err = c.classify("x", "text/plain", &text("a")).await.unwrap_err();
        assert!(matches!(err, MagicHandError::MalformedResponse(_)));

        let result = c.classify_or_fallback("x", "text/plain", &text("a")).await;
        assert_eq!(result.category, Category::Others);
        assert_eq!(result.source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn test_reply_is_not_a_path() {
        let c = classifier(FakeBackend::replying("../../etc"));
        let result = c.classify_or_fallback("x", "text/plain", &text("a")).await;
        assert_eq!(result.category, Category::Others);
    }

    #[tokio::test]
    async fn test_transport_error_falls_back() {
        let c = classifier(FakeBackend::failing("connection reset"));
        let err = c.classify("x", "text/plain", &text("a")).await.unwrap_err();
        assert!(err.is_classification_fallback());

        let result = c.classify_or_fallback("x", "text/plain", &text("a")).await;
        assert_eq!(result.category, Category::Others);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let backend = FakeBackend::slow(Duration::from_secs(120));
        let c = classifier(backend.clone());
        let err = c.classify("x", "text/plain", &text("a")).await.unwrap_err();
        assert!(matches!(err, MagicHandError::RemoteClassification(_)));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_is_remote_error() {
        let backend = FakeBackend::replying("Images");
        let c = ContentClassifier::new(
            backend.clone(),
            Arc::new(RateLimiter::per_minute(1)),
            Duration::from_secs(20),
            Duration::from_secs(5),
        );
        assert!(c.classify("a", "text/plain", &text("a")).await.is_ok());
        let err = c.classify("b", "text/plain", &text("b")).await.unwrap_err();
        assert!(err.is_classification_fallback());
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_custom_labels_offered() {
        let c = classifier(FakeBackend::replying("x"))
            .with_custom_labels(vec![Category::Custom("Invoices".into()), Category::Code]);
        assert_eq!(c.labels().len(), 8);
        assert!(c.system_prompt().contains("Invoices"));
        assert_eq!(c.parse_label("invoices").unwrap(), Category::Custom("Invoices".into()));
    }

    #[test]
    fn test_from_config_without_key() {
        let engine = EngineConfig {
            api_key_env: "MAGICHAND_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..EngineConfig::default()
        };
        assert!(ContentClassifier::from_config(&engine, Vec::new()).unwrap().is_none());
    }
}
