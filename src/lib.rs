// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! MagicHand: desktop file organizer
//!
//! Watches the desktop, waits for new files to settle, classifies them
//! (extension rules first, a language model for the rest) and moves them
//! into per-category folders of the AI Library.

pub mod cache;
pub mod category;
pub mod config;
pub mod content;
pub mod error;
pub mod fingerprint;
pub mod heuristic;
pub mod history;
pub mod llm;
pub mod naming;
pub mod organizer;
pub mod preview;
pub mod ratelimit;
pub mod service;
pub mod stability;
pub mod watcher;

pub use category::Category;
pub use config::AppConfig;
pub use error::{MagicHandError, Result};
