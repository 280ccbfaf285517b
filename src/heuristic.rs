// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Extension and MIME based classification
//!
//! Pure and deterministic: the caller computes the MIME type, this module
//! only looks things up. `None` means "ask the content classifier".

use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::category::Category;

/// Infer a category from the file extension
fn category_for_extension(ext: &str) -> Option<Category> {
    let category = match ext {
        "psd" | "psb" | "ai" | "sketch" | "fig" | "xd" | "afdesign" | "afphoto" | "indd"
        | "eps" | "cdr" | "xcf" | "procreate" => Category::Design,
        "pdf" | "doc" | "docx" | "txt" | "rtf" | "odt" | "md" | "markdown" | "pages" | "tex"
        | "epub" | "xls" | "xlsx" | "ods" | "csv" | "numbers" | "ppt" | "pptx" | "odp"
        | "key" => Category::Documents,
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "heic" | "heif" | "bmp" | "tiff" | "tif"
        | "svg" | "avif" | "ico" | "raw" | "cr2" | "nef" | "dng" => Category::Images,
        "py" | "js" | "mjs" | "ts" | "tsx" | "jsx" | "rs" | "go" | "java" | "kt" | "swift"
        | "c" | "h" | "cpp" | "hpp" | "cc" | "cs" | "rb" | "php" | "html" | "htm" | "css"
        | "scss" | "json" | "yaml" | "yml" | "toml" | "xml" | "sql" | "sh" | "bash" | "zsh"
        | "ps1" | "lua" | "ipynb" => Category::Code,
        "zip" | "tar" | "gz" | "tgz" | "bz2" | "xz" | "7z" | "rar" | "zst" | "dmg" | "iso"
        | "pkg" => Category::Archives,
        "mp3" | "wav" | "flac" | "m4a" | "ogg" | "aac" | "aiff" | "opus" | "mp4" | "mov"
        | "mkv" | "avi" | "webm" | "m4v" | "wmv" | "flv" => Category::Media,
        _ => return None,
    };
    Some(category)
}

/// Infer a category from an exact MIME type, then from its top-level type
fn category_for_mime(mime: &str) -> Option<Category> {
    let exact = match mime {
        "application/pdf"
        | "application/msword"
        | "application/rtf"
        | "application/epub+zip"
        | "application/vnd.oasis.opendocument.text"
        | "application/vnd.ms-excel"
        | "application/vnd.ms-powerpoint"
        | "text/plain"
        | "text/markdown"
        | "text/rtf"
        | "text/csv" => Some(Category::Documents),
        "application/x-photoshop"
        | "image/vnd.adobe.photoshop"
        | "application/illustrator"
        | "application/x-sketch"
        | "application/x-figma"
        | "application/x-adobe-xd" => Some(Category::Design),
        "application/zip"
        | "application/x-tar"
        | "application/gzip"
        | "application/x-bzip2"
        | "application/x-xz"
        | "application/x-7z-compressed"
        | "application/vnd.rar"
        | "application/x-rar-compressed" => Some(Category::Archives),
        "application/javascript" | "application/json" | "application/xml" | "application/x-sh" => {
            Some(Category::Code)
        }
        _ => None,
    };
    if exact.is_some() {
        return exact;
    }

    if mime.starts_with("application/vnd.openxmlformats-officedocument.") {
        Some(Category::Documents)
    } else if mime.starts_with("image/") {
        Some(Category::Images)
    } else if mime.starts_with("audio/") || mime.starts_with("video/") {
        Some(Category::Media)
    } else if mime.starts_with("text/") {
        Some(Category::Code)
    } else {
        None
    }
}

/// Rule engine over extensions and MIME types
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier {
    custom: HashMap<String, Category>,
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add user rules (`extension → category`). Invalid category names are
    /// logged and skipped.
    pub fn with_rules(rules: &HashMap<String, String>) -> Self {
        let mut custom = HashMap::new();
        for (ext, name) in rules {
            let ext = ext.trim().trim_start_matches('.').to_lowercase();
            match Category::parse(name) {
                Ok(category) if !ext.is_empty() => {
                    custom.insert(ext, category);
                }
                Ok(_) => warn!("Ignoring rule with empty extension for {:?}", name),
                Err(e) => warn!("Ignoring rule for .{}: {}", ext, e),
            }
        }
        Self { custom }
    }

    /// Classify by extension first, then by MIME type
    pub fn classify(&self, filename: &str, mime_type: &str) -> Option<Category> {
        if let Some(ext) = extension_of(filename) {
            if let Some(category) = self.custom.get(&ext) {
                return Some(category.clone());
            }
            if let Some(category) = category_for_extension(&ext) {
                return Some(category);
            }
        }

        let mime = mime_type.trim().to_ascii_lowercase();
        category_for_mime(&mime)
    }

    /// Categories that user rules can produce
    pub fn custom_categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self
            .custom
            .values()
            .filter(|c| c.is_custom())
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name().cmp(b.name()));
        categories.dedup();
        categories
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| !e.is_empty())
}

/// Guess the MIME type of a path from its extension
pub fn guess_mime(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    // Design formats mime_guess does not know about
    match ext.as_str() {
        "psd" | "psb" => return "application/x-photoshop".to_string(),
        "ai" => return "application/illustrator".to_string(),
        "sketch" => return "application/x-sketch".to_string(),
        "fig" => return "application/x-figma".to_string(),
        "xd" => return "application/x-adobe-xd".to_string(),
        _ => {}
    }

    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_lowercase())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}
