// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Destination categories
//!
//! A category is a closed label naming one folder under the AI Library.
//! Labels coming from the language model or from user rules are parsed
//! through [`Category::parse`] before they are ever used as a path component.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{MagicHandError, Result};

/// One destination folder under the AI Library
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Design,
    Documents,
    Images,
    Code,
    Archives,
    Media,
    Others,
    /// User-defined category from the config rules
    Custom(String),
}

impl Category {
    /// Built-in categories in the order they are offered to the model
    pub const BUILTIN: [Category; 7] = [
        Category::Design,
        Category::Documents,
        Category::Images,
        Category::Code,
        Category::Archives,
        Category::Media,
        Category::Others,
    ];

    pub fn name(&self) -> &str {
        match self {
            Category::Design => "Design",
            Category::Documents => "Documents",
            Category::Images => "Images",
            Category::Code => "Code",
            Category::Archives => "Archives",
            Category::Media => "Media",
            Category::Others => "Others",
            Category::Custom(name) => name,
        }
    }

    /// Parse a label. Built-in names match case-insensitively; anything else
    /// becomes a custom category if it is a safe single path component.
    pub fn parse(label: &str) -> Result<Self> {
        let label = label.trim();
        if let Some(builtin) = Self::BUILTIN
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(label))
        {
            return Ok(builtin.clone());
        }

        if !is_safe_folder_name(label) {
            return Err(MagicHandError::InvalidCategory(label.to_string()));
        }
        Ok(Category::Custom(label.to_string()))
    }

    /// Directory for this category under the given library root
    pub fn dir_in(&self, library: &Path) -> PathBuf {
        library.join(self.name())
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Category::Custom(_))
    }
}

fn is_safe_folder_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && !name.starts_with('.')
        && !name.contains(['/', '\\', ':', '\0'])
        && !name.chars().any(char::is_control)
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Category::parse(&raw).map_err(serde::de::Error::custom)
    }
}
