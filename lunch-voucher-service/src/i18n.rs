//! Translated labels for exports

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Resolves a message key to a localized string
pub trait Translator: Send + Sync {
    fn get(&self, key: &str) -> String;
}

/// Key/value translation table; unknown keys translate to themselves.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat JSON object of `"key": "translation"` pairs
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: HashMap<String, String> =
            serde_json::from_str(json).context("Invalid translation catalog")?;
        Ok(Self { entries })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read translation catalog {}", path.display()))?;
        let catalog = Self::from_json(&json)?;
        tracing::debug!(
            "Loaded {} translations from {}",
            catalog.entries.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

impl Translator for Catalog {
    fn get(&self, key: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}
