//! Named API keys.
//!
//! Keys live in a small JSON object (`name -> key`) next to the config
//! file, so a project can refer to a key by name instead of embedding it.

use crate::error::{KeyStoreError, PersistenceError};
use crate::utils::write_atomic;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File-backed collection of named API keys.
#[derive(Debug)]
pub struct ApiKeyStore {
    path: PathBuf,
    keys: BTreeMap<String, String>,
}

impl ApiKeyStore {
    /// Load the store; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, KeyStoreError> {
        let keys = if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| PersistenceError::json(path, e))?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            keys,
        })
    }

    /// Stored key names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    /// Look up a key that the user asked for by name.
    pub fn require(&self, name: &str) -> Result<&str, KeyStoreError> {
        self.get(name)
            .ok_or_else(|| KeyStoreError::NotFound(name.to_string()))
    }

    /// Add or replace a key and save the store.
    pub fn add(&mut self, name: &str, key: &str) -> Result<(), KeyStoreError> {
        let name = name.trim();
        let key = key.trim();
        if name.is_empty() || key.is_empty() {
            return Err(KeyStoreError::Empty);
        }

        self.keys.insert(name.to_string(), key.to_string());
        self.save()?;
        Ok(())
    }

    /// Remove a key; returns whether it existed.
    pub fn remove(&mut self, name: &str) -> Result<bool, KeyStoreError> {
        if self.keys.remove(name).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn save(&self) -> Result<(), PersistenceError> {
        let content = serde_json::to_string_pretty(&self.keys)
            .map_err(|e| PersistenceError::json(&self.path, e))?;
        write_atomic(&self.path, content.as_bytes())
    }
}

/// Show only the tail of a key.
pub fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(8), tail)
}
