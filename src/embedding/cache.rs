//! Content-addressed embedding cache.

use std::collections::HashMap;
use std::sync::RwLock;

use sha2::{Digest, Sha256};

use crate::models::Embedding;

/// Maps the SHA-256 hex digest of an input text to its embedding.
///
/// Entries live as long as the cache instance. Readers run in parallel;
/// inserts take a short write lock.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: RwLock<HashMap<String, Embedding>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for `text`: the lowercase hex SHA-256 of its UTF-8 bytes.
    pub fn key(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Embedding> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn insert(&self, key: String, embedding: Embedding) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, embedding);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_sha256_hex() {
        assert_eq!(
            ContentCache::key("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_ne!(ContentCache::key("hello"), ContentCache::key("hello "));
    }

    #[test]
    fn insert_get_clear() {
        let cache = ContentCache::new();
        let key = ContentCache::key("text");
        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), vec![1.0, 2.0]);
        assert_eq!(cache.get(&key), Some(vec![1.0, 2.0]));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
