// In-process artifact store

use std::collections::HashMap;
use std::sync::RwLock;

use super::{ArtifactStore, StoreError, StoreResult, validate_key};

/// Artifacts kept in a map; content types are recorded alongside the bytes
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
    fail_on: RwLock<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every put whose key contains `pattern` fail
    pub fn fail_puts_matching(self, pattern: impl Into<String>) -> Self {
        if let Ok(mut fail_on) = self.fail_on.write() {
            fail_on.push(pattern.into());
        }
        self
    }

    /// Stored keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .ok()
            .and_then(|m| m.get(key).map(|(ct, _)| ct.clone()))
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> StoreResult<()> {
        validate_key(key)?;
        let rejected = self
            .fail_on
            .read()
            .map(|f| f.iter().any(|p| key.contains(p.as_str())))
            .unwrap_or(false);
        if rejected {
            return Err(StoreError::Http {
                key: key.to_string(),
                reason: "simulated write failure".to_string(),
            });
        }
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StoreError::Io(std::io::Error::other("memory store poisoned")))?;
        objects.insert(key.to_string(), (content_type.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| StoreError::Io(std::io::Error::other("memory store poisoned")))?;
        Ok(objects.get(key).map(|(_, bytes)| bytes.clone()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let store = MemoryStore::new();
        store.put("diffs/1-a-diff.png", b"abc", "image/png").unwrap();
        assert_eq!(store.get("diffs/1-a-diff.png").unwrap(), Some(b"abc".to_vec()));
        assert_eq!(store.get("diffs/2.png").unwrap(), None);
        assert_eq!(store.content_type("diffs/1-a-diff.png").as_deref(), Some("image/png"));
    }

    #[test]
    fn test_simulated_failure() {
        let store = MemoryStore::new().fail_puts_matching("-diff");
        assert!(store.put("diffs/1-a-diff.png", b"x", "image/png").is_err());
        assert!(store.put("regions/1-a-live.png", b"x", "image/png").is_ok());
        assert_eq!(store.keys(), vec!["regions/1-a-live.png".to_string()]);
    }
}
