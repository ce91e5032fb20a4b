//! Last observed cleaned manifest per `{object key}/{resource kind}`.
//!
//! One store per diff handler; locks are held only for the map access.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

#[derive(Default)]
pub struct ManifestStore {
    repository: RwLock<FxHashMap<String, Vec<u8>>>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `manifest`, returning the previous one.
    pub fn add(&self, key: &str, manifest: Vec<u8>) -> Option<Vec<u8>> {
        self.repository.write().insert(key.to_string(), manifest)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.repository.read().get(key).cloned()
    }

    pub fn delete(&self, key: &str) -> Option<Vec<u8>> {
        self.repository.write().remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.repository.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.repository.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
