// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake for testing without filesystem I/O.

use scenelink_app_core::config::{ConfigError, ConfigStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory implementation of [`ConfigStore`] for testing.
///
/// Clones share state, so a test can hand one clone to a `ConfigService` and
/// inspect the other.
///
/// # Example
///
/// ```
/// use scenelink_dry_tests::InMemoryConfigStore;
/// use scenelink_app_core::config::ConfigService;
///
/// let store = InMemoryConfigStore::new();
/// let service = ConfigService::new(store.clone());
///
/// service.save("sync", &serde_json::json!({"max_depth": 3})).unwrap();
/// assert_eq!(store.save_count(), 1);
/// assert!(store.contains_key("sync"));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    data: HashMap<String, Vec<u8>>,
    load_count: usize,
    save_count: usize,
    fail_on_load: bool,
    fail_on_save: bool,
}

impl InMemoryConfigStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one raw blob.
    pub fn with_raw(key: &str, data: &[u8]) -> Self {
        let store = Self::new();
        store.lock().data.insert(key.to_string(), data.to_vec());
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `load_raw` fail with an I/O error.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.lock().fail_on_load = fail;
    }

    /// Make `save_raw` fail with an I/O error.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.lock().fail_on_save = fail;
    }

    /// Attempted loads, including failed ones.
    pub fn load_count(&self) -> usize {
        self.lock().load_count
    }

    /// Attempted saves, including failed ones.
    pub fn save_count(&self) -> usize {
        self.lock().save_count
    }

    /// Whether `key` holds a blob.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let mut inner = self.lock();
        inner.load_count += 1;
        if inner.fail_on_load {
            return Err(ConfigError::Io(std::io::Error::other("simulated load failure")));
        }
        inner.data.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut inner = self.lock();
        inner.save_count += 1;
        if inner.fail_on_save {
            return Err(ConfigError::Io(std::io::Error::other("simulated save failure")));
        }
        inner.data.insert(key.to_string(), data.to_vec());
        Ok(())
    }
}
