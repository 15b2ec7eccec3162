//! Synchronous key-value persistence for the storefront.
//!
//! One JSON document on disk holds every key (order array, cart, admin
//! sentinel, backup slot) as a whole-blob value, mirroring the flat
//! key-value area the frontend reads. Reads are best-effort: missing or
//! malformed content is treated as absent and logged as a recoverable
//! condition, never propagated as a crash. This store has no capability
//! probe; it is always available.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Key holding the serialized order array.
pub const ORDERS_KEY: &str = "orders";
/// Key holding the serialized cart. Owned by the cart UI, not the core.
pub const CART_KEY: &str = "cart";
/// Sentinel key owned by the admin auth collaborator.
pub const ADMIN_AUTH_KEY: &str = "adminAuthenticated";
/// Key holding the single backup slot.
pub const BACKUP_KEY: &str = "empanadas-arepas-backup";

/// Whole-blob JSON key-value store backed by a single file.
pub struct LocalStore {
    path: PathBuf,
    // Serializes the read-modify-write of the backing file within this
    // process; cross-operation isolation is intentionally not provided.
    file_guard: Mutex<()>,
}

impl LocalStore {
    /// Create a store over the given backing file. The file is created
    /// lazily on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_guard: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read and deserialize the value stored under `key`.
    ///
    /// Returns `None` when the key is absent or the stored content no
    /// longer deserializes; the malformed case is logged and otherwise
    /// indistinguishable from absence.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let _guard = self.file_guard.lock().ok()?;
        let value = self.load_map().remove(key)?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(key, error = %e, "stored value no longer deserializes; treating as absent");
                None
            }
        }
    }

    /// Serialize `value` and store it under `key`, replacing any prior
    /// value.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), crate::StoreError> {
        let serialized = serde_json::to_value(value)
            .map_err(|e| crate::StoreError::WriteFailure(format!("serialize {key}: {e}")))?;

        let _guard = self
            .file_guard
            .lock()
            .map_err(|e| crate::StoreError::WriteFailure(format!("store lock: {e}")))?;
        let mut map = self.load_map();
        map.insert(key.to_string(), serialized);
        self.persist_map(&map)
    }

    /// Remove `key`. Succeeds silently when the key is absent.
    pub fn remove(&self, key: &str) -> Result<(), crate::StoreError> {
        let _guard = self
            .file_guard
            .lock()
            .map_err(|e| crate::StoreError::WriteFailure(format!("store lock: {e}")))?;
        let mut map = self.load_map();
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.persist_map(&map)
    }

    /// Whether `key` currently holds a value.
    pub fn contains(&self, key: &str) -> bool {
        match self.file_guard.lock() {
            Ok(_guard) => self.load_map().contains_key(key),
            Err(_) => false,
        }
    }

    fn load_map(&self) -> Map<String, Value> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Map::new(),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(path = %self.path.display(), "store file is not a JSON object; treating as empty");
                Map::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "store file is malformed; treating as empty");
                Map::new()
            }
        }
    }

    fn persist_map(&self, map: &Map<String, Value>) -> Result<(), crate::StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| crate::StoreError::WriteFailure(format!("create data dir: {e}")))?;
        }
        let serialized = serde_json::to_string(map)
            .map_err(|e| crate::StoreError::WriteFailure(format!("serialize store: {e}")))?;
        fs::write(&self.path, serialized)
            .map_err(|e| crate::StoreError::WriteFailure(format!("write store file: {e}")))
    }
}
