//! Durable cart persistence with lazy expiration.
//!
//! Bridges the cart store and a key/value snapshot substrate. A snapshot is
//! written with an absolute expiry (7 days from save); validity is checked
//! only when loading - there is no background sweep. An expired or corrupt
//! snapshot is treated as absent and the entry deleted. Storage problems
//! never reach the caller: saves and purges degrade to logged no-ops.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::{CartLineItem, CartState};

/// Fixed key the cart snapshot is stored under.
pub const CART_KEY: &str = "cart";

/// Snapshot time-to-live: 7 days, in milliseconds.
const CART_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// A durable key/value substrate for snapshots.
///
/// Mirrors browser local-storage semantics: synchronous, infallible from
/// the caller's point of view (implementations swallow and log I/O errors),
/// string keys and values.
pub trait SnapshotStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`, replacing any existing entry.
    fn set(&self, key: &str, value: &str);

    /// Delete the entry under `key`. No-op if absent.
    fn remove(&self, key: &str);
}

/// Snapshot store backed by JSON files in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a file store rooted at `dir`. The directory is created on
    /// first write, not here.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Some(value),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(key, error = %err, "failed to read snapshot");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(key, error = %err, "failed to create snapshot directory");
            return;
        }
        if let Err(err) = fs::write(self.path_for(key), value) {
            warn!(key, error = %err, "failed to write snapshot");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(err) = fs::remove_file(self.path_for(key))
            && err.kind() != ErrorKind::NotFound
        {
            warn!(key, error = %err, "failed to remove snapshot");
        }
    }
}

/// In-memory snapshot store for tests and ephemeral contexts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }
}

/// Durable representation of the cart.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCartSnapshot {
    items: Vec<CartLineItem>,
    is_open: bool,
    /// Absolute expiry, epoch milliseconds.
    expiry: i64,
}

/// Gateway between the cart store and durable storage.
#[derive(Clone)]
pub struct CartPersistence {
    store: Option<Arc<dyn SnapshotStore>>,
}

impl CartPersistence {
    /// Persistence over a snapshot store.
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Persistence for contexts with no durable storage available. Every
    /// operation is a silent no-op and loads find nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { store: None }
    }

    /// Serialize `state` with a fresh 7-day expiry and write it.
    pub fn save(&self, state: &CartState) {
        let Some(store) = &self.store else { return };

        let snapshot = StoredCartSnapshot {
            items: state.items.clone(),
            is_open: state.is_open,
            expiry: Utc::now().timestamp_millis() + CART_TTL_MS,
        };

        match serde_json::to_string(&snapshot) {
            Ok(serialized) => store.set(CART_KEY, &serialized),
            Err(err) => warn!(error = %err, "failed to serialize cart snapshot"),
        }
    }

    /// Load the persisted cart, if a valid snapshot exists.
    ///
    /// Returns `None` when the entry is absent, expired, or corrupt; in the
    /// latter two cases the entry is deleted on the way out.
    #[must_use]
    pub fn load(&self) -> Option<CartState> {
        let store = self.store.as_ref()?;
        let raw = store.get(CART_KEY)?;

        match serde_json::from_str::<StoredCartSnapshot>(&raw) {
            Ok(snapshot) if Utc::now().timestamp_millis() < snapshot.expiry => Some(CartState {
                items: snapshot.items,
                is_open: snapshot.is_open,
            }),
            Ok(_) => {
                debug!("persisted cart expired, purging");
                store.remove(CART_KEY);
                None
            }
            Err(err) => {
                warn!(error = %err, "corrupt persisted cart, purging");
                store.remove(CART_KEY);
                None
            }
        }
    }

    /// Delete the persisted cart unconditionally.
    pub fn purge(&self) {
        if let Some(store) = &self.store {
            store.remove(CART_KEY);
        }
    }
}
