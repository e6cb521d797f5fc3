//! Connection Registry
//!
//! Lazily opens one store handle per name and keeps it for the life of the process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::OnceCell;

use super::{StoreError, UnitOfWork};

/// Name of the main store
pub const MAIN_STORE: &str = "database";

/// Prefix for per-extension store names
pub const EXTENSION_STORE_PREFIX: &str = "ext_";

/// Store name for an extension
pub fn extension_store_name(extension_id: &str) -> String {
    format!("{}{}", EXTENSION_STORE_PREFIX, extension_id)
}

/// Options applied to every handle the registry opens
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Connections per store pool
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// A named, long-lived connection to one store
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    name: String,
    pool: SqlitePool,
}

impl StoreHandle {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Start a new unit of work on this store
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::new(self.clone())
    }

    /// True if both handles refer to the same opened store
    pub fn ptr_eq(&self, other: &StoreHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Process-wide cache of store handles, keyed by store name.
///
/// Creation is serialized per name: concurrent first requests for the same
/// name wait on a single open and all receive the same handle. A failed open
/// leaves the slot empty so a later request can try again.
#[derive(Debug)]
pub struct ConnectionRegistry {
    data_folder: PathBuf,
    options: StoreOptions,
    slots: Mutex<HashMap<String, Arc<OnceCell<StoreHandle>>>>,
}

impl ConnectionRegistry {
    /// Create a registry storing `<name>.db` files under `data_folder`
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        Self::with_options(data_folder, StoreOptions::default())
    }

    /// Create with custom store options
    pub fn with_options(data_folder: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            data_folder: data_folder.into(),
            options,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// File path backing the store called `name`
    pub fn store_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_store_name(name)?;
        Ok(self.data_folder.join(format!("{}.db", name)))
    }

    /// Get the handle for `name`, opening it on first use
    pub async fn acquire(&self, name: &str) -> Result<StoreHandle, StoreError> {
        let path = self.store_path(name)?;
        let slot = self.slot(name);

        let handle = slot
            .get_or_try_init(|| self.open(name, path))
            .await?;

        Ok(handle.clone())
    }

    /// Handle for the main store
    pub async fn main(&self) -> Result<StoreHandle, StoreError> {
        self.acquire(MAIN_STORE).await
    }

    /// Handle for an extension's own store
    pub async fn extension(&self, extension_id: &str) -> Result<StoreHandle, StoreError> {
        self.acquire(&extension_store_name(extension_id)).await
    }

    /// Number of stores opened so far
    pub fn open_count(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Close every opened store. Only meant for process teardown.
    pub async fn close_all(&self) {
        let handles: Vec<StoreHandle> = self
            .lock_slots()
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect();

        for handle in handles {
            handle.pool().close().await;
            tracing::debug!(store = %handle.name(), "Store closed");
        }
    }

    fn slot(&self, name: &str) -> Arc<OnceCell<StoreHandle>> {
        self.lock_slots()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceCell<StoreHandle>>>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn open(&self, name: &str, path: PathBuf) -> Result<StoreHandle, StoreError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(self.options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.options.max_connections)
            .connect_with(connect_options)
            .await
            .map_err(|source| {
                tracing::error!(
                    store = %name,
                    path = %path.display(),
                    error = %source,
                    "Failed to open store"
                );
                StoreError::Open {
                    name: name.to_string(),
                    source,
                }
            })?;

        tracing::info!(store = %name, path = %path.display(), "Store opened");

        Ok(StoreHandle {
            inner: Arc::new(StoreInner {
                name: name.to_string(),
                pool,
            }),
        })
    }
}

/// Store names become file names, so keep them to a safe alphabet
fn validate_store_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidStoreName(name.to_string()))
    }
}
