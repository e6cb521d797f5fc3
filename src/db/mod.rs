//! Database module
//!
//! Named SQLite stores, the registry that owns them, and the unit-of-work
//! scope every store access runs in.

mod error;
mod registry;
mod scope;

pub use error::StoreError;
pub use registry::{
    extension_store_name, ConnectionRegistry, StoreHandle, StoreOptions, EXTENSION_STORE_PREFIX,
    MAIN_STORE,
};
pub use scope::{ScopeOutcome, SqlValue, UnitOfWork};

/// Tables the main store must provide before the pump can run
const REQUIRED_MAIN_TABLES: &[&str] = &["apipayments"];

/// Check if required tables exist in the main store
pub async fn check_schema(handle: &StoreHandle) -> Result<bool, StoreError> {
    let mut uow = handle.begin();

    for table in REQUIRED_MAIN_TABLES {
        let row = uow
            .fetch_one(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[(*table).into()],
            )
            .await?;

        if row.is_none() {
            tracing::error!(
                "Required table '{}' does not exist in store '{}'",
                table,
                handle.name()
            );
            uow.rollback().await?;
            return Ok(false);
        }
    }

    uow.commit().await?;
    Ok(true)
}
