//! Unit of Work
//!
//! A transaction scope bound to one store handle. The transaction begins on
//! the first statement and ends with an explicit commit or rollback. Any
//! failing statement rolls the whole scope back before the error is returned.
//!
//! Each unit of work checks out its own pooled connection, so concurrent
//! scopes on the same store never share a cursor. SQLite serializes writers.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Transaction;

use super::{StoreError, StoreHandle};

/// A statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Bool(bool),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// How a unit of work ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    Open,
    Committed,
    RolledBack,
}

/// Transaction scope over one store.
///
/// Dropping an open unit of work without committing rolls it back.
pub struct UnitOfWork {
    handle: StoreHandle,
    tx: Option<Transaction<'static, Sqlite>>,
    outcome: ScopeOutcome,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("store", &self.handle.name())
            .field("in_transaction", &self.tx.is_some())
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl UnitOfWork {
    pub(crate) fn new(handle: StoreHandle) -> Self {
        Self {
            handle,
            tx: None,
            outcome: ScopeOutcome::Open,
        }
    }

    pub fn outcome(&self) -> ScopeOutcome {
        self.outcome
    }

    /// Run a statement, returning the number of affected rows
    pub async fn execute(
        &mut self,
        statement: &str,
        params: &[SqlValue],
    ) -> Result<u64, StoreError> {
        let tx = self.transaction().await?;
        let result = bind_params(sqlx::query(statement), params)
            .execute(&mut **tx)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected()),
            Err(source) => Err(self.fail(statement, source).await),
        }
    }

    /// Run a query and return its first row, if any
    pub async fn fetch_one(
        &mut self,
        statement: &str,
        params: &[SqlValue],
    ) -> Result<Option<SqliteRow>, StoreError> {
        let tx = self.transaction().await?;
        let result = bind_params(sqlx::query(statement), params)
            .fetch_optional(&mut **tx)
            .await;

        match result {
            Ok(row) => Ok(row),
            Err(source) => Err(self.fail(statement, source).await),
        }
    }

    /// Run a query and return every row
    pub async fn fetch_all(
        &mut self,
        statement: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqliteRow>, StoreError> {
        let tx = self.transaction().await?;
        let result = bind_params(sqlx::query(statement), params)
            .fetch_all(&mut **tx)
            .await;

        match result {
            Ok(rows) => Ok(rows),
            Err(source) => Err(self.fail(statement, source).await),
        }
    }

    /// Commit everything this unit of work wrote
    pub async fn commit(mut self) -> Result<(), StoreError> {
        self.ensure_open()?;

        if let Some(tx) = self.tx.take() {
            if let Err(source) = tx.commit().await {
                self.outcome = ScopeOutcome::RolledBack;
                return Err(StoreError::Statement {
                    statement: "COMMIT".to_string(),
                    source,
                });
            }
        }

        self.outcome = ScopeOutcome::Committed;
        Ok(())
    }

    /// Discard everything this unit of work wrote
    pub async fn rollback(mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.rollback_in_place().await
    }

    /// Commit on `Ok`, roll back on `Err`, and hand the result back.
    ///
    /// A commit failure replaces an `Ok` result. A rollback failure is
    /// logged and the original error is kept.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if self.outcome == ScopeOutcome::Open {
                    let store = self.handle.name().to_string();
                    if let Err(rollback_err) = self.rollback().await {
                        tracing::error!(store = %store, error = %rollback_err, "Rollback failed");
                    }
                }
                Err(err)
            }
        }
    }

    async fn transaction(&mut self) -> Result<&mut Transaction<'static, Sqlite>, StoreError> {
        self.ensure_open()?;

        if self.tx.is_none() {
            let tx = self
                .handle
                .pool()
                .begin()
                .await
                .map_err(|source| StoreError::Statement {
                    statement: "BEGIN".to_string(),
                    source,
                })?;
            self.tx = Some(tx);
        }

        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::ScopeClosed(self.handle.name().to_string()))
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.outcome == ScopeOutcome::Open {
            Ok(())
        } else {
            Err(StoreError::ScopeClosed(self.handle.name().to_string()))
        }
    }

    async fn rollback_in_place(&mut self) -> Result<(), StoreError> {
        self.outcome = ScopeOutcome::RolledBack;

        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(|source| StoreError::Statement {
                statement: "ROLLBACK".to_string(),
                source,
            }),
            None => Ok(()),
        }
    }

    async fn fail(&mut self, statement: &str, source: sqlx::Error) -> StoreError {
        tracing::warn!(
            store = %self.handle.name(),
            statement = %statement,
            error = %source,
            "Statement failed, rolling back unit of work"
        );

        if let Err(rollback_err) = self.rollback_in_place().await {
            tracing::error!(store = %self.handle.name(), error = %rollback_err, "Rollback failed");
        }

        StoreError::Statement {
            statement: statement.to_string(),
            source,
        }
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Blob(v) => query.bind(v.as_slice()),
        };
    }
    query
}
