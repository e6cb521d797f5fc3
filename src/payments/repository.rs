//! Payment CRUD
//!
//! Queries against the main store's `apipayments` table. Every function runs
//! inside the caller's unit of work; committing is the caller's decision.

use chrono::Utc;

use crate::db::{StoreError, UnitOfWork};

use super::{NewPayment, Payment};

/// Layout of the `apipayments` table these queries expect
pub const PAYMENTS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS apipayments (
    checking_id TEXT PRIMARY KEY,
    wallet TEXT NOT NULL,
    amount INTEGER NOT NULL,
    fee INTEGER NOT NULL DEFAULT 0,
    pending BOOLEAN NOT NULL DEFAULT 1,
    memo TEXT,
    time INTEGER NOT NULL
)
"#;

const SELECT_BY_CHECKING_ID: &str = r#"
SELECT checking_id, wallet, amount, fee, pending, memo, time
FROM apipayments
WHERE checking_id = ?
"#;

/// Record a new payment
pub async fn create_payment(
    uow: &mut UnitOfWork,
    payment: NewPayment,
) -> Result<Payment, StoreError> {
    uow.execute(
        r#"
        INSERT INTO apipayments (checking_id, wallet, amount, fee, pending, memo, time)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        &[
            payment.checking_id.as_str().into(),
            payment.wallet_id.as_str().into(),
            payment.amount_msat.into(),
            payment.fee_msat.into(),
            payment.pending.into(),
            payment.memo.clone().into(),
            Utc::now().timestamp().into(),
        ],
    )
    .await?;

    get_payment_by_checking_id(uow, &payment.checking_id)
        .await?
        .ok_or_else(|| StoreError::Statement {
            statement: SELECT_BY_CHECKING_ID.to_string(),
            source: sqlx::Error::RowNotFound,
        })
}

/// Look up a payment by its checking id
pub async fn get_payment_by_checking_id(
    uow: &mut UnitOfWork,
    checking_id: &str,
) -> Result<Option<Payment>, StoreError> {
    let row = uow
        .fetch_one(SELECT_BY_CHECKING_ID, &[checking_id.into()])
        .await?;

    row.map(|row| Payment::from_row(&row))
        .transpose()
        .map_err(|source| StoreError::Statement {
            statement: SELECT_BY_CHECKING_ID.to_string(),
            source,
        })
}

/// Flip a pending payment to settled.
///
/// Returns `true` only for the call that performed the transition; a payment
/// that is missing or already settled is left alone and yields `false`.
pub async fn mark_settled(uow: &mut UnitOfWork, checking_id: &str) -> Result<bool, StoreError> {
    let rows = uow
        .execute(
            r#"
            UPDATE apipayments
            SET pending = 0
            WHERE checking_id = ? AND pending = 1
            "#,
            &[checking_id.into()],
        )
        .await?;

    Ok(rows == 1)
}
