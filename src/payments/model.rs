//! Payment record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// One payment attempt, identified by its backend checking id.
///
/// Positive amounts are incoming, negative amounts are outgoing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub checking_id: String,
    pub wallet_id: String,
    pub amount_msat: i64,
    pub fee_msat: i64,
    pub pending: bool,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Incoming payment
    pub fn is_in(&self) -> bool {
        self.amount_msat > 0
    }

    /// Outgoing payment
    pub fn is_out(&self) -> bool {
        self.amount_msat < 0
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let time: i64 = row.try_get("time")?;
        let created_at = DateTime::<Utc>::from_timestamp(time, 0).ok_or_else(|| {
            sqlx::Error::Decode(format!("payment time out of range: {}", time).into())
        })?;

        Ok(Self {
            checking_id: row.try_get("checking_id")?,
            wallet_id: row.try_get("wallet")?,
            amount_msat: row.try_get("amount")?,
            fee_msat: row.try_get("fee")?,
            pending: row.try_get("pending")?,
            memo: row.try_get("memo")?,
            created_at,
        })
    }
}

/// A payment about to be recorded
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub checking_id: String,
    pub wallet_id: String,
    pub amount_msat: i64,
    pub fee_msat: i64,
    pub pending: bool,
    pub memo: Option<String>,
}

impl NewPayment {
    /// Create a pending payment with no fee and no memo
    pub fn new(
        checking_id: impl Into<String>,
        wallet_id: impl Into<String>,
        amount_msat: i64,
    ) -> Self {
        Self {
            checking_id: checking_id.into(),
            wallet_id: wallet_id.into(),
            amount_msat,
            fee_msat: 0,
            pending: true,
            memo: None,
        }
    }

    pub fn with_fee(mut self, fee_msat: i64) -> Self {
        self.fee_msat = fee_msat;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Record the payment as already settled
    pub fn settled(mut self) -> Self {
        self.pending = false;
        self
    }
}
