//! Listener Registry
//!
//! Extensions register here at startup to hear about settled incoming payments.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::db::{StoreError, UnitOfWork};
use crate::payments::Payment;

/// Errors raised by a listener callback
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Listener failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Callback invoked once per settled incoming payment.
///
/// `db` is a fresh unit of work on the extension's own store. It is committed
/// when the callback returns `Ok` and rolled back otherwise.
#[async_trait]
pub trait InvoiceListener: Send + Sync {
    async fn on_invoice_paid(
        &self,
        payment: &Payment,
        db: &mut UnitOfWork,
    ) -> Result<(), ListenerError>;
}

/// One extension's registration
#[derive(Clone)]
pub struct Registration {
    pub extension_id: String,
    pub listener: Arc<dyn InvoiceListener>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("extension_id", &self.extension_id)
            .finish_non_exhaustive()
    }
}

/// Ordered, append-only list of registrations
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    registrations: RwLock<Vec<Registration>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `extension_id`. Registering twice means two deliveries.
    pub fn register(&self, extension_id: impl Into<String>, listener: Arc<dyn InvoiceListener>) {
        let extension_id = extension_id.into();
        tracing::info!(extension = %extension_id, "Registering invoice listener");

        self.registrations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Registration {
                extension_id,
                listener,
            });
    }

    /// Current registrations in registration order
    pub fn snapshot(&self) -> Vec<Registration> {
        self.registrations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
