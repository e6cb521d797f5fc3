//! Payment Event Pump
//!
//! Consumes the backend's settlement stream, flips each incoming pending
//! payment to settled exactly once, and hands the settled payment to the
//! listener dispatcher. One bad checking id never stops the loop.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::backend::{BackendError, PaymentBackend};
use crate::db::{ConnectionRegistry, StoreError};
use crate::listeners::{DispatchHandle, Notifier};
use crate::payments::{self, Payment};

/// Why a checking id produced no notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No payment with this checking id
    NotFound,
    /// The payment is outgoing
    Outgoing,
    /// The payment was settled earlier (redelivery)
    AlreadySettled,
}

/// Result of handling one checking id
#[derive(Debug)]
pub enum PumpOutcome {
    /// Transitioned to settled; listeners were scheduled
    Settled {
        payment: Payment,
        dispatch: DispatchHandle,
    },
    Skipped(SkipReason),
}

/// Failure while handling one checking id
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    #[error("Failed to resolve payment {checking_id}: {source}")]
    Lookup {
        checking_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to mark payment {checking_id} as settled: {source}")]
    Settle {
        checking_id: String,
        #[source]
        source: StoreError,
    },
}

/// Counters for one run of the pump
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub received: u64,
    pub settled: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// The settlement loop
pub struct PaymentEventPump {
    backend: Arc<dyn PaymentBackend>,
    connections: Arc<ConnectionRegistry>,
    notifier: Notifier,
}

impl std::fmt::Debug for PaymentEventPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentEventPump")
            .field("backend", &self.backend.name())
            .field("connections", &self.connections)
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl PaymentEventPump {
    pub fn new(
        backend: Arc<dyn PaymentBackend>,
        connections: Arc<ConnectionRegistry>,
        notifier: Notifier,
    ) -> Self {
        Self {
            backend,
            connections,
            notifier,
        }
    }

    /// Run the pump in the background
    pub fn start(self) -> JoinHandle<Result<PumpSummary, BackendError>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Consume the settlement stream until it ends.
    ///
    /// Only failing to start the stream is an error; per-id failures are
    /// logged and counted.
    pub async fn run(&self) -> Result<PumpSummary, BackendError> {
        let mut stream = self.backend.paid_invoices_stream().await?;
        let mut summary = PumpSummary::default();

        tracing::info!(
            backend = self.backend.name(),
            listeners = self.notifier.listeners().len(),
            "Invoice listener started"
        );

        while let Some(checking_id) = stream.next().await {
            summary.received += 1;

            match self.process(&checking_id).await {
                Ok(PumpOutcome::Settled { dispatch, .. }) => {
                    summary.settled += 1;
                    tracing::info!(
                        checking_id = %checking_id,
                        batch_id = %dispatch.batch_id(),
                        listeners = dispatch.scheduled(),
                        "Payment settled"
                    );
                }
                Ok(PumpOutcome::Skipped(reason)) => {
                    summary.skipped += 1;
                    tracing::debug!(
                        checking_id = %checking_id,
                        reason = ?reason,
                        "Settlement skipped"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        checking_id = %checking_id,
                        error = %e,
                        "Failed to process settlement"
                    );
                }
            }
        }

        tracing::warn!(
            received = summary.received,
            settled = summary.settled,
            skipped = summary.skipped,
            failed = summary.failed,
            "Settlement stream ended"
        );

        Ok(summary)
    }

    /// Handle one checking id from the stream
    pub async fn process(&self, checking_id: &str) -> Result<PumpOutcome, PumpError> {
        let lookup_err = |source: StoreError| PumpError::Lookup {
            checking_id: checking_id.to_string(),
            source,
        };
        let settle_err = |source: StoreError| PumpError::Settle {
            checking_id: checking_id.to_string(),
            source,
        };

        let main = self.connections.main().await.map_err(lookup_err)?;

        let mut read = main.begin();
        let found = payments::get_payment_by_checking_id(&mut read, checking_id).await;
        let found = read.finish(found).await.map_err(lookup_err)?;

        let mut payment = match found {
            None => return Ok(PumpOutcome::Skipped(SkipReason::NotFound)),
            Some(payment) if !payment.is_in() => {
                return Ok(PumpOutcome::Skipped(SkipReason::Outgoing))
            }
            Some(payment) if !payment.pending => {
                return Ok(PumpOutcome::Skipped(SkipReason::AlreadySettled))
            }
            Some(payment) => payment,
        };

        let mut write = main.begin();
        let transitioned = payments::mark_settled(&mut write, checking_id).await;
        let transitioned = write.finish(transitioned).await.map_err(settle_err)?;

        // Settled by someone else between the read and the write
        if !transitioned {
            return Ok(PumpOutcome::Skipped(SkipReason::AlreadySettled));
        }

        payment.pending = false;
        let dispatch = self.notifier.notify_all(&payment).await;

        Ok(PumpOutcome::Settled { payment, dispatch })
    }
}
