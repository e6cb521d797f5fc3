//! Backend that never settles anything

use async_trait::async_trait;

use super::{BackendError, PaymentBackend, SettlementStream};

/// Funding source placeholder; its stream stays pending forever
#[derive(Debug, Clone, Default)]
pub struct VoidWallet;

#[async_trait]
impl PaymentBackend for VoidWallet {
    fn name(&self) -> &str {
        "void"
    }

    async fn paid_invoices_stream(&self) -> Result<SettlementStream, BackendError> {
        tracing::warn!("VoidWallet is active, no payment will ever settle");
        Ok(Box::pin(futures::stream::pending::<String>()))
    }
}
