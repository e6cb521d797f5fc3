//! Push-driven backend
//!
//! Settlement notices arrive through the webhook as `{"checking_id": "..."}`
//! and are queued onto the settlement stream.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use super::{BackendError, PaymentBackend, SettlementStream, WebhookHandler, WebhookRequest};

/// Settlement notices buffered before the webhook starts waiting
const WEBHOOK_CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Deserialize)]
struct SettlementNotice {
    checking_id: String,
}

/// Backend fed by webhook calls
#[derive(Debug)]
pub struct WebhookWallet {
    sender: mpsc::Sender<String>,
    receiver: Mutex<Option<mpsc::Receiver<String>>>,
}

impl WebhookWallet {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(WEBHOOK_CHANNEL_CAPACITY);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl Default for WebhookWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentBackend for WebhookWallet {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn paid_invoices_stream(&self) -> Result<SettlementStream, BackendError> {
        let receiver = self.receiver.lock().await.take().ok_or_else(|| {
            BackendError::StreamUnavailable("webhook settlement stream already taken".to_string())
        })?;

        Ok(Box::pin(ReceiverStream::new(receiver)))
    }

    fn webhook_handler(&self) -> Option<&dyn WebhookHandler> {
        Some(self)
    }
}

#[async_trait]
impl WebhookHandler for WebhookWallet {
    async fn handle_webhook(&self, request: WebhookRequest) -> Result<(), BackendError> {
        let notice: SettlementNotice = serde_json::from_slice(&request.body)
            .map_err(|e| BackendError::InvalidPayload(e.to_string()))?;

        if notice.checking_id.is_empty() {
            return Err(BackendError::InvalidPayload("empty checking_id".to_string()));
        }

        tracing::debug!(checking_id = %notice.checking_id, "Settlement notice received");

        self.sender
            .send(notice.checking_id)
            .await
            .map_err(|_| BackendError::StreamClosed)
    }
}
