//! Webhook Relay
//!
//! Forwards an inbound webhook call to the backend's own handler, if any.

use std::sync::Arc;

use crate::backend::{BackendError, PaymentBackend, WebhookRequest};

/// What the relay did with a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The backend handled the call
    Handled,
    /// The backend has no webhook capability; nothing to do
    NotSupported,
}

/// Passes webhook calls straight through to the configured backend
#[derive(Clone)]
pub struct WebhookRelay {
    backend: Arc<dyn PaymentBackend>,
}

impl std::fmt::Debug for WebhookRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookRelay")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl WebhookRelay {
    pub fn new(backend: Arc<dyn PaymentBackend>) -> Self {
        Self { backend }
    }

    /// Invoke the backend's webhook handler and return its result unchanged
    pub async fn relay(&self, request: WebhookRequest) -> Result<RelayOutcome, BackendError> {
        match self.backend.webhook_handler() {
            Some(handler) => {
                handler.handle_webhook(request).await?;
                Ok(RelayOutcome::Handled)
            }
            None => {
                tracing::debug!(backend = self.backend.name(), "Backend has no webhook handler");
                Ok(RelayOutcome::NotSupported)
            }
        }
    }
}
