//! Payment Backends
//!
//! The contract the funding source must satisfy: an endless stream of checking
//! ids for settled invoices, and optionally a webhook entry point.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

mod void;
mod webhook;

pub use void::VoidWallet;
pub use webhook::WebhookWallet;

/// Checking ids of settled invoices, in settlement order
pub type SettlementStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Backend errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The settlement stream was already handed out or could not be started
    #[error("Settlement stream unavailable: {0}")]
    StreamUnavailable(String),

    /// Nobody is consuming settlements any more
    #[error("Settlement stream closed")]
    StreamClosed,

    /// The webhook call could not be understood
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// An inbound webhook call, forwarded untouched
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl WebhookRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header with this name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Webhook capability of a backend
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle_webhook(&self, request: WebhookRequest) -> Result<(), BackendError>;
}

/// A funding source
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Start the settlement stream. It is not restartable; reconnecting to
    /// the underlying node is the backend's own business.
    async fn paid_invoices_stream(&self) -> Result<SettlementStream, BackendError>;

    /// Webhook capability, if this backend has one
    fn webhook_handler(&self) -> Option<&dyn WebhookHandler> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_request_header_lookup() {
        let request = WebhookRequest::new(b"{}".to_vec())
            .with_header("Content-Type", "application/json")
            .with_header("X-Signature", "abc");

        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("x-signature"), Some("abc"));
        assert_eq!(request.header("missing"), None);
    }

    #[test]
    fn test_backend_error_display() {
        assert_eq!(BackendError::StreamClosed.to_string(), "Settlement stream closed");
        let err = BackendError::InvalidPayload("not json".to_string());
        assert!(err.to_string().contains("not json"));
    }
}
