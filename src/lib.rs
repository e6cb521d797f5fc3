//! invoice_events Library
//!
//! Settlement pump, listener fan-out, and the transactional store layer
//! they share. Re-exports modules for integration testing and external use.

pub mod api;
pub mod backend;
pub mod config;
pub mod db;
mod error;
pub mod listeners;
pub mod payments;
pub mod pump;
pub mod relay;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use db::{ConnectionRegistry, StoreError, StoreHandle, UnitOfWork};
pub use listeners::{InvoiceListener, ListenerError, ListenerRegistry, Notifier};
pub use payments::Payment;
pub use pump::{PaymentEventPump, PumpError, PumpOutcome, PumpSummary};
pub use relay::{RelayOutcome, WebhookRelay};
