//! Listeners module
//!
//! Registration of extension callbacks and supervised fan-out of settled payments.

mod notifier;
mod registry;

pub use notifier::{DispatchHandle, DispatchReport, ListenerFailure, Notifier, NotifierConfig};
pub use registry::{InvoiceListener, ListenerError, ListenerRegistry, Registration};
