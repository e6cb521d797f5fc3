//! Payments module
//!
//! The payment record and the queries the pump runs against the main store.

mod model;
mod repository;

pub use model::{NewPayment, Payment};
pub use repository::{create_payment, get_payment_by_checking_id, mark_settled, PAYMENTS_TABLE_DDL};
