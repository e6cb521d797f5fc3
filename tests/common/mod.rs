//! Common test utilities
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use invoice_events::backend::{BackendError, PaymentBackend, SettlementStream};
use invoice_events::payments::{self, NewPayment, PAYMENTS_TABLE_DDL};
use invoice_events::{ConnectionRegistry, InvoiceListener, ListenerError, Payment, UnitOfWork};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// A temporary data folder with the main store's payments table in place
pub struct TestStores {
    pub dir: TempDir,
    pub connections: Arc<ConnectionRegistry>,
}

/// Setup test stores - fresh data folder and payments table
pub async fn setup_test_stores() -> TestStores {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let connections = Arc::new(ConnectionRegistry::new(dir.path()));

    let mut uow = connections.main().await.expect("Failed to open main store").begin();
    uow.execute(PAYMENTS_TABLE_DDL, &[])
        .await
        .expect("Failed to create payments table");
    uow.commit().await.expect("Failed to commit schema");

    TestStores { dir, connections }
}

impl TestStores {
    pub async fn seed(&self, payment: NewPayment) -> Payment {
        let mut uow = self.connections.main().await.unwrap().begin();
        let payment = payments::create_payment(&mut uow, payment)
            .await
            .expect("Failed to seed payment");
        uow.commit().await.unwrap();
        payment
    }

    pub async fn payment(&self, checking_id: &str) -> Option<Payment> {
        let mut uow = self.connections.main().await.unwrap().begin();
        let payment = payments::get_payment_by_checking_id(&mut uow, checking_id)
            .await
            .unwrap();
        uow.commit().await.unwrap();
        payment
    }

    /// Rows in an extension's `received` table
    pub async fn received_count(&self, extension_id: &str) -> i64 {
        use sqlx::Row;

        let mut uow = self.connections.extension(extension_id).await.unwrap().begin();
        uow.execute(RECEIVED_DDL, &[]).await.unwrap();
        let row = uow
            .fetch_one("SELECT COUNT(*) AS n FROM received", &[])
            .await
            .unwrap()
            .unwrap();
        uow.commit().await.unwrap();
        row.get("n")
    }
}

const RECEIVED_DDL: &str = "CREATE TABLE IF NOT EXISTS received (checking_id TEXT NOT NULL)";

/// Backend that replays a fixed list of checking ids, then ends
pub struct ScriptedBackend {
    ids: Mutex<Option<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            ids: Mutex::new(Some(ids.iter().map(|id| id.to_string()).collect())),
        }
    }
}

#[async_trait]
impl PaymentBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn paid_invoices_stream(&self) -> Result<SettlementStream, BackendError> {
        let ids = self
            .ids
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BackendError::StreamUnavailable("already taken".to_string()))?;
        Ok(Box::pin(futures::stream::iter(ids)))
    }
}

/// Records every delivery in its extension store and reports it on a channel
pub struct RecordingListener {
    pub extension_id: String,
    pub deliveries: mpsc::UnboundedSender<(String, Payment)>,
}

#[async_trait]
impl InvoiceListener for RecordingListener {
    async fn on_invoice_paid(
        &self,
        payment: &Payment,
        db: &mut UnitOfWork,
    ) -> Result<(), ListenerError> {
        db.execute(RECEIVED_DDL, &[]).await?;
        db.execute(
            "INSERT INTO received (checking_id) VALUES (?)",
            &[payment.checking_id.as_str().into()],
        )
        .await?;
        let _ = self.deliveries.send((self.extension_id.clone(), payment.clone()));
        Ok(())
    }
}

/// Writes, then fails with a statement error
pub struct BrokenSqlListener;

#[async_trait]
impl InvoiceListener for BrokenSqlListener {
    async fn on_invoice_paid(
        &self,
        payment: &Payment,
        db: &mut UnitOfWork,
    ) -> Result<(), ListenerError> {
        db.execute(RECEIVED_DDL, &[]).await?;
        db.execute(
            "INSERT INTO received (checking_id) VALUES (?)",
            &[payment.checking_id.as_str().into()],
        )
        .await?;
        db.execute("INSERT INTO no_such_table VALUES (1)", &[]).await?;
        Ok(())
    }
}

/// Always returns an error
pub struct FailingListener;

#[async_trait]
impl InvoiceListener for FailingListener {
    async fn on_invoice_paid(
        &self,
        _payment: &Payment,
        _db: &mut UnitOfWork,
    ) -> Result<(), ListenerError> {
        Err(ListenerError::Failed("extension is down".to_string()))
    }
}

/// Always panics
pub struct PanickingListener;

#[async_trait]
impl InvoiceListener for PanickingListener {
    async fn on_invoice_paid(
        &self,
        _payment: &Payment,
        _db: &mut UnitOfWork,
    ) -> Result<(), ListenerError> {
        panic!("extension bug");
    }
}

/// Receive exactly `n` deliveries, failing if they don't arrive in time
pub async fn recv_n(
    rx: &mut mpsc::UnboundedReceiver<(String, Payment)>,
    n: usize,
) -> Vec<(String, Payment)> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Timed out waiting for delivery")
            .expect("Delivery channel closed");
        out.push(item);
    }
    out
}

/// Assert no further delivery shows up within a short window
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<(String, Payment)>) {
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(
        !matches!(extra, Ok(Some(_))),
        "Unexpected extra delivery: {:?}",
        extra
    );
}
