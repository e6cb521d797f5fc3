//! Listener Dispatch
//!
//! Fans a settled payment out to every registered listener. Each delivery is
//! its own detached task with its own unit of work on the extension's store.
//! A batch is supervised: a supervisor task joins the deliveries, logs and
//! publishes every failure, and produces a [`DispatchReport`]. Nobody has to
//! wait for it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::db::ConnectionRegistry;
use crate::payments::Payment;

use super::{ListenerError, ListenerRegistry, Registration};

/// Configuration for listener dispatch
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Upper bound on listener tasks running at once, across all batches
    pub max_in_flight: usize,
    /// Buffered failure records per subscriber before old ones are dropped
    pub failure_channel_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 256,
            failure_channel_capacity: 1024,
        }
    }
}

/// A listener delivery that returned an error or panicked
#[derive(Debug, Clone, Serialize)]
pub struct ListenerFailure {
    pub batch_id: Uuid,
    pub extension_id: String,
    pub checking_id: String,
    pub message: String,
    pub panicked: bool,
    pub failed_at: DateTime<Utc>,
}

/// Outcome of one notification batch
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub batch_id: Uuid,
    pub checking_id: String,
    /// Extensions whose callback returned `Ok` and whose unit of work committed
    pub delivered: Vec<String>,
    pub failed: Vec<ListenerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Handle to a scheduled batch
#[derive(Debug)]
pub struct DispatchHandle {
    batch_id: Uuid,
    scheduled: usize,
    supervisor: JoinHandle<DispatchReport>,
}

impl DispatchHandle {
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Number of listener tasks spawned for this batch
    pub fn scheduled(&self) -> usize {
        self.scheduled
    }

    /// Wait until every delivery in the batch has finished
    pub async fn wait(self) -> Result<DispatchReport, tokio::task::JoinError> {
        self.supervisor.await
    }
}

type Outcome = Result<Result<(), ListenerError>, Box<dyn Any + Send>>;

/// A spawned delivery, handed to the batch supervisor
struct Delivery {
    extension_id: String,
    task: JoinHandle<Outcome>,
}

/// Dispatches settled payments to registered listeners
#[derive(Debug, Clone)]
pub struct Notifier {
    listeners: Arc<ListenerRegistry>,
    connections: Arc<ConnectionRegistry>,
    permits: Arc<Semaphore>,
    failures: broadcast::Sender<ListenerFailure>,
}

impl Notifier {
    pub fn new(listeners: Arc<ListenerRegistry>, connections: Arc<ConnectionRegistry>) -> Self {
        Self::with_config(listeners, connections, NotifierConfig::default())
    }

    pub fn with_config(
        listeners: Arc<ListenerRegistry>,
        connections: Arc<ConnectionRegistry>,
        config: NotifierConfig,
    ) -> Self {
        let (failures, _) = broadcast::channel(config.failure_channel_capacity.max(1));

        Self {
            listeners,
            connections,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            failures,
        }
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Receive every listener failure from now on
    pub fn subscribe_failures(&self) -> broadcast::Receiver<ListenerFailure> {
        self.failures.subscribe()
    }

    /// Schedule one delivery of `payment` per registration.
    ///
    /// Returns once every delivery has been spawned. When the in-flight bound
    /// is reached this waits for running deliveries to free a slot. Deliveries
    /// are detached tasks: cancelling this call stops scheduling the rest, but
    /// the ones already spawned run to completion and are still reported.
    pub async fn notify_all(&self, payment: &Payment) -> DispatchHandle {
        let batch_id = Uuid::new_v4();
        let (deliveries, spawned) = mpsc::unbounded_channel();

        let supervisor = tokio::spawn(supervise(
            batch_id,
            payment.checking_id.clone(),
            spawned,
            self.failures.clone(),
        ));

        let mut scheduled = 0;
        for registration in self.listeners.snapshot() {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!(
                        batch_id = %batch_id,
                        "Listener semaphore closed, dropping remaining deliveries"
                    );
                    break;
                }
            };

            let connections = self.connections.clone();
            let payment = payment.clone();
            let extension_id = registration.extension_id.clone();

            let task = tokio::spawn(async move {
                let _permit = permit;
                AssertUnwindSafe(deliver(&connections, &registration, &payment))
                    .catch_unwind()
                    .await
            });
            scheduled += 1;

            if deliveries.send(Delivery { extension_id, task }).is_err() {
                tracing::error!(
                    batch_id = %batch_id,
                    "Dispatch supervisor gone, delivery unreported"
                );
            }
        }

        tracing::debug!(
            batch_id = %batch_id,
            checking_id = %payment.checking_id,
            listeners = scheduled,
            "Invoice listeners scheduled"
        );

        DispatchHandle {
            batch_id,
            scheduled,
            supervisor,
        }
    }
}

/// Run one listener inside a unit of work on its extension store
async fn deliver(
    connections: &ConnectionRegistry,
    registration: &Registration,
    payment: &Payment,
) -> Result<(), ListenerError> {
    let store = connections.extension(&registration.extension_id).await?;
    let mut uow = store.begin();
    let result = registration.listener.on_invoice_paid(payment, &mut uow).await;
    uow.finish(result).await
}

/// Join every delivery of a batch as it is spawned and as it finishes
async fn supervise(
    batch_id: Uuid,
    checking_id: String,
    mut spawned: mpsc::UnboundedReceiver<Delivery>,
    failures: broadcast::Sender<ListenerFailure>,
) -> DispatchReport {
    let mut report = DispatchReport {
        batch_id,
        checking_id,
        delivered: Vec::new(),
        failed: Vec::new(),
    };

    let mut running = FuturesUnordered::new();
    let mut scheduling = true;

    loop {
        tokio::select! {
            next = spawned.recv(), if scheduling => match next {
                Some(Delivery { extension_id, task }) => {
                    running.push(async move { (extension_id, task.await) });
                }
                None => scheduling = false,
            },
            Some((extension_id, joined)) = running.next(), if !running.is_empty() => {
                record(&mut report, &failures, extension_id, joined);
            }
            else => break,
        }
    }

    if !report.is_clean() {
        tracing::warn!(
            batch_id = %batch_id,
            checking_id = %report.checking_id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Invoice listener batch finished with failures"
        );
    }

    report
}

/// Add one finished delivery to the report, publishing it if it failed
fn record(
    report: &mut DispatchReport,
    failures: &broadcast::Sender<ListenerFailure>,
    extension_id: String,
    joined: Result<Outcome, JoinError>,
) {
    let (message, panicked) = match joined {
        Ok(Ok(Ok(()))) => {
            tracing::debug!(
                batch_id = %report.batch_id,
                extension = %extension_id,
                "Invoice listener done"
            );
            report.delivered.push(extension_id);
            return;
        }
        Ok(Ok(Err(err))) => (err.to_string(), false),
        Ok(Err(payload)) => (panic_message(payload.as_ref()), true),
        Err(join_err) => {
            let panicked = join_err.is_panic();
            (format!("Delivery did not complete: {}", join_err), panicked)
        }
    };

    tracing::error!(
        batch_id = %report.batch_id,
        extension = %extension_id,
        checking_id = %report.checking_id,
        panicked = panicked,
        error = %message,
        "Invoice listener failed"
    );

    let failure = ListenerFailure {
        batch_id: report.batch_id,
        extension_id,
        checking_id: report.checking_id.clone(),
        message,
        panicked,
        failed_at: Utc::now(),
    };

    // No subscribers is fine
    let _ = failures.send(failure.clone());
    report.failed.push(failure);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}
