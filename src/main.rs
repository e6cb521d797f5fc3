//! invoice_events - settled-payment notifier
//!
//! Runs the payment event pump against the configured funding source and
//! serves the webhook route that feeds push-based backends.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invoice_events::api::{self, AppState};
use invoice_events::backend::{PaymentBackend, VoidWallet, WebhookWallet};
use invoice_events::config::WalletBackend;
use invoice_events::db;
use invoice_events::{
    Config, ConnectionRegistry, ListenerRegistry, Notifier, PaymentEventPump, WebhookRelay,
};

/// Initialize tracing/logging. Production logs are JSON lines.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "invoice_events=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Build the application router
fn build_router(state: AppState) -> Router {
    api::create_router()
        .layer(middleware::from_fn(api::middleware::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_backend(kind: WalletBackend) -> Arc<dyn PaymentBackend> {
    match kind {
        WalletBackend::Void => Arc::new(VoidWallet),
        WalletBackend::Webhook => Arc::new(WebhookWallet::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(config.is_production());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting invoice_events");
    tracing::info!(data_folder = %config.data_folder.display(), "Opening main store...");

    tokio::fs::create_dir_all(&config.data_folder).await?;
    let connections = Arc::new(ConnectionRegistry::with_options(
        &config.data_folder,
        config.store_options(),
    ));

    let main_store = connections.main().await?;
    if !db::check_schema(&main_store).await? {
        tracing::error!("Main store schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Main store schema incomplete"));
    }

    let backend = build_backend(config.wallet_backend);

    // Extensions register their invoice listeners here before the pump starts
    let listeners = Arc::new(ListenerRegistry::new());

    let notifier = Notifier::with_config(listeners, connections.clone(), config.notifier_config());
    let pump = PaymentEventPump::new(backend.clone(), connections.clone(), notifier).start();

    let app = build_router(AppState::new(WebhookRelay::new(backend)));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    pump.abort();
    connections.close_all().await;
    tracing::info!("Stores closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
