use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradeledger::application::actors::sweep_actor::SweepActor;
use tradeledger::application::handlers::ledger_handler::{create_router, AppState};
use tradeledger::application::services::ledger_service::LedgerService;
use tradeledger::application::services::order_sweeper::OrderSweeper;
use tradeledger::config::LedgerConfig;
use tradeledger::domain::repositories::alert_sink::AlertSink;
use tradeledger::domain::repositories::venue_client::VenueClient;
use tradeledger::domain::services::reconciliation_engine::ReconciliationEngine;
use tradeledger::infrastructure::alert_sinks::{LogAlertSink, WebhookAlertSink};
use tradeledger::infrastructure::http_venue_client::HttpVenueClient;
use tradeledger::infrastructure::simulated_venue::SimulatedVenue;
use tradeledger::persistence::init_database_with;
use tradeledger::persistence::repository::SqliteLedgerStore;
use tradeledger::persistence::signal_repository::SqliteSignalStore;
use tradeledger::rate_limit::{create_api_limiter, create_venue_limiter};
use tradeledger::task_runner::{run_on_interval, IntervalConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("No .env file loaded: {}", e);
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradeledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LedgerConfig::from_env();
    info!("Trade ledger starting");
    info!("Configuration: {:?}", config);

    let pool = init_database_with(&config.database).await?;
    let store = Arc::new(SqliteLedgerStore::new(pool.clone()));
    let signals = Arc::new(SqliteSignalStore::new(pool.clone()));

    let engine = ReconciliationEngine::new(Arc::new(config.fee_table()));

    let alerts: Arc<dyn AlertSink> = match &config.alert_webhook_url {
        Some(url) => {
            info!("Earning alerts posted to webhook");
            Arc::new(WebhookAlertSink::new(url)?)
        }
        None => Arc::new(LogAlertSink),
    };

    let venue: Arc<dyn VenueClient> = match config.venue_config() {
        Some(venue_config) => Arc::new(HttpVenueClient::new(venue_config)?),
        None => {
            warn!("No venue credentials configured, using the simulated venue");
            Arc::new(SimulatedVenue)
        }
    };
    info!("Venue: {}", venue.name());

    let ledger = Arc::new(LedgerService::new(store, engine, alerts));

    // Finish any write interrupted by the previous run before taking new work
    let repair = ledger.repair().await?;
    if repair.is_clean() {
        info!("✓ Ledger consistent at startup");
    } else {
        warn!(
            "Startup repair: {} reapplied, {} replayed, {} unrecoverable",
            repair.reapplied, repair.replayed, repair.unrecoverable
        );
    }

    let sweeper = OrderSweeper::new(
        ledger.clone(),
        venue,
        create_venue_limiter(config.venue_requests_per_second),
        config.sweep_config(),
    );
    let sweeps = SweepActor::spawn(sweeper);

    let (stop_tx, stop_rx) = watch::channel(false);

    let interval_sweeps = sweeps.clone();
    let interval_config = IntervalConfig {
        interval: config.sweep_interval(),
        escalate_after: config.venue_failure_alert_threshold,
    };
    let sweep_loop = tokio::spawn(async move {
        let mut stop_rx = stop_rx;
        run_on_interval(
            "order_status_sweep",
            interval_config,
            || {
                let sweeps = interval_sweeps.clone();
                async move { sweeps.run_sweep().await.map(|_| ()) }
            },
            async move {
                while !*stop_rx.borrow() {
                    if stop_rx.changed().await.is_err() {
                        break;
                    }
                }
            },
        )
        .await
    });

    let app = create_router(
        AppState {
            ledger,
            sweeps: sweeps.clone(),
            signals,
        },
        create_api_limiter(config.api_requests_per_minute),
    );

    info!("Listening on {}", config.http_addr);
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;

    info!("Server started successfully. Press Ctrl+C to stop.");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down gracefully...");

    if stop_tx.send(true).is_err() {
        warn!("Sweep loop already stopped");
    }
    match sweep_loop.await {
        Ok(stats) => info!(
            "Sweep loop stopped after {} runs ({} failed)",
            stats.runs, stats.failures
        ),
        Err(e) => error!("Sweep loop task failed: {}", e),
    }
    sweeps.shutdown().await;
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
