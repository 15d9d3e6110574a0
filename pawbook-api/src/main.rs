use anyhow::Context;
use pawbook_api::{app, AppState, AuthConfig};
use pawbook_booking::{CapacityResolver, ExpirySweeper, MockPaymentAdapter, PaymentOrchestrator, ReservationManager};
use pawbook_core::payment::PaymentAdapter;
use pawbook_core::SystemClock;
use pawbook_store::{DbClient, PostgresCapacityRepository, PostgresReservationStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pawbook_api=debug,pawbook_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = pawbook_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Pawbook API on port {}", config.server.port);

    let db = DbClient::from_config(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let capacity_repo = Arc::new(PostgresCapacityRepository::new(db.pool.clone()));
    let store = Arc::new(PostgresReservationStore::new(db.pool.clone()));

    let resolver = CapacityResolver::new(capacity_repo.clone())
        .with_fallback(config.reservations.fallback_capacity);
    let ttl_minutes = i64::try_from(config.reservations.ttl_minutes).context("reservations.ttl_minutes out of range")?;
    let manager = Arc::new(ReservationManager::new(
        store,
        resolver,
        Arc::new(SystemClock),
        chrono::Duration::minutes(ttl_minutes),
    ));

    let adapter: Arc<dyn PaymentAdapter> = match config.payments.provider.as_str() {
        "mock" => Arc::new(MockPaymentAdapter),
        other => anyhow::bail!("Unknown payment provider '{}'", other),
    };

    let sweeper = ExpirySweeper::new(manager.clone())
        .with_interval(Duration::from_secs(config.sweeper.interval_seconds))
        .with_batch_size(config.sweeper.batch_size);
    sweeper.start().await;

    let app_state = AppState {
        manager,
        capacity_repo,
        payment_orchestrator: Arc::new(PaymentOrchestrator::new(adapter)),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.stop().await;
    tracing::info!("Pawbook API shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
