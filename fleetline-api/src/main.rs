use anyhow::Context;
use fleetline_api::{app, worker::ReconcileWorker, AppState};
use fleetline_core::{
    ConflictChecker, NotificationSink, StatusReconciler, SystemClock, TracingSink, TripLedger,
    TripScheduler,
};
use fleetline_store::{app_config::Config, DbClient, PostgresLedger, PushGatewaySink, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fleetline_api=debug,fleetline_core=info,fleetline_store=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Fleetline API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let rules = config.scheduling.rules();
    let ledger: Arc<dyn TripLedger> = Arc::new(PostgresLedger::new(db.pool.clone()));
    let clock = Arc::new(SystemClock::from_rules(&rules));

    let notifier: Arc<dyn NotificationSink> = match &config.push {
        Some(push) => Arc::new(PushGatewaySink::new(push).context("Failed to build push client")?),
        None => {
            tracing::warn!("No push gateway configured, notifications will only be logged");
            Arc::new(TracingSink)
        }
    };

    let checker = Arc::new(ConflictChecker::new(ledger.clone(), clock.clone(), rules));
    let scheduler = Arc::new(TripScheduler::new(
        ledger.clone(),
        checker.clone(),
        notifier,
        clock.clone(),
    ));
    let reconciler = Arc::new(StatusReconciler::new(ledger, clock, rules));

    let lease = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url)
                .await
                .context("Failed to connect to Redis")?,
        )),
        None => None,
    };

    let worker = ReconcileWorker::new(
        reconciler.clone(),
        lease,
        config.scheduling.reconcile_interval(),
        config.scheduling.reconcile_timeout(),
    );
    tokio::spawn(worker.run());

    let app = app(AppState {
        checker,
        scheduler,
        reconciler,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
