use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryVacancyStore};
use crate::routes::with_ingest_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use jobfeed::config::AppConfig;
use jobfeed::error::AppError;
use jobfeed::ingest::{IngestionOrchestrator, TracingProgress};
use jobfeed::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryVacancyStore::default());
    let orchestrator = Arc::new(IngestionOrchestrator::with_progress(
        store,
        Arc::new(TracingProgress),
        config.ingest.clone(),
    ));

    let app = with_ingest_routes(orchestrator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "vacancy dataset loader ready");

    axum::serve(listener, app).await?;
    Ok(())
}
