use crate::cli::ServeArgs;
use crate::infra::{default_evaluator, seed_catalog, AppState};
use crate::routes::with_engine_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use declara::config::AppConfig;
use declara::error::AppError;
use declara::telemetry;
use declara::workflows::declaration::{DeclarationService, MemoryStore};
use declara::workflows::delivery::DeliveryService;
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

    let store = Arc::new(MemoryStore::new());
    seed_catalog(&store)?;
    let declaration_service = Arc::new(DeclarationService::new(
        store.clone(),
        store.clone(),
        Arc::new(default_evaluator()),
        &config.engine,
    ));
    let delivery_service = Arc::new(DeliveryService::new(store));

    let app = with_engine_routes(declaration_service, delivery_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        evaluator_timeout_ms = config.engine.evaluator_timeout.as_millis() as u64,
        "declaration engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
