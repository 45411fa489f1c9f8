use crate::cli::ServeArgs;
use crate::infra::{build_lottery_service, AppState};
use crate::routes::with_lottery_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use cabin_lottery::config::AppConfig;
use cabin_lottery::error::AppError;
use cabin_lottery::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    if config.lottery.admin_ids.is_empty() {
        warn!("LOTTERY_ADMIN_IDS is empty; admin operations will be refused");
    }
    let lottery_service = build_lottery_service(&config.lottery.admin_ids);

    let app = with_lottery_routes(lottery_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        admins = config.lottery.admin_ids.len(),
        "cabin lottery service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
