use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use cabin_lottery::lottery::{ApartmentCatalog, LotteryRepository, ParticipantDirectory};
use cabin_lottery::{lottery_router, CabinLotteryService};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub(crate) fn with_lottery_routes<R, C, D>(
    service: Arc<CabinLotteryService<R, C, D>>,
) -> axum::Router
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    lottery_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::build_lottery_service;
    use axum::body::Body;
    use axum::http::Request;
    use cabin_lottery::lottery::{ParticipantId, CALLER_HEADER};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_lottery_routes(build_lottery_service(&[ParticipantId(100)])).layer(Extension(state))
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn readiness_follows_flag() {
        let response = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(true)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn lottery_routes_are_mounted() {
        let response = app(true)
            .oneshot(
                Request::post("/api/v1/cabin-lottery/drawings")
                    .header(CALLER_HEADER, "100")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"season":"SPRING_2026"}"#))
                    .expect("request"),
            )
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
