use std::io::Cursor;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{DrawingId, ExecutionId, ParticipantId, PeriodId, PeriodInput, WishInput};
use super::import::{ImportError, WishImporter};
use super::repository::{
    ApartmentCatalog, LotteryRepository, ParticipantDirectory, RepositoryError,
};
use super::service::{CabinLotteryService, LotteryError};

/// Header carrying the authenticated caller's participant id.
pub const CALLER_HEADER: &str = "x-participant-id";

type Shared<R, C, D> = Arc<CabinLotteryService<R, C, D>>;

/// Router builder exposing the lottery operations over HTTP.
pub fn lottery_router<R, C, D>(service: Shared<R, C, D>) -> Router
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/cabin-lottery/drawings",
            get(list_drawings_handler::<R, C, D>).post(create_drawing_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/current",
            get(current_drawing_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id",
            get(get_drawing_handler::<R, C, D>).delete(delete_drawing_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/open",
            post(open_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/lock",
            post(lock_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/unlock",
            post(unlock_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/revert-to-draft",
            post(revert_to_draft_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/revert-to-locked",
            post(revert_to_locked_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/periods",
            get(periods_handler::<R, C, D>).post(add_period_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/periods/bulk",
            post(bulk_periods_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/periods/:period_id",
            put(update_period_handler::<R, C, D>).delete(delete_period_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/wishes",
            get(all_wishes_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/wishes/me",
            get(my_wishes_handler::<R, C, D>).put(set_wishes_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/import",
            post(import_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/draw",
            post(draw_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/publish",
            post(publish_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/allocations",
            get(allocations_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/allocations/me",
            get(my_allocations_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/executions",
            get(executions_handler::<R, C, D>),
        )
        .route(
            "/api/v1/cabin-lottery/drawings/:drawing_id/executions/:execution_id",
            get(execution_handler::<R, C, D>).delete(delete_execution_handler::<R, C, D>),
        )
        .with_state(service)
}

/// Caller identity taken from the `x-participant-id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub ParticipantId);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(|id| Caller(ParticipantId(id)))
            .ok_or_else(|| {
                error_body(
                    StatusCode::UNAUTHORIZED,
                    format!("missing or invalid {CALLER_HEADER} header"),
                )
            })
    }
}

/// Transport status for a service error.
pub fn status_for(error: &LotteryError) -> StatusCode {
    match error {
        LotteryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LotteryError::StateConflict(_)
        | LotteryError::AlreadyPublished(_)
        | LotteryError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        LotteryError::NotFound(_) | LotteryError::Repository(RepositoryError::NotFound) => {
            StatusCode::NOT_FOUND
        }
        LotteryError::WrongDrawing { .. } => StatusCode::BAD_REQUEST,
        LotteryError::Unauthorized(_) => StatusCode::FORBIDDEN,
        LotteryError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn error_response(error: LotteryError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(%error, "lottery request failed");
    }
    error_body(status, error.to_string())
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, LotteryError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

fn respond_empty(result: Result<(), LotteryError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDrawingRequest {
    pub season: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkPeriodsRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub execution_id: ExecutionId,
}

#[derive(Debug, Deserialize)]
pub struct DrawQuery {
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AllocationQuery {
    pub execution_id: Option<ExecutionId>,
}

pub(crate) async fn list_drawings_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.list_drawings())
}

pub(crate) async fn current_drawing_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    match service.current_drawing_for_participants() {
        Ok(Some(drawing)) => (StatusCode::OK, Json(drawing)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_drawing_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Json(request): Json<CreateDrawingRequest>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(
        StatusCode::CREATED,
        service.create_drawing(caller, &request.season),
    )
}

pub(crate) async fn get_drawing_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.get_drawing(drawing_id))
}

pub(crate) async fn delete_drawing_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond_empty(service.delete_drawing(caller, drawing_id))
}

pub(crate) async fn open_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.open(caller, drawing_id))
}

pub(crate) async fn lock_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.lock(caller, drawing_id))
}

pub(crate) async fn unlock_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.unlock(caller, drawing_id))
}

pub(crate) async fn revert_to_draft_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.revert_to_draft(caller, drawing_id))
}

pub(crate) async fn revert_to_locked_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.revert_to_locked(caller, drawing_id))
}

pub(crate) async fn periods_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.periods(drawing_id))
}

pub(crate) async fn add_period_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
    Json(input): Json<PeriodInput>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(
        StatusCode::CREATED,
        service.add_period(caller, drawing_id, input),
    )
}

pub(crate) async fn bulk_periods_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
    Json(request): Json<BulkPeriodsRequest>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(
        StatusCode::CREATED,
        service.bulk_create_periods(caller, drawing_id, request.start_date, request.end_date),
    )
}

pub(crate) async fn update_period_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path((drawing_id, period_id)): Path<(DrawingId, PeriodId)>,
    Json(input): Json<PeriodInput>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.update_period(caller, drawing_id, period_id, input),
    )
}

pub(crate) async fn delete_period_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path((drawing_id, period_id)): Path<(DrawingId, PeriodId)>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond_empty(service.delete_period(caller, drawing_id, period_id))
}

pub(crate) async fn all_wishes_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.get_all_wishes(caller, drawing_id))
}

pub(crate) async fn my_wishes_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.get_wishes(drawing_id, caller))
}

pub(crate) async fn set_wishes_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
    Json(wishes): Json<Vec<WishInput>>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.set_wishes(drawing_id, caller, wishes))
}

pub(crate) async fn import_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
    body: String,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    match WishImporter::from_reader(&service, caller, drawing_id, Cursor::new(body)) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(ImportError::Lottery(error)) => error_response(error),
        Err(error @ (ImportError::Empty | ImportError::Csv(_))) => {
            error_body(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
        }
        Err(error) => error_body(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

pub(crate) async fn draw_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
    Query(query): Query<DrawQuery>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(
        StatusCode::CREATED,
        service.perform_draw(drawing_id, caller, query.seed),
    )
}

pub(crate) async fn publish_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
    Json(request): Json<PublishRequest>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.publish(drawing_id, request.execution_id, caller),
    )
}

pub(crate) async fn allocations_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Path(drawing_id): Path<DrawingId>,
    Query(query): Query<AllocationQuery>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.get_allocations(drawing_id, query.execution_id),
    )
}

pub(crate) async fn my_allocations_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.get_my_allocations(drawing_id, caller),
    )
}

pub(crate) async fn executions_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Path(drawing_id): Path<DrawingId>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond(StatusCode::OK, service.list_executions(drawing_id))
}

pub(crate) async fn execution_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Path((drawing_id, execution_id)): Path<(DrawingId, ExecutionId)>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    match service.get_execution(drawing_id, execution_id) {
        Ok(execution) => {
            let lines = execution.audit_log.lines();
            let payload = json!({
                "execution": execution,
                "audit_log": lines,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_execution_handler<R, C, D>(
    State(service): State<Shared<R, C, D>>,
    Caller(caller): Caller,
    Path((drawing_id, execution_id)): Path<(DrawingId, ExecutionId)>,
) -> Response
where
    R: LotteryRepository + 'static,
    C: ApartmentCatalog + 'static,
    D: ParticipantDirectory + 'static,
{
    respond_empty(service.delete_execution(caller, drawing_id, execution_id))
}
