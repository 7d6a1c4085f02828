//! HTTP routes
//!
//! Every tenant-scoped operation lives under `/api/sites/{site_no}`:
//! - `POST /cars` car-in, `GET /cars` active list, `GET /cars/{car_no}`
//! - `POST /cars/{car_no}/assign|park|out-request|brought|handed-over|seen`
//! - `GET /valets/{valet_id}`, `GET /search`, `GET /history/today`, `GET /history/{date}`
//! - `GET /drivers`, `GET /drivers/stats`, `GET /drivers/{driver_id}/jobs`
//! - `GET /users`, `POST /users`, `GET /users/stats`, `DELETE /users/{user_id}`
//!
//! plus the `/healthz` liveness check. Role checks belong to the caller.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use valet_core::{
    CarRecord, DriverStats, Error, Leg, NewUser, SiteUser, SourcedRecord, UserStats,
};
use valet_engine::ValetEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ValetEngine>,
}

impl AppState {
    pub fn new(engine: Arc<ValetEngine>) -> Self {
        Self { engine }
    }
}

/// Error body returned by every route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Engine error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) | Error::InvalidTenant(_) => StatusCode::NOT_FOUND,
            Error::DuplicateKey { .. }
            | Error::InvalidTransition { .. }
            | Error::PreconditionFailed { .. }
            | Error::UserLimitReached { .. }
            | Error::ProtectedUser(_) => StatusCode::CONFLICT,
            Error::UnknownDriver(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::UnsafeIdentifier { .. } | Error::StorageFailure(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), "Request failed: {}", self.0);
        } else if status == StatusCode::CONFLICT {
            warn!(kind = self.0.kind(), "Request rejected: {}", self.0);
        }

        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CarInRequest {
    pub car_no: String,
    pub valet_id: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ParkRequest {
    pub parking_spot: String,
}

#[derive(Debug, Deserialize)]
pub struct SeenRequest {
    pub leg: Leg,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub include_archive: bool,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let site = Router::new()
        .route("/cars", post(car_in).get(list_active))
        .route("/cars/{car_no}", get(get_car))
        .route("/cars/{car_no}/assign", post(assign_driver))
        .route("/cars/{car_no}/park", post(mark_parked))
        .route("/cars/{car_no}/out-request", post(request_car_out))
        .route("/cars/{car_no}/brought", post(mark_brought))
        .route("/cars/{car_no}/handed-over", post(mark_handed_over))
        .route("/cars/{car_no}/seen", post(mark_seen))
        .route("/valets/{valet_id}", get(find_by_valet_id))
        .route("/drivers", get(list_drivers))
        .route("/drivers/stats", get(driver_stats))
        .route("/drivers/{driver_id}/jobs", get(list_driver_jobs))
        .route("/search", get(search))
        .route("/history/today", get(history_today))
        .route("/history/{date}", get(history_for_day))
        .route("/users", get(list_users).post(add_user))
        .route("/users/stats", get(user_stats))
        .route("/users/{user_id}", delete(remove_user));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/sites/{site_no}", site)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness check
async fn healthz() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

async fn car_in(
    State(state): State<AppState>,
    Path(site_no): Path<String>,
    Json(body): Json<CarInRequest>,
) -> std::result::Result<(StatusCode, Json<CarRecord>), ApiError> {
    let record = state
        .engine
        .submit_car_in(
            site_no,
            &body.car_no,
            &body.valet_id,
            body.phone_number.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_active(
    State(state): State<AppState>,
    Path(site_no): Path<String>,
) -> ApiResult<Vec<CarRecord>> {
    Ok(Json(state.engine.list_active(site_no).await?))
}

async fn get_car(
    State(state): State<AppState>,
    Path((site_no, car_no)): Path<(String, String)>,
) -> ApiResult<CarRecord> {
    Ok(Json(state.engine.get_car(site_no, &car_no).await?))
}

async fn assign_driver(
    State(state): State<AppState>,
    Path((site_no, car_no)): Path<(String, String)>,
    Json(body): Json<AssignRequest>,
) -> ApiResult<CarRecord> {
    let record = state
        .engine
        .assign_driver(site_no, &car_no, &body.driver_id)
        .await?;
    Ok(Json(record))
}

async fn mark_parked(
    State(state): State<AppState>,
    Path((site_no, car_no)): Path<(String, String)>,
    Json(body): Json<ParkRequest>,
) -> ApiResult<CarRecord> {
    let record = state
        .engine
        .mark_parked(site_no, &car_no, &body.parking_spot)
        .await?;
    Ok(Json(record))
}

async fn request_car_out(
    State(state): State<AppState>,
    Path((site_no, car_no)): Path<(String, String)>,
) -> ApiResult<CarRecord> {
    Ok(Json(state.engine.request_car_out(site_no, &car_no).await?))
}

async fn mark_brought(
    State(state): State<AppState>,
    Path((site_no, car_no)): Path<(String, String)>,
) -> ApiResult<CarRecord> {
    Ok(Json(state.engine.mark_brought(site_no, &car_no).await?))
}

async fn mark_handed_over(
    State(state): State<AppState>,
    Path((site_no, car_no)): Path<(String, String)>,
) -> ApiResult<CarRecord> {
    Ok(Json(state.engine.mark_handed_over(site_no, &car_no).await?))
}

async fn mark_seen(
    State(state): State<AppState>,
    Path((site_no, car_no)): Path<(String, String)>,
    Json(body): Json<SeenRequest>,
) -> ApiResult<CarRecord> {
    Ok(Json(state.engine.mark_seen(site_no, &car_no, body.leg).await?))
}

async fn find_by_valet_id(
    State(state): State<AppState>,
    Path((site_no, valet_id)): Path<(String, String)>,
) -> ApiResult<CarRecord> {
    Ok(Json(state.engine.find_by_valet_id(site_no, &valet_id).await?))
}

async fn list_drivers(
    State(state): State<AppState>,
    Path(site_no): Path<String>,
) -> ApiResult<Vec<String>> {
    Ok(Json(state.engine.list_drivers(site_no).await?))
}

async fn driver_stats(
    State(state): State<AppState>,
    Path(site_no): Path<String>,
) -> ApiResult<Vec<DriverStats>> {
    Ok(Json(state.engine.driver_stats(site_no).await?))
}

async fn list_driver_jobs(
    State(state): State<AppState>,
    Path((site_no, driver_id)): Path<(String, String)>,
) -> ApiResult<Vec<CarRecord>> {
    Ok(Json(state.engine.list_driver_jobs(site_no, &driver_id).await?))
}

async fn search(
    State(state): State<AppState>,
    Path(site_no): Path<String>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<SourcedRecord>> {
    let hits = state
        .engine
        .search(site_no, params.q.as_deref(), params.include_archive)
        .await?;
    Ok(Json(hits))
}

async fn history_today(
    State(state): State<AppState>,
    Path(site_no): Path<String>,
) -> ApiResult<Vec<SourcedRecord>> {
    Ok(Json(state.engine.history_today(site_no).await?))
}

async fn history_for_day(
    State(state): State<AppState>,
    Path((site_no, date)): Path<(String, String)>,
) -> ApiResult<Vec<SourcedRecord>> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
        Error::InvalidInput(format!("Invalid date {:?}, expected YYYY-MM-DD", date))
    })?;
    Ok(Json(state.engine.history_for_day(site_no, date).await?))
}

async fn list_users(
    State(state): State<AppState>,
    Path(site_no): Path<String>,
) -> ApiResult<Vec<SiteUser>> {
    Ok(Json(state.engine.list_users(site_no).await?))
}

async fn add_user(
    State(state): State<AppState>,
    Path(site_no): Path<String>,
    Json(body): Json<NewUser>,
) -> std::result::Result<(StatusCode, Json<SiteUser>), ApiError> {
    let user = state.engine.add_user(site_no, &body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn user_stats(
    State(state): State<AppState>,
    Path(site_no): Path<String>,
) -> ApiResult<UserStats> {
    Ok(Json(state.engine.user_stats(site_no).await?))
}

async fn remove_user(
    State(state): State<AppState>,
    Path((site_no, user_id)): Path<(String, String)>,
) -> ApiResult<SiteUser> {
    Ok(Json(state.engine.remove_user(site_no, &user_id).await?))
}
