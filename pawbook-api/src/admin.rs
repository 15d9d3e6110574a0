use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use pawbook_core::{CapacityDefault, CapacityOverride, NewCapacityOverride, Service, Slot};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{admin_auth_middleware, AdminClaims};
use crate::state::AppState;

/// Capacity configuration. Every route requires an admin token.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/capacity/defaults", get(list_defaults))
        .route("/admin/capacity/defaults/{service}", put(set_default))
        .route("/admin/capacity/overrides", get(list_overrides).post(create_override))
        .route("/admin/capacity/overrides/{id}", delete(delete_override))
        .route_layer(axum::middleware::from_fn_with_state(state, admin_auth_middleware))
}

#[derive(Debug, Deserialize)]
pub struct SetDefaultRequest {
    pub capacity: u32,
}

#[derive(Debug, Deserialize)]
pub struct OverrideFilter {
    pub service: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOverrideRequest {
    pub service: String,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub slot: Option<String>,
    pub capacity: u32,
    pub reason: Option<String>,
}

async fn list_defaults(State(state): State<AppState>) -> Result<Json<Vec<CapacityDefault>>, AppError> {
    Ok(Json(state.capacity_repo.list_defaults().await?))
}

/// PUT /admin/capacity/defaults/{service}
async fn set_default(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(service): Path<String>,
    payload: Result<Json<SetDefaultRequest>, JsonRejection>,
) -> Result<Json<CapacityDefault>, AppError> {
    let Json(req) = payload?;
    let service: Service = service.parse()?;

    let updated = state.capacity_repo.set_default(service, req.capacity).await?;
    tracing::info!(admin = %claims.sub, %service, capacity = req.capacity, "capacity default updated");
    Ok(Json(updated))
}

async fn list_overrides(
    State(state): State<AppState>,
    filter: Result<Query<OverrideFilter>, QueryRejection>,
) -> Result<Json<Vec<CapacityOverride>>, AppError> {
    let Query(filter) = filter?;
    let service = filter
        .service
        .as_deref()
        .map(str::parse::<Service>)
        .transpose()?;
    Ok(Json(state.capacity_repo.list_overrides(service).await?))
}

/// POST /admin/capacity/overrides
async fn create_override(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    payload: Result<Json<CreateOverrideRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CapacityOverride>), AppError> {
    let Json(req) = payload?;
    let new = NewCapacityOverride {
        service: req.service.parse()?,
        date_start: req.date_start,
        date_end: req.date_end,
        slot: Slot::parse(req.slot.as_deref())?,
        capacity: req.capacity,
        reason: req.reason.filter(|r| !r.trim().is_empty()),
    };

    let created = state.capacity_repo.add_override(new).await?;
    tracing::info!(
        admin = %claims.sub,
        override_id = %created.id,
        service = %created.service,
        date_start = %created.date_start,
        date_end = %created.date_end,
        capacity = created.capacity,
        "capacity override created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_override(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.capacity_repo.delete_override(id).await? {
        return Err(AppError::NotFoundError(format!("override {} not found", id)));
    }
    tracing::info!(admin = %claims.sub, override_id = %id, "capacity override deleted");
    Ok(StatusCode::NO_CONTENT)
}
