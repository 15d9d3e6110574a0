use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use pawbook_booking::SettleOutcome;
use pawbook_core::{HoldRequest, Reservation, ReservationStatus, Service, Slot};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::availability::parse_date;
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reservations", post(create_reservation))
        .route("/reservations/{id}", get(get_reservation))
        .route("/reservations/{id}/payment-intent", post(create_payment_intent))
        .route("/reservations/{id}/release", post(release_reservation))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub service: String,
    pub date: String,
    pub slot: Option<String>,
    pub user_email: String,
    pub dog_id: Option<String>,
    pub idempotency_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationResponse {
    pub reservation_id: Uuid,
}

/// What callers may see of a reservation. The owner's email stays server-side.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub reservation_id: Uuid,
    pub service: Service,
    pub date: NaiveDate,
    pub slot: Slot,
    pub dog_id: Option<String>,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub pending_payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationView {
    fn from(r: Reservation) -> Self {
        Self {
            reservation_id: r.id,
            service: r.service,
            date: r.date,
            slot: r.slot,
            dog_id: r.dog_id,
            status: r.status,
            expires_at: r.expires_at,
            pending_payment_intent_id: r.pending_payment_intent_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub booking_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /reservations
async fn create_reservation(
    State(state): State<AppState>,
    payload: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> Result<Json<CreateReservationResponse>, AppError> {
    let Json(req) = payload?;

    let request = HoldRequest {
        service: req.service.parse()?,
        date: parse_date(&req.date)?,
        slot: Slot::parse(req.slot.as_deref())?,
        user_email: req.user_email,
        dog_id: req.dog_id.filter(|d| !d.trim().is_empty()),
        idempotency_key: req.idempotency_key,
    };

    let reservation = state.manager.create(request).await?;
    Ok(Json(CreateReservationResponse {
        reservation_id: reservation.id,
    }))
}

/// GET /reservations/{id}
async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationView>, AppError> {
    let reservation = state.manager.get(id).await?;
    Ok(Json(reservation.into()))
}

/// POST /reservations/{id}/payment-intent
///
/// The gateway call happens outside any store transaction; only the resulting
/// intent id is written back onto the hold.
async fn create_payment_intent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<PaymentIntentRequest>, JsonRejection>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    let Json(req) = payload?;
    let reservation = state.manager.payable(id).await?;

    let intent = state
        .payment_orchestrator
        .initialize_payment(&reservation, req.amount_cents, &req.currency, req.booking_id)
        .await?;

    state.manager.attach_payment_intent(id, &intent.id).await?;

    Ok(Json(PaymentIntentResponse {
        client_secret: intent.client_secret,
        payment_intent_id: intent.id,
    }))
}

/// POST /reservations/{id}/release
async fn release_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = match state.manager.release(id).await? {
        SettleOutcome::Applied => "Reservation released".to_string(),
        SettleOutcome::Unchanged(status) => format!("Reservation already {}", status),
        SettleOutcome::NotFound => return Err(AppError::NotFoundError("reservation not found".to_string())),
    };
    Ok(Json(MessageResponse { message }))
}
