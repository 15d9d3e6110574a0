use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use pawbook_booking::SettleOutcome;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(handle_payment_webhook))
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: PaymentIntentObject,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

enum PaymentAction {
    Commit,
    Release,
}

impl PaymentAction {
    fn for_event(type_: &str) -> Option<Self> {
        match type_ {
            "payment_intent.succeeded" => Some(PaymentAction::Commit),
            "payment_intent.canceled" => Some(PaymentAction::Release),
            // The intent stays open for another card; an abandoned hold is left to the sweeper.
            "payment_intent.payment_failed" => None,
            _ => None,
        }
    }
}

/// POST /webhooks/payments
///
/// Gateway delivery is at-least-once. Replays and events for holds that
/// already left `active` are acknowledged with 200; only a store failure
/// returns an error, so the gateway retries.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    payload: Result<Json<PaymentWebhook>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(payload) = payload?;
    let intent = &payload.data.object;
    tracing::info!(event_id = %payload.id, event_type = %payload.type_, payment_intent_id = %intent.id, "payment webhook received");

    let Some(action) = PaymentAction::for_event(&payload.type_) else {
        tracing::debug!(event_type = %payload.type_, "ignoring unhandled payment event");
        return Ok(StatusCode::OK);
    };

    let Some(reservation_id) = intent
        .metadata
        .get("reservation_id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
    else {
        tracing::warn!(payment_intent_id = %intent.id, "payment event without a usable reservation_id");
        return Ok(StatusCode::OK);
    };

    let outcome = match action {
        PaymentAction::Commit => state.manager.commit(reservation_id).await?,
        PaymentAction::Release => state.manager.release(reservation_id).await?,
    };

    if outcome == SettleOutcome::Applied {
        tracing::info!(%reservation_id, payment_intent_id = %intent.id, status = ?intent.status, "reservation settled from payment event");
    }

    Ok(StatusCode::OK)
}
