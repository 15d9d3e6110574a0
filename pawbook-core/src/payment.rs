use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub reservation_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub booking_id: Option<String>,
    /// Stable per reservation so retried calls do not open duplicate intents.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String, // Provider's ID (e.g., pi_123)
    pub reservation_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub client_secret: String,
    pub booking_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Seam to the external payment gateway. The reservation id must travel in the
/// intent's metadata so the webhook can find the hold again.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    async fn create_intent(&self, request: &IntentRequest) -> CoreResult<PaymentIntent>;
}
