use async_trait::async_trait;
use pawbook_core::payment::{IntentRequest, PaymentAdapter, PaymentIntent, PaymentStatus};
use pawbook_core::{CoreError, CoreResult, Reservation};
use std::sync::Arc;
use tracing::info;

/// Opens payment intents for holds. Runs outside any store transaction.
pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn initialize_payment(
        &self,
        reservation: &Reservation,
        amount_cents: i64,
        currency: &str,
        booking_id: Option<String>,
    ) -> CoreResult<PaymentIntent> {
        if amount_cents <= 0 {
            return Err(CoreError::Validation("amountCents must be positive".to_string()));
        }
        let currency = currency.trim().to_ascii_lowercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::Validation("currency must be a 3-letter ISO code".to_string()));
        }

        let request = IntentRequest {
            reservation_id: reservation.id,
            amount_cents,
            currency,
            booking_id,
            idempotency_key: format!("reservation-{}", reservation.id.simple()),
        };
        let intent = self.adapter.create_intent(&request).await?;
        info!(reservation_id = %reservation.id, payment_intent_id = %intent.id, amount_cents, "payment intent created");
        Ok(intent)
    }
}

/// Deterministic stand-in for the gateway, used in development and tests.
pub struct MockPaymentAdapter;

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn create_intent(&self, request: &IntentRequest) -> CoreResult<PaymentIntent> {
        // Encode the reservation in the intent id so replays map to the same intent.
        let id = format!("mock_pi_{}", request.reservation_id.simple());
        Ok(PaymentIntent {
            client_secret: format!("{}_secret", id),
            id,
            reservation_id: request.reservation_id,
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
            status: PaymentStatus::RequiresPaymentMethod,
            booking_id: request.booking_id.clone(),
            created_at: chrono::Utc::now(),
        })
    }
}
