use pawbook_booking::{PaymentOrchestrator, ReservationManager};
use pawbook_core::repository::CapacityRepository;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ReservationManager>,
    pub capacity_repo: Arc<dyn CapacityRepository>,
    pub payment_orchestrator: Arc<PaymentOrchestrator>,
    pub auth: AuthConfig,
}
