pub mod manager;
pub mod metrics;
pub mod orchestrator;
pub mod resolver;
pub mod sweeper;

pub use manager::{ReservationManager, SettleOutcome};
pub use orchestrator::{MockPaymentAdapter, PaymentOrchestrator};
pub use resolver::{CapacityResolver, FALLBACK_CAPACITY};
pub use sweeper::{ExpirySweeper, SweepReport};
