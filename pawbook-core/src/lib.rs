pub mod clock;
pub mod models;
pub mod payment;
pub mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use models::{
    AvailabilityRecord, CapacityDefault, CapacityOverride, HoldRequest, NewCapacityOverride,
    NewReservation, Reservation, ReservationId, ReservationStatus, Service, Slot, SlotKey,
};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// No capacity left on the requested slot. Expected, user-facing.
    #[error("No remaining capacity for {0}")]
    Full(SlotKey),
    #[error("Reservation not found: {0}")]
    NotFound(ReservationId),
    #[error("Reservation {id} is {status}, expected {expected}")]
    InvalidState {
        id: ReservationId,
        status: ReservationStatus,
        expected: ReservationStatus,
    },
    /// Still `active` but past `expires_at`; the sweeper has not reached it yet.
    #[error("Reservation {0} has expired")]
    HoldExpired(ReservationId),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Payment provider error: {0}")]
    Payment(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
