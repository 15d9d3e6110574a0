use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    AvailabilityRecord, CapacityDefault, CapacityOverride, NewCapacityOverride, NewReservation,
    Reservation, ReservationId, ReservationStatus, Service, Slot, SlotKey,
};
use crate::CoreResult;

/// Result of the atomic check-then-increment behind a new hold.
#[derive(Debug, Clone)]
pub enum HoldOutcome {
    Created {
        reservation: Reservation,
        availability: AvailabilityRecord,
    },
    /// Nothing was written; the slot had no remaining capacity.
    Full(AvailabilityRecord),
    /// Another active hold already owns the idempotency key.
    DuplicateKey,
}

/// Result of moving a hold out of `active`.
#[derive(Debug, Clone)]
pub enum Settlement {
    Applied {
        reservation: Reservation,
        availability: AvailabilityRecord,
        /// `reserved` was already zero and the decrement was clamped.
        clamped: bool,
    },
    /// Hold was not eligible (terminal, or not yet expired); nothing changed.
    Unchanged(Reservation),
    NotFound,
}

/// Durable home of availability counters and reservations.
///
/// Every mutating method is a single atomic transaction holding an exclusive lock
/// on the one availability record it touches.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Lazily materialize the counter row. `refresh` allows the stored capacity
    /// to follow `capacity`, never below what is already allocated.
    async fn ensure_availability(
        &self,
        key: &SlotKey,
        capacity: u32,
        refresh: bool,
    ) -> CoreResult<AvailabilityRecord>;

    async fn create_hold(
        &self,
        hold: NewReservation,
        capacity: u32,
        refresh: bool,
    ) -> CoreResult<HoldOutcome>;

    /// Transition an active hold into `to` (committed, released or expired).
    /// Expiry only applies when `expires_at < now`.
    async fn settle_hold(
        &self,
        id: ReservationId,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<Settlement>;

    async fn get_reservation(&self, id: ReservationId) -> CoreResult<Option<Reservation>>;

    async fn find_active_by_idempotency_key(&self, key: &str) -> CoreResult<Option<Reservation>>;

    /// Ids of active holds whose `expires_at` is before `now`, oldest first.
    async fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<ReservationId>>;

    /// Record the gateway reference on an active hold. Returns `None` if the hold
    /// does not exist or is no longer active.
    async fn attach_payment_intent(
        &self,
        id: ReservationId,
        payment_intent_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<Reservation>>;
}

/// Administrative capacity configuration.
#[async_trait]
pub trait CapacityRepository: Send + Sync {
    async fn get_default(&self, service: Service) -> CoreResult<Option<CapacityDefault>>;

    async fn list_defaults(&self) -> CoreResult<Vec<CapacityDefault>>;

    async fn set_default(&self, service: Service, capacity: u32) -> CoreResult<CapacityDefault>;

    /// Overrides whose range contains `date` for exactly this service and slot.
    async fn overrides_covering(
        &self,
        service: Service,
        date: NaiveDate,
        slot: &Slot,
    ) -> CoreResult<Vec<CapacityOverride>>;

    async fn list_overrides(&self, service: Option<Service>) -> CoreResult<Vec<CapacityOverride>>;

    async fn add_override(&self, new: NewCapacityOverride) -> CoreResult<CapacityOverride>;

    async fn delete_override(&self, id: Uuid) -> CoreResult<bool>;
}
