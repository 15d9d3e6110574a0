use chrono::{DateTime, Duration, NaiveDate, Utc};
use pawbook_core::repository::{HoldOutcome, ReservationStore, Settlement};
use pawbook_core::{
    AvailabilityRecord, Clock, CoreError, CoreResult, HoldRequest, NewReservation, Reservation,
    ReservationId, ReservationStatus, Service, Slot, SlotKey,
};
use pawbook_shared::models::{ReservationEvent, ReservationEventKind};
use pawbook_shared::Masked;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::resolver::CapacityResolver;

/// Attempts at resolving a lost race on the active-idempotency-key index.
const IDEMPOTENCY_ATTEMPTS: usize = 3;
const EVENT_BUFFER: usize = 256;

/// What a commit/release/expire call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Applied,
    /// The hold was not eligible; it keeps the status shown here.
    Unchanged(ReservationStatus),
    NotFound,
}

/// Transactional core: soft holds, commits and releases against the
/// availability counters.
///
/// Every state change is idempotent. Replays from at-least-once callers
/// (webhooks, retried clients) resolve to [`SettleOutcome::Unchanged`] rather
/// than errors.
pub struct ReservationManager {
    store: Arc<dyn ReservationStore>,
    resolver: CapacityResolver,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    events: broadcast::Sender<ReservationEvent>,
}

impl ReservationManager {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        resolver: CapacityResolver,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            store,
            resolver,
            clock,
            ttl,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    pub fn resolver(&self) -> &CapacityResolver {
        &self.resolver
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReservationEvent> {
        self.events.subscribe()
    }

    /// Place a soft hold on one unit of capacity.
    ///
    /// A retried call carrying the key of a still-active hold returns that hold
    /// without touching the counters. If that hold has already lapsed it is
    /// expired here and a new one is placed.
    pub async fn create(&self, request: HoldRequest) -> CoreResult<Reservation> {
        request.validate()?;
        let key = request.key();
        let idempotency_key = request.idempotency_key.trim().to_string();

        for _ in 0..IDEMPOTENCY_ATTEMPTS {
            if let Some(existing) = self.store.find_active_by_idempotency_key(&idempotency_key).await? {
                if existing.expires_at < self.clock.now() {
                    // Lapsed but not swept yet; free the key and place a fresh hold.
                    debug!(reservation_id = %existing.id, "retried key points at a lapsed hold, expiring it");
                    self.expire(existing.id).await?;
                    continue;
                }
                if existing.key() != key {
                    warn!(
                        reservation_id = %existing.id,
                        held = %existing.key(),
                        requested = %key,
                        "idempotency key reused for a different slot, returning original hold"
                    );
                }
                debug!(reservation_id = %existing.id, "duplicate create absorbed by idempotency key");
                return Ok(existing);
            }

            let capacity = self.resolver.effective_capacity(key.service, key.date, &key.slot).await?;
            let now = self.clock.now();
            let hold = NewReservation {
                id: Uuid::new_v4(),
                key: key.clone(),
                user_email: request.user_email.trim().to_string(),
                dog_id: request.dog_id.clone(),
                idempotency_key: idempotency_key.clone(),
                expires_at: now + self.ttl,
                created_at: now,
            };

            match self.store.create_hold(hold, capacity, refreshable(key.date, now)).await? {
                HoldOutcome::Created { reservation, availability } => {
                    metrics::record_hold_created(key.service.as_str());
                    info!(
                        reservation_id = %reservation.id,
                        slot = %key,
                        user = %Masked(&reservation.user_email),
                        expires_at = %reservation.expires_at,
                        remaining = availability.remaining(),
                        "hold created"
                    );
                    self.publish(&reservation, ReservationEventKind::HoldCreated, &availability);
                    return Ok(reservation);
                }
                HoldOutcome::Full(record) => {
                    metrics::record_hold_rejected_full(key.service.as_str());
                    info!(
                        slot = %key,
                        capacity = record.capacity,
                        reserved = record.reserved,
                        confirmed = record.confirmed,
                        "slot fully booked"
                    );
                    return Err(CoreError::Full(key));
                }
                HoldOutcome::DuplicateKey => {
                    debug!(slot = %key, "lost idempotency key race, re-reading winner");
                }
            }
        }

        Err(CoreError::Store(format!(
            "idempotency key kept conflicting after {} attempts",
            IDEMPOTENCY_ATTEMPTS
        )))
    }

    /// Move a hold from reserved to confirmed after payment succeeded.
    ///
    /// Never fails on replay or on a hold that already left `active`; those
    /// cases are logged and reported as [`SettleOutcome::Unchanged`].
    pub async fn commit(&self, id: ReservationId) -> CoreResult<SettleOutcome> {
        match self.settle(id, ReservationStatus::Committed).await? {
            SettleOutcome::Unchanged(ReservationStatus::Committed) => {
                debug!(reservation_id = %id, "commit replay ignored");
                Ok(SettleOutcome::Unchanged(ReservationStatus::Committed))
            }
            SettleOutcome::Unchanged(status) => {
                error!(reservation_id = %id, %status, "commit requested for a hold that is no longer active");
                Ok(SettleOutcome::Unchanged(status))
            }
            SettleOutcome::NotFound => {
                error!(reservation_id = %id, "commit requested for unknown reservation");
                Ok(SettleOutcome::NotFound)
            }
            SettleOutcome::Applied => Ok(SettleOutcome::Applied),
        }
    }

    /// Give the held unit back to the pool. Double release is harmless.
    pub async fn release(&self, id: ReservationId) -> CoreResult<SettleOutcome> {
        let outcome = self.settle(id, ReservationStatus::Released).await?;
        if let SettleOutcome::Unchanged(status) = outcome {
            debug!(reservation_id = %id, %status, "release ignored, hold not active");
        }
        Ok(outcome)
    }

    /// Expire a hold whose TTL has passed. Used by the sweeper.
    pub async fn expire(&self, id: ReservationId) -> CoreResult<SettleOutcome> {
        self.settle(id, ReservationStatus::Expired).await
    }

    async fn settle(&self, id: ReservationId, to: ReservationStatus) -> CoreResult<SettleOutcome> {
        let now = self.clock.now();
        match self.store.settle_hold(id, to, now).await? {
            Settlement::Applied {
                reservation,
                availability,
                clamped,
            } => {
                if clamped {
                    metrics::record_counter_clamp("reserved", to.as_str());
                    warn!(
                        reservation_id = %id,
                        slot = %availability.key(),
                        operation = to.as_str(),
                        "reserved counter already at zero, decrement clamped"
                    );
                }
                metrics::record_hold_settled(to.as_str());
                info!(
                    reservation_id = %id,
                    slot = %availability.key(),
                    status = %to,
                    reserved = availability.reserved,
                    confirmed = availability.confirmed,
                    "hold settled"
                );
                let kind = match to {
                    ReservationStatus::Committed => ReservationEventKind::Committed,
                    ReservationStatus::Released => ReservationEventKind::Released,
                    _ => ReservationEventKind::Expired,
                };
                self.publish(&reservation, kind, &availability);
                Ok(SettleOutcome::Applied)
            }
            Settlement::Unchanged(reservation) => Ok(SettleOutcome::Unchanged(reservation.status)),
            Settlement::NotFound => Ok(SettleOutcome::NotFound),
        }
    }

    /// Current counters for a slot, materializing the row on first access.
    pub async fn availability(&self, service: Service, date: NaiveDate, slot: &Slot) -> CoreResult<AvailabilityRecord> {
        let capacity = self.resolver.effective_capacity(service, date, slot).await?;
        let key = SlotKey::new(service, date, slot.clone());
        self.store
            .ensure_availability(&key, capacity, refreshable(date, self.clock.now()))
            .await
    }

    pub async fn get(&self, id: ReservationId) -> CoreResult<Reservation> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or(CoreError::NotFound(id))
    }

    /// Load a hold that can still be paid for.
    pub async fn payable(&self, id: ReservationId) -> CoreResult<Reservation> {
        let reservation = self.get(id).await?;
        if !reservation.is_active() {
            return Err(CoreError::InvalidState {
                id,
                status: reservation.status,
                expected: ReservationStatus::Active,
            });
        }
        if !reservation.is_holding(self.clock.now()) {
            return Err(CoreError::HoldExpired(id));
        }
        Ok(reservation)
    }

    pub async fn attach_payment_intent(&self, id: ReservationId, payment_intent_id: &str) -> CoreResult<Reservation> {
        match self
            .store
            .attach_payment_intent(id, payment_intent_id, self.clock.now())
            .await?
        {
            Some(reservation) => {
                info!(reservation_id = %id, payment_intent_id, "payment intent attached");
                Ok(reservation)
            }
            None => {
                let current = self.get(id).await?;
                Err(CoreError::InvalidState {
                    id,
                    status: current.status,
                    expected: ReservationStatus::Active,
                })
            }
        }
    }

    fn publish(&self, reservation: &Reservation, kind: ReservationEventKind, availability: &AvailabilityRecord) {
        let event = ReservationEvent {
            reservation_id: reservation.id,
            kind,
            service: reservation.service.to_string(),
            date: reservation.date,
            slot: reservation.slot.to_string(),
            remaining: availability.remaining(),
            occurred_at: self.clock.now().timestamp(),
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Stored capacity may follow configuration changes for today and later only.
fn refreshable(date: NaiveDate, now: DateTime<Utc>) -> bool {
    date >= now.date_naive()
}
