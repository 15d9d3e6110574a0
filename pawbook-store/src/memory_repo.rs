use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use pawbook_core::repository::{CapacityRepository, HoldOutcome, ReservationStore, Settlement};
use pawbook_core::{
    AvailabilityRecord, CapacityDefault, CapacityOverride, CoreError, CoreResult,
    NewCapacityOverride, NewReservation, Reservation, ReservationId, ReservationStatus, Service,
    Slot, SlotKey,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Ledger {
    reservations: HashMap<ReservationId, Reservation>,
    /// Idempotency key -> id, active holds only.
    active_keys: HashMap<String, ReservationId>,
}

/// Process-local store for tests and single-node development.
///
/// Each availability record sits behind its own mutex; the reservation ledger is
/// only ever locked after a record, never the other way round.
#[derive(Default)]
pub struct InMemoryReservationStore {
    records: Mutex<HashMap<SlotKey, Arc<Mutex<AvailabilityRecord>>>>,
    ledger: RwLock<Ledger>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_cell(&self, key: &SlotKey, capacity: u32) -> Arc<Mutex<AvailabilityRecord>> {
        self.records
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(AvailabilityRecord::empty(key, capacity))))
            .clone()
    }

    fn existing_cell(&self, key: &SlotKey) -> CoreResult<Arc<Mutex<AvailabilityRecord>>> {
        self.records
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::Store(format!("availability record missing for {}", key)))
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn ensure_availability(
        &self,
        key: &SlotKey,
        capacity: u32,
        refresh: bool,
    ) -> CoreResult<AvailabilityRecord> {
        let cell = self.record_cell(key, capacity);
        let mut record = cell.lock();
        if refresh {
            record.refresh_capacity(capacity);
        }
        Ok(record.clone())
    }

    async fn create_hold(
        &self,
        hold: NewReservation,
        capacity: u32,
        refresh: bool,
    ) -> CoreResult<HoldOutcome> {
        let cell = self.record_cell(&hold.key, capacity);
        let mut record = cell.lock();
        if refresh {
            record.refresh_capacity(capacity);
        }
        // Key before capacity: a retry whose own hold took the last unit is not Full.
        let mut ledger = self.ledger.write();
        if ledger.active_keys.contains_key(&hold.idempotency_key) {
            return Ok(HoldOutcome::DuplicateKey);
        }
        if record.remaining() == 0 {
            return Ok(HoldOutcome::Full(record.clone()));
        }

        let reservation = hold.into_reservation();
        ledger
            .active_keys
            .insert(reservation.idempotency_key.clone(), reservation.id);
        ledger.reservations.insert(reservation.id, reservation.clone());
        record.reserved += 1;

        Ok(HoldOutcome::Created {
            reservation,
            availability: record.clone(),
        })
    }

    async fn settle_hold(
        &self,
        id: ReservationId,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<Settlement> {
        if to == ReservationStatus::Active {
            return Err(CoreError::Validation("cannot settle a hold back to active".to_string()));
        }

        let Some(key) = self.ledger.read().reservations.get(&id).map(Reservation::key) else {
            return Ok(Settlement::NotFound);
        };

        let cell = self.existing_cell(&key)?;
        let mut record = cell.lock();
        let mut ledger = self.ledger.write();
        let Some(reservation) = ledger.reservations.get_mut(&id) else {
            return Ok(Settlement::NotFound);
        };

        // Status is re-read under the record lock; a concurrent settle may have won.
        let not_due = to == ReservationStatus::Expired && reservation.expires_at >= now;
        if !reservation.is_active() || not_due {
            return Ok(Settlement::Unchanged(reservation.clone()));
        }

        let clamped = record.reserved == 0;
        record.reserved = record.reserved.saturating_sub(1);
        if to == ReservationStatus::Committed {
            record.confirmed += 1;
        }
        reservation.status = to;
        reservation.updated_at = now;

        let reservation = reservation.clone();
        ledger.active_keys.remove(&reservation.idempotency_key);

        Ok(Settlement::Applied {
            reservation,
            availability: record.clone(),
            clamped,
        })
    }

    async fn get_reservation(&self, id: ReservationId) -> CoreResult<Option<Reservation>> {
        Ok(self.ledger.read().reservations.get(&id).cloned())
    }

    async fn find_active_by_idempotency_key(&self, key: &str) -> CoreResult<Option<Reservation>> {
        let ledger = self.ledger.read();
        Ok(ledger
            .active_keys
            .get(key)
            .and_then(|id| ledger.reservations.get(id))
            .cloned())
    }

    async fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<ReservationId>> {
        let ledger = self.ledger.read();
        let mut due: Vec<&Reservation> = ledger
            .reservations
            .values()
            .filter(|r| r.is_active() && r.expires_at < now)
            .collect();
        due.sort_by_key(|r| r.expires_at);
        Ok(due.into_iter().take(limit).map(|r| r.id).collect())
    }

    async fn attach_payment_intent(
        &self,
        id: ReservationId,
        payment_intent_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<Reservation>> {
        let mut ledger = self.ledger.write();
        match ledger.reservations.get_mut(&id) {
            Some(reservation) if reservation.is_active() => {
                reservation.pending_payment_intent_id = Some(payment_intent_id.to_string());
                reservation.updated_at = now;
                Ok(Some(reservation.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// In-memory capacity configuration.
#[derive(Default)]
pub struct InMemoryCapacityRepository {
    defaults: RwLock<HashMap<Service, CapacityDefault>>,
    overrides: RwLock<Vec<CapacityOverride>>,
}

impl InMemoryCapacityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed defaults, mostly for tests.
    pub fn with_defaults(defaults: impl IntoIterator<Item = (Service, u32)>) -> Self {
        let now = Utc::now();
        let defaults = defaults
            .into_iter()
            .map(|(service, capacity)| {
                (
                    service,
                    CapacityDefault {
                        service,
                        capacity,
                        updated_at: now,
                    },
                )
            })
            .collect();
        Self {
            defaults: RwLock::new(defaults),
            overrides: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CapacityRepository for InMemoryCapacityRepository {
    async fn get_default(&self, service: Service) -> CoreResult<Option<CapacityDefault>> {
        Ok(self.defaults.read().get(&service).cloned())
    }

    async fn list_defaults(&self) -> CoreResult<Vec<CapacityDefault>> {
        let mut defaults: Vec<CapacityDefault> = self.defaults.read().values().cloned().collect();
        defaults.sort_by_key(|d| d.service);
        Ok(defaults)
    }

    async fn set_default(&self, service: Service, capacity: u32) -> CoreResult<CapacityDefault> {
        CapacityDefault::validate_capacity(capacity)?;
        let entry = CapacityDefault {
            service,
            capacity,
            updated_at: Utc::now(),
        };
        self.defaults.write().insert(service, entry.clone());
        Ok(entry)
    }

    async fn overrides_covering(
        &self,
        service: Service,
        date: NaiveDate,
        slot: &Slot,
    ) -> CoreResult<Vec<CapacityOverride>> {
        Ok(self
            .overrides
            .read()
            .iter()
            .filter(|o| o.covers(service, date, slot))
            .cloned()
            .collect())
    }

    async fn list_overrides(&self, service: Option<Service>) -> CoreResult<Vec<CapacityOverride>> {
        let mut overrides: Vec<CapacityOverride> = self
            .overrides
            .read()
            .iter()
            .filter(|o| service.map_or(true, |s| o.service == s))
            .cloned()
            .collect();
        overrides.sort_by(|a, b| {
            a.date_start
                .cmp(&b.date_start)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(overrides)
    }

    async fn add_override(&self, new: NewCapacityOverride) -> CoreResult<CapacityOverride> {
        new.validate()?;
        let created = new.into_override(Uuid::new_v4(), Utc::now());
        self.overrides.write().push(created.clone());
        Ok(created)
    }

    async fn delete_override(&self, id: Uuid) -> CoreResult<bool> {
        let mut overrides = self.overrides.write();
        let before = overrides.len();
        overrides.retain(|o| o.id != id);
        Ok(overrides.len() != before)
    }
}
