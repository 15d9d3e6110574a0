#![allow(dead_code)]

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use pawbook_booking::{CapacityResolver, ReservationManager};
use pawbook_core::{HoldRequest, ManualClock, Service, Slot};
use pawbook_store::{InMemoryCapacityRepository, InMemoryReservationStore};
use std::sync::Arc;

pub struct Harness {
    pub manager: Arc<ReservationManager>,
    pub capacity: Arc<InMemoryCapacityRepository>,
    pub store: Arc<InMemoryReservationStore>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(defaults: &[(Service, u32)]) -> Harness {
    harness_with_ttl(defaults, Duration::minutes(10))
}

pub fn harness_with_ttl(defaults: &[(Service, u32)], ttl: Duration) -> Harness {
    let capacity = Arc::new(InMemoryCapacityRepository::with_defaults(defaults.iter().copied()));
    let store = Arc::new(InMemoryReservationStore::new());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 12, 1, 9, 0, 0).unwrap()));
    let manager = Arc::new(ReservationManager::new(
        store.clone(),
        CapacityResolver::new(capacity.clone()),
        clock.clone(),
        ttl,
    ));
    Harness {
        manager,
        capacity,
        store,
        clock,
    }
}

pub fn christmas_eve() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 24).unwrap()
}

pub fn request(service: Service, idempotency_key: &str) -> HoldRequest {
    HoldRequest {
        service,
        date: christmas_eve(),
        slot: Slot::all_day(),
        user_email: "owner@example.com".to_string(),
        dog_id: Some("dog-1".to_string()),
        idempotency_key: idempotency_key.to_string(),
    }
}
