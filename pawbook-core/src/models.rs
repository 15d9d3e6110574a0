use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

pub type ReservationId = Uuid;

/// Bookable services. Capacity is tracked independently for each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Service {
    #[serde(rename = "Daycare")]
    Daycare,
    #[serde(rename = "Boarding Small")]
    BoardingSmall,
    #[serde(rename = "Boarding Large")]
    BoardingLarge,
    #[serde(rename = "Trial Day")]
    TrialDay,
}

impl Service {
    pub const ALL: [Service; 4] = [
        Service::Daycare,
        Service::BoardingSmall,
        Service::BoardingLarge,
        Service::TrialDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Daycare => "Daycare",
            Service::BoardingSmall => "Boarding Small",
            Service::BoardingLarge => "Boarding Large",
            Service::TrialDay => "Trial Day",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Service::ALL
            .into_iter()
            .find(|service| service.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::Validation(format!("Unknown service: {}", s)))
    }
}

/// Sub-day window a capacity applies to. Services without slots use [`Slot::ALL_DAY`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot(String);

impl Slot {
    pub const ALL_DAY: &'static str = "ALL_DAY";
    const MAX_LEN: usize = 32;

    pub fn all_day() -> Self {
        Slot(Self::ALL_DAY.to_string())
    }

    /// A missing or blank slot means the whole day.
    pub fn parse(raw: Option<&str>) -> Result<Self, CoreError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::all_day()),
            Some(value) if value.len() > Self::MAX_LEN => Err(CoreError::Validation(format!(
                "Slot must be at most {} characters",
                Self::MAX_LEN
            ))),
            Some(value) => Ok(Slot(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_all_day(&self) -> bool {
        self.0 == Self::ALL_DAY
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::all_day()
    }
}

impl TryFrom<String> for Slot {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Slot::parse(Some(&value))
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one availability counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub service: Service,
    pub date: NaiveDate,
    pub slot: Slot,
}

impl SlotKey {
    pub fn new(service: Service, date: NaiveDate, slot: Slot) -> Self {
        Self { service, date, slot }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.date, self.slot)
    }
}

/// Counters for one (service, date, slot). `capacity >= reserved + confirmed` holds
/// after every successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub service: Service,
    pub date: NaiveDate,
    pub slot: Slot,
    pub capacity: u32,
    pub reserved: u32,
    pub confirmed: u32,
}

impl AvailabilityRecord {
    pub fn empty(key: &SlotKey, capacity: u32) -> Self {
        Self {
            service: key.service,
            date: key.date,
            slot: key.slot.clone(),
            capacity,
            reserved: 0,
            confirmed: 0,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.service, self.date, self.slot.clone())
    }

    pub fn allocated(&self) -> u32 {
        self.reserved.saturating_add(self.confirmed)
    }

    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.allocated())
    }

    /// Apply a capacity change without ever dropping below what is already allocated.
    pub fn refresh_capacity(&mut self, capacity: u32) -> bool {
        let next = capacity.max(self.allocated());
        if next == self.capacity {
            return false;
        }
        self.capacity = next;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Committed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Committed => "committed",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "committed" => Ok(ReservationStatus::Committed),
            "released" => Ok(ReservationStatus::Released),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(CoreError::Validation(format!("Unknown reservation status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub service: Service,
    pub date: NaiveDate,
    pub slot: Slot,
    pub user_email: String,
    pub dog_id: Option<String>,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub idempotency_key: String,
    pub pending_payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.service, self.date, self.slot.clone())
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Still active and inside its TTL.
    pub fn is_holding(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at > now
    }
}

/// What the manager asks the store to insert for a new hold.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub id: ReservationId,
    pub key: SlotKey,
    pub user_email: String,
    pub dog_id: Option<String>,
    pub idempotency_key: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewReservation {
    pub fn into_reservation(self) -> Reservation {
        Reservation {
            id: self.id,
            service: self.key.service,
            date: self.key.date,
            slot: self.key.slot,
            user_email: self.user_email,
            dog_id: self.dog_id,
            status: ReservationStatus::Active,
            expires_at: self.expires_at,
            idempotency_key: self.idempotency_key,
            pending_payment_intent_id: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Caller input for creating a hold.
#[derive(Debug, Clone)]
pub struct HoldRequest {
    pub service: Service,
    pub date: NaiveDate,
    pub slot: Slot,
    pub user_email: String,
    pub dog_id: Option<String>,
    pub idempotency_key: String,
}

impl HoldRequest {
    const MAX_KEY_LEN: usize = 255;

    pub fn validate(&self) -> Result<(), CoreError> {
        let key = self.idempotency_key.trim();
        if key.is_empty() {
            return Err(CoreError::Validation("idempotencyKey must not be empty".to_string()));
        }
        if key.len() > Self::MAX_KEY_LEN {
            return Err(CoreError::Validation(format!(
                "idempotencyKey must be at most {} characters",
                Self::MAX_KEY_LEN
            )));
        }
        let email = self.user_email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::Validation("userEmail is not a valid address".to_string()));
        }
        Ok(())
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.service, self.date, self.slot.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityDefault {
    pub service: Service,
    pub capacity: u32,
    pub updated_at: DateTime<Utc>,
}

impl CapacityDefault {
    /// Largest capacity the counters can store.
    pub const MAX_CAPACITY: u32 = i32::MAX as u32;

    pub fn validate_capacity(capacity: u32) -> Result<(), CoreError> {
        if capacity > Self::MAX_CAPACITY {
            return Err(CoreError::Validation(format!(
                "capacity must be at most {}",
                Self::MAX_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Date-range capacity that beats the per-service default (holiday closures etc).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityOverride {
    pub id: Uuid,
    pub service: Service,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub slot: Slot,
    pub capacity: u32,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CapacityOverride {
    pub fn covers(&self, service: Service, date: NaiveDate, slot: &Slot) -> bool {
        self.service == service && self.date_start <= date && date <= self.date_end && &self.slot == slot
    }

    /// Number of days in the range; smaller is more specific.
    pub fn span_days(&self) -> i64 {
        (self.date_end - self.date_start).num_days()
    }
}

#[derive(Debug, Clone)]
pub struct NewCapacityOverride {
    pub service: Service,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub slot: Slot,
    pub capacity: u32,
    pub reason: Option<String>,
}

impl NewCapacityOverride {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.date_end < self.date_start {
            return Err(CoreError::Validation("dateEnd must not be before dateStart".to_string()));
        }
        CapacityDefault::validate_capacity(self.capacity)
    }

    pub fn into_override(self, id: Uuid, created_at: DateTime<Utc>) -> CapacityOverride {
        CapacityOverride {
            id,
            service: self.service,
            date_start: self.date_start,
            date_end: self.date_end,
            slot: self.slot,
            capacity: self.capacity,
            reason: self.reason,
            created_at,
        }
    }
}
