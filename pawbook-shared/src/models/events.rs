use chrono::NaiveDate;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationEventKind {
    HoldCreated,
    Committed,
    Released,
    Expired,
}

/// Emitted after a reservation transaction has been committed to the store.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationEvent {
    pub reservation_id: Uuid,
    pub kind: ReservationEventKind,
    pub service: String,
    pub date: NaiveDate,
    pub slot: String,
    /// Remaining capacity on the slot right after the transition.
    pub remaining: u32,
    pub occurred_at: i64,
}

impl ReservationEvent {
    /// SSE event name, e.g. `hold_created`.
    pub fn name(&self) -> &'static str {
        match self.kind {
            ReservationEventKind::HoldCreated => "hold_created",
            ReservationEventKind::Committed => "committed",
            ReservationEventKind::Released => "released",
            ReservationEventKind::Expired => "expired",
        }
    }

    pub fn concerns(&self, service: &str, date: NaiveDate) -> bool {
        self.service == service && self.date == date
    }
}
