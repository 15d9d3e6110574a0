use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use futures_util::{Stream, StreamExt};
use pawbook_core::{AvailabilityRecord, Service, Slot};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/availability", get(get_availability))
        .route("/availability/stream", get(stream_availability))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub service: String,
    pub date: String,
    pub slot: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityView {
    pub service: Service,
    pub date: NaiveDate,
    pub slot: Slot,
    pub capacity: u32,
    pub reserved: u32,
    pub confirmed: u32,
    pub remaining: u32,
}

impl From<AvailabilityRecord> for AvailabilityView {
    fn from(record: AvailabilityRecord) -> Self {
        Self {
            remaining: record.remaining(),
            service: record.service,
            date: record.date,
            slot: record.slot,
            capacity: record.capacity,
            reserved: record.reserved,
            confirmed: record.confirmed,
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::ValidationError(format!("date must be YYYY-MM-DD, got '{}'", raw)))
}

/// GET /availability?service=&date=&slot=
async fn get_availability(
    State(state): State<AppState>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<AvailabilityView>, AppError> {
    let Query(query) = query?;
    let service: Service = query.service.parse()?;
    let date = parse_date(&query.date)?;
    let slot = Slot::parse(query.slot.as_deref())?;

    let record = state.manager.availability(service, date, &slot).await?;
    Ok(Json(record.into()))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub service: String,
    pub date: String,
}

/// GET /availability/stream?service=&date=
///
/// Pushes hold lifecycle events for one service and day so booking pages can
/// refresh remaining capacity without polling.
async fn stream_availability(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let Query(query) = query?;
    let service: Service = query.service.parse()?;
    let date = parse_date(&query.date)?;

    let stream = BroadcastStream::new(state.manager.subscribe()).filter_map(move |message| {
        let event = match message {
            Ok(event) if event.concerns(service.as_str(), date) => {
                Some(Event::default().event(event.name()).json_data(&event))
            }
            Ok(_) => None,
            Err(lagged) => {
                tracing::warn!(error = %lagged, "availability stream subscriber lagged");
                None
            }
        };
        std::future::ready(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
