//! Reservation engine counters for Prometheus.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

/// Holds created, by service
static HOLDS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pawbook_holds_created_total",
        "Total reservation holds created",
        &["service"]
    )
    .expect("Failed to register pawbook_holds_created_total metric")
});

/// Create attempts rejected because the slot was full
static HOLDS_REJECTED_FULL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pawbook_holds_rejected_full_total",
        "Total hold attempts rejected for lack of capacity",
        &["service"]
    )
    .expect("Failed to register pawbook_holds_rejected_full_total metric")
});

/// Holds that left `active`, by terminal status
static HOLDS_SETTLED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pawbook_holds_settled_total",
        "Total holds moved to a terminal status",
        &["status"]
    )
    .expect("Failed to register pawbook_holds_settled_total metric")
});

/// Decrements that would have gone below zero.
///
/// A steady trickle here means a double decrement somewhere; replays of
/// already-settled holds never reach the counter.
static COUNTER_CLAMPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pawbook_counter_clamps_total",
        "Availability counter decrements clamped at zero",
        &["counter", "operation"]
    )
    .expect("Failed to register pawbook_counter_clamps_total metric")
});

/// Sweeper outcomes per hold
static SWEEPER_HOLDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pawbook_sweeper_holds_total",
        "Holds visited by the expiry sweeper, by outcome",
        &["outcome"]
    )
    .expect("Failed to register pawbook_sweeper_holds_total metric")
});

pub fn record_hold_created(service: &str) {
    HOLDS_CREATED.with_label_values(&[service]).inc();
}

pub fn record_hold_rejected_full(service: &str) {
    HOLDS_REJECTED_FULL.with_label_values(&[service]).inc();
}

pub fn record_hold_settled(status: &str) {
    HOLDS_SETTLED.with_label_values(&[status]).inc();
}

pub fn record_counter_clamp(counter: &str, operation: &str) {
    COUNTER_CLAMPS.with_label_values(&[counter, operation]).inc();
}

pub fn record_sweep(expired: u64, skipped: u64, failed: u64) {
    SWEEPER_HOLDS.with_label_values(&["expired"]).inc_by(expired);
    SWEEPER_HOLDS.with_label_values(&["skipped"]).inc_by(skipped);
    SWEEPER_HOLDS.with_label_values(&["failed"]).inc_by(failed);
}

pub fn clamp_count(counter: &str, operation: &str) -> u64 {
    COUNTER_CLAMPS.with_label_values(&[counter, operation]).get()
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    // Touch the statics so they appear even before the first event.
    Lazy::force(&HOLDS_CREATED);
    Lazy::force(&HOLDS_REJECTED_FULL);
    Lazy::force(&HOLDS_SETTLED);
    Lazy::force(&COUNTER_CLAMPS);
    Lazy::force(&SWEEPER_HOLDS);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
