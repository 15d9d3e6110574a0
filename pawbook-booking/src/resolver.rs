use chrono::NaiveDate;
use pawbook_core::repository::CapacityRepository;
use pawbook_core::{CapacityOverride, CoreResult, Service, Slot};
use std::sync::Arc;
use tracing::debug;

/// Used when neither an override nor a per-service default is configured.
pub const FALLBACK_CAPACITY: u32 = 10;

/// Resolves the effective capacity of a (service, date, slot).
///
/// Precedence is strict: override, then per-service default, then fallback.
#[derive(Clone)]
pub struct CapacityResolver {
    repo: Arc<dyn CapacityRepository>,
    fallback: u32,
}

impl CapacityResolver {
    pub fn new(repo: Arc<dyn CapacityRepository>) -> Self {
        Self {
            repo,
            fallback: FALLBACK_CAPACITY,
        }
    }

    pub fn with_fallback(mut self, fallback: u32) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn repository(&self) -> &Arc<dyn CapacityRepository> {
        &self.repo
    }

    pub async fn effective_capacity(&self, service: Service, date: NaiveDate, slot: &Slot) -> CoreResult<u32> {
        let overrides = self.repo.overrides_covering(service, date, slot).await?;
        if let Some(ov) = most_specific(&overrides, service, date, slot) {
            debug!(%service, %date, %slot, override_id = %ov.id, capacity = ov.capacity, "capacity from override");
            return Ok(ov.capacity);
        }

        if let Some(default) = self.repo.get_default(service).await? {
            return Ok(default.capacity);
        }

        debug!(%service, fallback = self.fallback, "no capacity configured, using fallback");
        Ok(self.fallback)
    }
}

/// Narrowest covering range wins; ties go to the most recently created override.
pub fn most_specific<'a>(
    overrides: &'a [CapacityOverride],
    service: Service,
    date: NaiveDate,
    slot: &Slot,
) -> Option<&'a CapacityOverride> {
    overrides
        .iter()
        .filter(|ov| ov.covers(service, date, slot))
        .min_by(|a, b| {
            a.span_days()
                .cmp(&b.span_days())
                .then_with(|| b.created_at.cmp(&a.created_at))
        })
}
