use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pawbook_core::repository::CapacityRepository;
use pawbook_core::{
    CapacityDefault, CapacityOverride, CoreError, CoreResult, NewCapacityOverride, Service, Slot,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::reservation_repo::{from_db, to_db};
use crate::store_error;

pub struct PostgresCapacityRepository {
    pool: PgPool,
}

impl PostgresCapacityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DefaultRow {
    service: String,
    capacity: i32,
    updated_at: DateTime<Utc>,
}

impl DefaultRow {
    fn into_default(self) -> CoreResult<CapacityDefault> {
        Ok(CapacityDefault {
            service: self
                .service
                .parse()
                .map_err(|e: CoreError| CoreError::Store(format!("corrupt capacity default: {}", e)))?,
            capacity: from_db(self.capacity),
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OverrideRow {
    id: Uuid,
    service: String,
    date_start: NaiveDate,
    date_end: NaiveDate,
    slot: String,
    capacity: i32,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl OverrideRow {
    fn into_override(self) -> CoreResult<CapacityOverride> {
        let id = self.id;
        let corrupt = |e: CoreError| CoreError::Store(format!("corrupt capacity override {}: {}", id, e));
        Ok(CapacityOverride {
            id,
            service: self.service.parse().map_err(corrupt)?,
            date_start: self.date_start,
            date_end: self.date_end,
            slot: Slot::try_from(self.slot).map_err(corrupt)?,
            capacity: from_db(self.capacity),
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl CapacityRepository for PostgresCapacityRepository {
    async fn get_default(&self, service: Service) -> CoreResult<Option<CapacityDefault>> {
        let row: Option<DefaultRow> = sqlx::query_as(
            "SELECT service, capacity, updated_at FROM capacity_defaults WHERE service = $1",
        )
        .bind(service.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(DefaultRow::into_default).transpose()
    }

    async fn list_defaults(&self) -> CoreResult<Vec<CapacityDefault>> {
        let rows: Vec<DefaultRow> = sqlx::query_as(
            "SELECT service, capacity, updated_at FROM capacity_defaults ORDER BY service",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(DefaultRow::into_default).collect()
    }

    async fn set_default(&self, service: Service, capacity: u32) -> CoreResult<CapacityDefault> {
        CapacityDefault::validate_capacity(capacity)?;
        let row: DefaultRow = sqlx::query_as(
            r#"
            INSERT INTO capacity_defaults (service, capacity, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (service) DO UPDATE
                SET capacity = EXCLUDED.capacity, updated_at = NOW()
            RETURNING service, capacity, updated_at
            "#,
        )
        .bind(service.as_str())
        .bind(to_db(capacity))
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        row.into_default()
    }

    async fn overrides_covering(
        &self,
        service: Service,
        date: NaiveDate,
        slot: &Slot,
    ) -> CoreResult<Vec<CapacityOverride>> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            r#"
            SELECT id, service, date_start, date_end, slot, capacity, reason, created_at
            FROM capacity_overrides
            WHERE service = $1 AND slot = $2 AND date_start <= $3 AND date_end >= $3
            "#,
        )
        .bind(service.as_str())
        .bind(slot.as_str())
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(OverrideRow::into_override).collect()
    }

    async fn list_overrides(&self, service: Option<Service>) -> CoreResult<Vec<CapacityOverride>> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            r#"
            SELECT id, service, date_start, date_end, slot, capacity, reason, created_at
            FROM capacity_overrides
            WHERE ($1::TEXT IS NULL OR service = $1)
            ORDER BY date_start, created_at
            "#,
        )
        .bind(service.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(OverrideRow::into_override).collect()
    }

    async fn add_override(&self, new: NewCapacityOverride) -> CoreResult<CapacityOverride> {
        new.validate()?;
        let row: OverrideRow = sqlx::query_as(
            r#"
            INSERT INTO capacity_overrides (id, service, date_start, date_end, slot, capacity, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING id, service, date_start, date_end, slot, capacity, reason, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.service.as_str())
        .bind(new.date_start)
        .bind(new.date_end)
        .bind(new.slot.as_str())
        .bind(to_db(new.capacity))
        .bind(new.reason.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        row.into_override()
    }

    async fn delete_override(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM capacity_overrides WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }
}
