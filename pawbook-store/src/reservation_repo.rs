use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pawbook_core::repository::{HoldOutcome, ReservationStore, Settlement};
use pawbook_core::{
    AvailabilityRecord, CoreError, CoreResult, NewReservation, Reservation, ReservationId,
    ReservationStatus, SlotKey,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::store_error;

/// Postgres-backed store. Check-then-increment runs under `SELECT ... FOR UPDATE`
/// on the single availability row involved.
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
pub(crate) struct AvailabilityRow {
    service: String,
    date: NaiveDate,
    slot: String,
    capacity: i32,
    reserved: i32,
    confirmed: i32,
}

impl AvailabilityRow {
    fn into_record(self) -> CoreResult<AvailabilityRecord> {
        let corrupt = |e: CoreError| CoreError::Store(format!("corrupt availability row: {}", e));
        Ok(AvailabilityRecord {
            service: self.service.parse().map_err(corrupt)?,
            date: self.date,
            slot: self.slot.try_into().map_err(corrupt)?,
            capacity: from_db(self.capacity),
            reserved: from_db(self.reserved),
            confirmed: from_db(self.confirmed),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ReservationRow {
    id: Uuid,
    service: String,
    date: NaiveDate,
    slot: String,
    user_email: String,
    dog_id: Option<String>,
    status: String,
    expires_at: DateTime<Utc>,
    idempotency_key: String,
    pending_payment_intent_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_reservation(self) -> CoreResult<Reservation> {
        let id = self.id;
        let corrupt = |e: CoreError| CoreError::Store(format!("corrupt reservation row {}: {}", id, e));
        Ok(Reservation {
            id,
            service: self.service.parse().map_err(corrupt)?,
            date: self.date,
            slot: self.slot.try_into().map_err(corrupt)?,
            user_email: self.user_email,
            dog_id: self.dog_id,
            status: self.status.parse().map_err(corrupt)?,
            expires_at: self.expires_at,
            idempotency_key: self.idempotency_key,
            pending_payment_intent_id: self.pending_payment_intent_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn to_db(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

pub(crate) fn from_db(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

/// Create the counter row if missing; optionally let its capacity follow `capacity`
/// without dropping below what is already allocated. No-op writes are skipped.
async fn upsert_availability(
    conn: &mut PgConnection,
    key: &SlotKey,
    capacity: u32,
    refresh: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO availability (service, date, slot, capacity)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (service, date, slot) DO UPDATE
            SET capacity = GREATEST(EXCLUDED.capacity, availability.reserved + availability.confirmed),
                updated_at = NOW()
            WHERE $5
              AND availability.capacity <> GREATEST(EXCLUDED.capacity, availability.reserved + availability.confirmed)
        "#,
    )
    .bind(key.service.as_str())
    .bind(key.date)
    .bind(key.slot.as_str())
    .bind(to_db(capacity))
    .bind(refresh)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn lock_availability(conn: &mut PgConnection, key: &SlotKey) -> CoreResult<AvailabilityRecord> {
    let row: AvailabilityRow = sqlx::query_as(
        r#"
        SELECT service, date, slot, capacity, reserved, confirmed
        FROM availability
        WHERE service = $1 AND date = $2 AND slot = $3
        FOR UPDATE
        "#,
    )
    .bind(key.service.as_str())
    .bind(key.date)
    .bind(key.slot.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(store_error)?;

    row.into_record()
}

#[async_trait]
impl ReservationStore for PostgresReservationStore {
    async fn ensure_availability(
        &self,
        key: &SlotKey,
        capacity: u32,
        refresh: bool,
    ) -> CoreResult<AvailabilityRecord> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;
        upsert_availability(&mut conn, key, capacity, refresh)
            .await
            .map_err(store_error)?;

        let row: AvailabilityRow = sqlx::query_as(
            r#"
            SELECT service, date, slot, capacity, reserved, confirmed
            FROM availability
            WHERE service = $1 AND date = $2 AND slot = $3
            "#,
        )
        .bind(key.service.as_str())
        .bind(key.date)
        .bind(key.slot.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(store_error)?;

        row.into_record()
    }

    async fn create_hold(
        &self,
        hold: NewReservation,
        capacity: u32,
        refresh: bool,
    ) -> CoreResult<HoldOutcome> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        upsert_availability(&mut tx, &hold.key, capacity, refresh)
            .await
            .map_err(store_error)?;
        let record = lock_availability(&mut tx, &hold.key).await?;

        // Key before capacity: a retry whose own hold took the last unit is not Full.
        let key_taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reservations WHERE idempotency_key = $1 AND status = 'active')",
        )
        .bind(&hold.idempotency_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;
        if key_taken {
            tx.rollback().await.map_err(store_error)?;
            return Ok(HoldOutcome::DuplicateKey);
        }

        if record.remaining() == 0 {
            tx.rollback().await.map_err(store_error)?;
            return Ok(HoldOutcome::Full(record));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO reservations (id, service, date, slot, user_email, dog_id, status, expires_at, idempotency_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $8, $9, $9)
            "#,
        )
        .bind(hold.id)
        .bind(hold.key.service.as_str())
        .bind(hold.key.date)
        .bind(hold.key.slot.as_str())
        .bind(&hold.user_email)
        .bind(hold.dog_id.as_deref())
        .bind(hold.expires_at)
        .bind(&hold.idempotency_key)
        .bind(hold.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tx.rollback().await.map_err(store_error)?;
                return Ok(HoldOutcome::DuplicateKey);
            }
            Err(e) => return Err(store_error(e)),
        }

        let updated: AvailabilityRow = sqlx::query_as(
            r#"
            UPDATE availability
            SET reserved = reserved + 1, updated_at = NOW()
            WHERE service = $1 AND date = $2 AND slot = $3
            RETURNING service, date, slot, capacity, reserved, confirmed
            "#,
        )
        .bind(hold.key.service.as_str())
        .bind(hold.key.date)
        .bind(hold.key.slot.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        Ok(HoldOutcome::Created {
            reservation: hold.into_reservation(),
            availability: updated.into_record()?,
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

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, service, date, slot, user_email, dog_id, status, expires_at, idempotency_key,
                   pending_payment_intent_id, created_at, updated_at
            FROM reservations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(store_error)?;
            return Ok(Settlement::NotFound);
        };
        let reservation = row.into_reservation()?;

        let not_due = to == ReservationStatus::Expired && reservation.expires_at >= now;
        if !reservation.is_active() || not_due {
            tx.rollback().await.map_err(store_error)?;
            return Ok(Settlement::Unchanged(reservation));
        }

        let key = reservation.key();
        let before = lock_availability(&mut tx, &key).await?;
        let confirmed_delta: i32 = if to == ReservationStatus::Committed { 1 } else { 0 };

        let availability: AvailabilityRow = sqlx::query_as(
            r#"
            UPDATE availability
            SET reserved = GREATEST(reserved - 1, 0),
                confirmed = confirmed + $4,
                updated_at = NOW()
            WHERE service = $1 AND date = $2 AND slot = $3
            RETURNING service, date, slot, capacity, reserved, confirmed
            "#,
        )
        .bind(key.service.as_str())
        .bind(key.date)
        .bind(key.slot.as_str())
        .bind(confirmed_delta)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;

        let updated: ReservationRow = sqlx::query_as(
            r#"
            UPDATE reservations
            SET status = $2, updated_at = $3
            WHERE id = $1
            RETURNING id, service, date, slot, user_email, dog_id, status, expires_at, idempotency_key,
                      pending_payment_intent_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        Ok(Settlement::Applied {
            reservation: updated.into_reservation()?,
            availability: availability.into_record()?,
            clamped: before.reserved == 0,
        })
    }

    async fn get_reservation(&self, id: ReservationId) -> CoreResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, service, date, slot, user_email, dog_id, status, expires_at, idempotency_key,
                   pending_payment_intent_id, created_at, updated_at
            FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn find_active_by_idempotency_key(&self, key: &str) -> CoreResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, service, date, slot, user_email, dog_id, status, expires_at, idempotency_key,
                   pending_payment_intent_id, created_at, updated_at
            FROM reservations
            WHERE idempotency_key = $1 AND status = 'active'
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<ReservationId>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM reservations
            WHERE status = 'active' AND expires_at < $1
            ORDER BY expires_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn attach_payment_intent(
        &self,
        id: ReservationId,
        payment_intent_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            UPDATE reservations
            SET pending_payment_intent_id = $2, updated_at = $3
            WHERE id = $1 AND status = 'active'
            RETURNING id, service, date, slot, user_email, dog_id, status, expires_at, idempotency_key,
                      pending_payment_intent_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(payment_intent_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(ReservationRow::into_reservation).transpose()
    }
}
