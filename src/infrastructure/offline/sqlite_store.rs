use super::mappers::{
    local_ticket_from_row, museum_from_row, museum_price_from_row, pending_ticket_from_row,
    pending_usage_from_row, session_from_row, ticket_type_from_row,
};
use super::rows::{
    CachedMuseumPriceRow, CachedMuseumRow, CachedSessionRow, CachedTicketTypeRow, LocalTicketRow,
    PendingTicketRow, PendingUsageRow,
};
use crate::application::ports::offline_store::OfflineStore;
use crate::domain::entities::ticketing::{
    CachedMuseum, CachedMuseumPrice, CachedSession, CachedTicketType, CreditConsumption,
    LocalTicket, PendingCount, PendingTicket, PendingUsage, ReferenceSnapshot,
};
use crate::domain::value_objects::ticketing::{
    MuseumId, ScanCode, TicketId, TicketTypeId, UsageId,
};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, Transaction};

/// SQLite 上のオフラインストア。
pub struct SqliteOfflineStore {
    pool: Pool<Sqlite>,
}

impl SqliteOfflineStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn upsert_pending_ticket(
        tx: &mut Transaction<'_, Sqlite>,
        ticket: &PendingTicket,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO pending_tickets (
                id, scan_code, ticket_type_id, museum_id, session_id,
                price_cents, sold_by, initial_credits, created_at, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                scan_code = excluded.scan_code,
                ticket_type_id = excluded.ticket_type_id,
                museum_id = excluded.museum_id,
                session_id = excluded.session_id,
                price_cents = excluded.price_cents,
                sold_by = excluded.sold_by,
                initial_credits = excluded.initial_credits,
                created_at = excluded.created_at,
                synced = excluded.synced
            "#,
        )
        .bind(ticket.id.as_str())
        .bind(ticket.scan_code.as_str())
        .bind(ticket.ticket_type_id.as_str())
        .bind(ticket.museum_id.as_str())
        .bind(ticket.session_id.as_ref().map(|id| id.as_str()))
        .bind(ticket.price.cents())
        .bind(ticket.sold_by.as_str())
        .bind(i64::from(ticket.initial_credits))
        .bind(ticket.created_at.timestamp_millis())
        .bind(ticket.synced)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_local_ticket(
        tx: &mut Transaction<'_, Sqlite>,
        ticket: &LocalTicket,
        now: i64,
    ) -> Result<(), AppError> {
        // 既存行のクレジットは下げる方向にしか更新しない
        sqlx::query(
            r#"
            INSERT INTO local_tickets (
                id, scan_code, ticket_type_id, museum_id,
                remaining_credits, is_used, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                scan_code = excluded.scan_code,
                ticket_type_id = excluded.ticket_type_id,
                museum_id = excluded.museum_id,
                remaining_credits = MIN(local_tickets.remaining_credits, excluded.remaining_credits),
                is_used = MAX(local_tickets.is_used, excluded.is_used),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(ticket.id.as_str())
        .bind(ticket.scan_code.as_str())
        .bind(ticket.ticket_type_id.as_str())
        .bind(ticket.museum_id.as_str())
        .bind(i64::from(ticket.remaining_credits))
        .bind(ticket.is_used)
        .bind(ticket.created_at.timestamp_millis())
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_snapshot(
        tx: &mut Transaction<'_, Sqlite>,
        snapshot: &ReferenceSnapshot,
    ) -> Result<(), AppError> {
        match snapshot {
            ReferenceSnapshot::Museums(items) => {
                sqlx::query("DELETE FROM cached_museums")
                    .execute(&mut **tx)
                    .await?;
                for museum in items {
                    sqlx::query(
                        r#"
                        INSERT INTO cached_museums (id, name, address, is_active)
                        VALUES (?1, ?2, ?3, ?4)
                        "#,
                    )
                    .bind(museum.id.as_str())
                    .bind(&museum.name)
                    .bind(&museum.address)
                    .bind(museum.is_active)
                    .execute(&mut **tx)
                    .await?;
                }
            }
            ReferenceSnapshot::TicketTypes(items) => {
                sqlx::query("DELETE FROM cached_ticket_types")
                    .execute(&mut **tx)
                    .await?;
                for ticket_type in items {
                    sqlx::query(
                        r#"
                        INSERT INTO cached_ticket_types (
                            id, name, description, default_price_cents,
                            credits, is_combo, is_active
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        "#,
                    )
                    .bind(ticket_type.id.as_str())
                    .bind(&ticket_type.name)
                    .bind(&ticket_type.description)
                    .bind(ticket_type.default_price.cents())
                    .bind(i64::from(ticket_type.credits))
                    .bind(ticket_type.is_combo)
                    .bind(ticket_type.is_active)
                    .execute(&mut **tx)
                    .await?;
                }
            }
            ReferenceSnapshot::MuseumPrices(items) => {
                sqlx::query("DELETE FROM cached_museum_prices")
                    .execute(&mut **tx)
                    .await?;
                for price in items {
                    sqlx::query(
                        r#"
                        INSERT INTO cached_museum_prices (
                            id, museum_id, ticket_type_id, price_cents, is_active
                        ) VALUES (?1, ?2, ?3, ?4, ?5)
                        "#,
                    )
                    .bind(price.id.as_str())
                    .bind(price.museum_id.as_str())
                    .bind(price.ticket_type_id.as_str())
                    .bind(price.price.cents())
                    .bind(price.is_active)
                    .execute(&mut **tx)
                    .await?;
                }
            }
            ReferenceSnapshot::Sessions(items) => {
                sqlx::query("DELETE FROM cached_sessions")
                    .execute(&mut **tx)
                    .await?;
                for session in items {
                    sqlx::query(
                        r#"
                        INSERT INTO cached_sessions (
                            id, museum_id, session_date, starts_at,
                            ends_at, capacity, is_active
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        "#,
                    )
                    .bind(session.id.as_str())
                    .bind(session.museum_id.as_str())
                    .bind(session.session_date.format("%Y-%m-%d").to_string())
                    .bind(session.starts_at.map(|at| at.timestamp_millis()))
                    .bind(session.ends_at.map(|at| at.timestamp_millis()))
                    .bind(session.capacity.map(i64::from))
                    .bind(session.is_active)
                    .execute(&mut **tx)
                    .await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OfflineStore for SqliteOfflineStore {
    async fn put_pending_ticket(&self, ticket: &PendingTicket) -> Result<(), AppError> {
        self.put_pending_tickets(std::slice::from_ref(ticket)).await
    }

    async fn put_pending_tickets(&self, tickets: &[PendingTicket]) -> Result<(), AppError> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        for ticket in tickets {
            Self::upsert_pending_ticket(&mut tx, ticket).await?;
            Self::upsert_local_ticket(&mut tx, &ticket.to_local_ticket(), now).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            target: "offline::store",
            tickets = tickets.len(),
            "pending tickets stored"
        );
        Ok(())
    }

    async fn list_unsynced_tickets(&self) -> Result<Vec<PendingTicket>, AppError> {
        let rows = sqlx::query_as::<_, PendingTicketRow>(
            r#"
            SELECT * FROM pending_tickets
            WHERE synced = 0
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(pending_ticket_from_row).collect()
    }

    async fn list_unsynced_usage(&self) -> Result<Vec<PendingUsage>, AppError> {
        let rows = sqlx::query_as::<_, PendingUsageRow>(
            r#"
            SELECT * FROM pending_usage
            WHERE synced = 0
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(pending_usage_from_row).collect()
    }

    async fn mark_ticket_synced(&self, id: &TicketId) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE pending_tickets
            SET synced = 1, synced_at = ?1
            WHERE id = ?2 AND synced = 0
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_usage_synced(&self, id: &UsageId) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE pending_usage
            SET synced = 1, synced_at = ?1
            WHERE id = ?2 AND synced = 0
            "#,
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_local_ticket_by_code(
        &self,
        code: &ScanCode,
    ) -> Result<Option<LocalTicket>, AppError> {
        let row = sqlx::query_as::<_, LocalTicketRow>(
            "SELECT * FROM local_tickets WHERE scan_code = ?1",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(local_ticket_from_row).transpose()
    }

    async fn find_local_ticket(&self, id: &TicketId) -> Result<Option<LocalTicket>, AppError> {
        let row = sqlx::query_as::<_, LocalTicketRow>("SELECT * FROM local_tickets WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(local_ticket_from_row).transpose()
    }

    async fn cache_local_ticket(&self, ticket: &LocalTicket) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_local_ticket(&mut tx, ticket, Utc::now().timestamp_millis()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn consume_local_credit(
        &self,
        id: &TicketId,
        new_remaining: u32,
        now_used: bool,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE local_tickets
            SET remaining_credits = ?1, is_used = ?2, updated_at = ?3
            WHERE id = ?4 AND remaining_credits >= ?1
            "#,
        )
        .bind(i64::from(new_remaining))
        .bind(now_used)
        .bind(Utc::now().timestamp_millis())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_local_ticket(id).await? {
                Some(_) => Err(AppError::StateConflict(format!(
                    "remaining credits of {id} cannot increase"
                ))),
                None => Err(AppError::NotFound(format!("local ticket {id}"))),
            };
        }
        Ok(())
    }

    async fn apply_offline_usage(
        &self,
        usage: &PendingUsage,
        consumption: CreditConsumption,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE local_tickets
            SET remaining_credits = ?1, is_used = ?2, updated_at = ?3
            WHERE id = ?4 AND remaining_credits = ?5 AND is_used = 0
            "#,
        )
        .bind(i64::from(consumption.new_remaining))
        .bind(consumption.now_used)
        .bind(Utc::now().timestamp_millis())
        .bind(usage.ticket_id.as_str())
        .bind(i64::from(consumption.expected_remaining))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO pending_usage (
                id, ticket_id, museum_id, credits_used, used_by, used_at, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(usage.id.as_str())
        .bind(usage.ticket_id.as_str())
        .bind(usage.museum_id.as_str())
        .bind(i64::from(usage.credits_used))
        .bind(usage.used_by.as_ref().map(|id| id.as_str()))
        .bind(usage.used_at.timestamp_millis())
        .bind(usage.synced)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn reconcile_local_credits(
        &self,
        id: &TicketId,
        authoritative_remaining: u32,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE local_tickets
            SET remaining_credits = MIN(remaining_credits, ?1),
                is_used = CASE WHEN MIN(remaining_credits, ?1) = 0 THEN 1 ELSE is_used END,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(i64::from(authoritative_remaining))
        .bind(Utc::now().timestamp_millis())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_cached_reference(&self, snapshot: ReferenceSnapshot) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        Self::insert_snapshot(&mut tx, &snapshot).await?;
        tx.commit().await?;

        tracing::debug!(
            target: "offline::store",
            collection = %snapshot.kind(),
            records = snapshot.len(),
            "reference cache replaced"
        );
        Ok(())
    }

    async fn list_cached_museums(&self) -> Result<Vec<CachedMuseum>, AppError> {
        let rows =
            sqlx::query_as::<_, CachedMuseumRow>("SELECT * FROM cached_museums ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(museum_from_row).collect()
    }

    async fn list_cached_ticket_types(&self) -> Result<Vec<CachedTicketType>, AppError> {
        let rows = sqlx::query_as::<_, CachedTicketTypeRow>(
            "SELECT * FROM cached_ticket_types ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ticket_type_from_row).collect()
    }

    async fn find_cached_ticket_type(
        &self,
        id: &TicketTypeId,
    ) -> Result<Option<CachedTicketType>, AppError> {
        let row = sqlx::query_as::<_, CachedTicketTypeRow>(
            "SELECT * FROM cached_ticket_types WHERE id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ticket_type_from_row).transpose()
    }

    async fn find_museum_price(
        &self,
        museum_id: &MuseumId,
        ticket_type_id: &TicketTypeId,
    ) -> Result<Option<CachedMuseumPrice>, AppError> {
        let row = sqlx::query_as::<_, CachedMuseumPriceRow>(
            r#"
            SELECT * FROM cached_museum_prices
            WHERE museum_id = ?1 AND ticket_type_id = ?2 AND is_active = 1
            LIMIT 1
            "#,
        )
        .bind(museum_id.as_str())
        .bind(ticket_type_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(museum_price_from_row).transpose()
    }

    async fn list_cached_sessions(
        &self,
        museum_id: &MuseumId,
    ) -> Result<Vec<CachedSession>, AppError> {
        let rows = sqlx::query_as::<_, CachedSessionRow>(
            r#"
            SELECT * FROM cached_sessions
            WHERE museum_id = ?1
            ORDER BY COALESCE(starts_at, 0) ASC
            "#,
        )
        .bind(museum_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(session_from_row).collect()
    }

    async fn pending_count(&self) -> Result<PendingCount, AppError> {
        let (tickets, usage): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM pending_tickets WHERE synced = 0),
                (SELECT COUNT(*) FROM pending_usage WHERE synced = 0)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PendingCount {
            tickets: u64::try_from(tickets).unwrap_or_default(),
            usage: u64::try_from(usage).unwrap_or_default(),
        })
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, AppError> {
        let value =
            sqlx::query_scalar::<_, String>("SELECT value FROM sync_metadata WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sync_metadata (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_synced(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let cutoff = before.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let tickets = sqlx::query(
            "DELETE FROM pending_tickets WHERE synced = 1 AND synced_at IS NOT NULL AND synced_at < ?1",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        let usage = sqlx::query(
            "DELETE FROM pending_usage WHERE synced = 1 AND synced_at IS NOT NULL AND synced_at < ?1",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(tickets.rows_affected() + usage.rows_affected())
    }
}
