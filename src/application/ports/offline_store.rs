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

/// 端末ローカルの永続ストア。各メソッドが1トランザクション。
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// PendingTicket と LocalTicket を同一トランザクションで書き込む。
    async fn put_pending_ticket(&self, ticket: &PendingTicket) -> Result<(), AppError>;
    /// 1回の販売分をまとめて書き込む。途中で失敗したら1枚も残さない。
    async fn put_pending_tickets(&self, tickets: &[PendingTicket]) -> Result<(), AppError>;
    async fn list_unsynced_tickets(&self) -> Result<Vec<PendingTicket>, AppError>;
    async fn list_unsynced_usage(&self) -> Result<Vec<PendingUsage>, AppError>;
    async fn mark_ticket_synced(&self, id: &TicketId) -> Result<(), AppError>;
    async fn mark_usage_synced(&self, id: &UsageId) -> Result<(), AppError>;

    async fn find_local_ticket_by_code(
        &self,
        code: &ScanCode,
    ) -> Result<Option<LocalTicket>, AppError>;
    async fn find_local_ticket(&self, id: &TicketId) -> Result<Option<LocalTicket>, AppError>;
    /// オンライン販売分を検証キャッシュへ入れる。既存のクレジットは増やさない。
    async fn cache_local_ticket(&self, ticket: &LocalTicket) -> Result<(), AppError>;
    async fn consume_local_credit(
        &self,
        id: &TicketId,
        new_remaining: u32,
        now_used: bool,
    ) -> Result<(), AppError>;
    /// クレジットの compare-and-set と PendingUsage の追加を同一トランザクションで行う。
    /// 他の書き込みが先行していた場合は `false`。
    async fn apply_offline_usage(
        &self,
        usage: &PendingUsage,
        consumption: CreditConsumption,
    ) -> Result<bool, AppError>;
    /// 残数を `min(local, authoritative)` に下げる。
    async fn reconcile_local_credits(
        &self,
        id: &TicketId,
        authoritative_remaining: u32,
    ) -> Result<(), AppError>;

    async fn replace_cached_reference(&self, snapshot: ReferenceSnapshot) -> Result<(), AppError>;
    async fn list_cached_museums(&self) -> Result<Vec<CachedMuseum>, AppError>;
    async fn list_cached_ticket_types(&self) -> Result<Vec<CachedTicketType>, AppError>;
    async fn find_cached_ticket_type(
        &self,
        id: &TicketTypeId,
    ) -> Result<Option<CachedTicketType>, AppError>;
    async fn find_museum_price(
        &self,
        museum_id: &MuseumId,
        ticket_type_id: &TicketTypeId,
    ) -> Result<Option<CachedMuseumPrice>, AppError>;
    async fn list_cached_sessions(
        &self,
        museum_id: &MuseumId,
    ) -> Result<Vec<CachedSession>, AppError>;

    async fn pending_count(&self) -> Result<PendingCount, AppError>;

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// 同期済みで `before` より古いレコードを削除し、削除件数を返す。
    async fn purge_synced(&self, before: DateTime<Utc>) -> Result<u64, AppError>;
}
