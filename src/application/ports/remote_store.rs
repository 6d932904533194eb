use crate::domain::entities::ticketing::{
    CachedMuseum, CachedMuseumPrice, CachedSession, CachedTicketType, PendingTicket, PendingUsage,
};
use crate::domain::value_objects::ticketing::TicketId;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// 同じ主キーが既に存在する。同期側では「適用済み」として扱う。
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    #[error("Remote rejected request: {0}")]
    Rejected(String),

    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RemoteError::DuplicateKey(_))
    }
}

/// サーバー側のデータストア（チケット・利用履歴・参照データ）。
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn ping(&self) -> Result<(), RemoteError>;

    async fn insert_ticket(&self, ticket: &PendingTicket) -> Result<(), RemoteError>;
    async fn insert_usage_event(&self, usage: &PendingUsage) -> Result<(), RemoteError>;

    async fn sum_usage_credits(&self, ticket_id: &TicketId) -> Result<u32, RemoteError>;
    async fn ticket_initial_credits(&self, ticket_id: &TicketId) -> Result<u32, RemoteError>;
    async fn update_ticket_remaining_credits(
        &self,
        ticket_id: &TicketId,
        remaining: u32,
        is_used: bool,
        used_at: Option<DateTime<Utc>>,
    ) -> Result<(), RemoteError>;

    async fn fetch_active_museums(&self) -> Result<Vec<CachedMuseum>, RemoteError>;
    async fn fetch_active_ticket_types(&self) -> Result<Vec<CachedTicketType>, RemoteError>;
    async fn fetch_active_museum_prices(&self) -> Result<Vec<CachedMuseumPrice>, RemoteError>;
    async fn fetch_todays_active_sessions(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<CachedSession>, RemoteError>;
}
