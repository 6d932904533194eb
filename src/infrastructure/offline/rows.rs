use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingTicketRow {
    pub id: String,
    pub scan_code: String,
    pub ticket_type_id: String,
    pub museum_id: String,
    pub session_id: Option<String>,
    pub price_cents: i64,
    pub sold_by: String,
    pub initial_credits: i64,
    pub created_at: i64,
    pub synced: bool,
    pub synced_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LocalTicketRow {
    pub id: String,
    pub scan_code: String,
    pub ticket_type_id: String,
    pub museum_id: String,
    pub remaining_credits: i64,
    pub is_used: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingUsageRow {
    pub id: String,
    pub ticket_id: String,
    pub museum_id: String,
    pub credits_used: i64,
    pub used_by: Option<String>,
    pub used_at: i64,
    pub synced: bool,
    pub synced_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CachedMuseumRow {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CachedTicketTypeRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub default_price_cents: i64,
    pub credits: i64,
    pub is_combo: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CachedMuseumPriceRow {
    pub id: String,
    pub museum_id: String,
    pub ticket_type_id: String,
    pub price_cents: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CachedSessionRow {
    pub id: String,
    pub museum_id: String,
    pub session_date: String,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub capacity: Option<i64>,
    pub is_active: bool,
}
