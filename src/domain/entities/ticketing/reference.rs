use crate::domain::value_objects::ticketing::{
    MuseumId, MuseumPriceId, Price, SessionId, TicketTypeId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedMuseum {
    pub id: MuseumId,
    pub name: String,
    pub address: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedTicketType {
    pub id: TicketTypeId,
    pub name: String,
    pub description: Option<String>,
    pub default_price: Price,
    /// 販売時に付与するクレジット数
    pub credits: u32,
    /// 複数館共通券なら true（館の一致チェックを行わない）
    pub is_combo: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedMuseumPrice {
    pub id: MuseumPriceId,
    pub museum_id: MuseumId,
    pub ticket_type_id: TicketTypeId,
    pub price: Price,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedSession {
    pub id: SessionId,
    pub museum_id: MuseumId,
    pub session_date: NaiveDate,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub capacity: Option<u32>,
    pub is_active: bool,
}

/// キャッシュ対象のコレクション。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Museums,
    TicketTypes,
    MuseumPrices,
    Sessions,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 4] = [
        ReferenceKind::Museums,
        ReferenceKind::TicketTypes,
        ReferenceKind::MuseumPrices,
        ReferenceKind::Sessions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Museums => "museums",
            ReferenceKind::TicketTypes => "ticket_types",
            ReferenceKind::MuseumPrices => "museum_prices",
            ReferenceKind::Sessions => "sessions",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// リモートから取得した1コレクション分のスナップショット。丸ごと置き換える。
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceSnapshot {
    Museums(Vec<CachedMuseum>),
    TicketTypes(Vec<CachedTicketType>),
    MuseumPrices(Vec<CachedMuseumPrice>),
    Sessions(Vec<CachedSession>),
}

impl ReferenceSnapshot {
    pub fn kind(&self) -> ReferenceKind {
        match self {
            ReferenceSnapshot::Museums(_) => ReferenceKind::Museums,
            ReferenceSnapshot::TicketTypes(_) => ReferenceKind::TicketTypes,
            ReferenceSnapshot::MuseumPrices(_) => ReferenceKind::MuseumPrices,
            ReferenceSnapshot::Sessions(_) => ReferenceKind::Sessions,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ReferenceSnapshot::Museums(items) => items.len(),
            ReferenceSnapshot::TicketTypes(items) => items.len(),
            ReferenceSnapshot::MuseumPrices(items) => items.len(),
            ReferenceSnapshot::Sessions(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
