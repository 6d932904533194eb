use crate::domain::value_objects::ticketing::{MuseumId, TicketId, UsageId, UserId};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// 端末で記録されたクレジット消費イベント。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingUsage {
    pub id: UsageId,
    pub ticket_id: TicketId,
    pub museum_id: MuseumId,
    pub credits_used: u32,
    pub used_by: Option<UserId>,
    pub used_at: DateTime<Utc>,
    pub synced: bool,
}

impl PendingUsage {
    pub fn new(
        ticket_id: TicketId,
        museum_id: MuseumId,
        credits_used: u32,
        used_by: Option<UserId>,
        used_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UsageId::generate(),
            ticket_id,
            museum_id,
            credits_used,
            used_by,
            used_at: used_at.trunc_subsecs(3),
            synced: false,
        }
    }
}
