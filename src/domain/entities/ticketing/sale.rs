use crate::domain::entities::ticketing::ticket::PendingTicket;
use crate::domain::value_objects::ticketing::{
    MuseumId, Price, ScanCode, SessionId, TicketId, TicketTypeId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItem {
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
    pub session_id: Option<SessionId>,
}

impl CartItem {
    pub fn new(ticket_type_id: TicketTypeId, quantity: u32) -> Self {
        Self {
            ticket_type_id,
            quantity,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleRequest {
    pub items: Vec<CartItem>,
    /// 未選択の場合は None（バリデーションエラーになる）
    pub museum_id: Option<MuseumId>,
    pub seller_id: UserId,
}

/// 画面へ返す発券結果。`offline` が true の間はリモート未反映。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedTicket {
    pub id: TicketId,
    pub scan_code: ScanCode,
    pub ticket_type_id: TicketTypeId,
    pub museum_id: MuseumId,
    pub session_id: Option<SessionId>,
    pub price: Price,
    pub remaining_credits: u32,
    pub created_at: DateTime<Utc>,
    pub offline: bool,
}

impl GeneratedTicket {
    pub fn from_pending(ticket: &PendingTicket, offline: bool) -> Self {
        Self {
            id: ticket.id.clone(),
            scan_code: ticket.scan_code.clone(),
            ticket_type_id: ticket.ticket_type_id.clone(),
            museum_id: ticket.museum_id.clone(),
            session_id: ticket.session_id.clone(),
            price: ticket.price,
            remaining_credits: ticket.initial_credits,
            created_at: ticket.created_at,
            offline,
        }
    }
}
