use crate::domain::entities::ticketing::validation::RejectReason;
use crate::domain::value_objects::ticketing::{
    MuseumId, Price, ScanCode, SessionId, TicketId, TicketTypeId, UserId,
};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// 端末で販売され、リモートへの反映待ちのチケット。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingTicket {
    pub id: TicketId,
    pub scan_code: ScanCode,
    pub ticket_type_id: TicketTypeId,
    pub museum_id: MuseumId,
    pub session_id: Option<SessionId>,
    pub price: Price,
    pub sold_by: UserId,
    pub initial_credits: u32,
    pub created_at: DateTime<Utc>,
    pub synced: bool,
}

impl PendingTicket {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TicketId,
        scan_code: ScanCode,
        ticket_type_id: TicketTypeId,
        museum_id: MuseumId,
        session_id: Option<SessionId>,
        price: Price,
        sold_by: UserId,
        initial_credits: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            scan_code,
            ticket_type_id,
            museum_id,
            session_id,
            price,
            sold_by,
            initial_credits,
            // ストアはミリ秒精度で保持する
            created_at: created_at.trunc_subsecs(3),
            synced: false,
        }
    }

    /// 検証用の射影。販売直後なのでクレジットは満タン。
    pub fn to_local_ticket(&self) -> LocalTicket {
        LocalTicket {
            id: self.id.clone(),
            scan_code: self.scan_code.clone(),
            ticket_type_id: self.ticket_type_id.clone(),
            museum_id: self.museum_id.clone(),
            remaining_credits: self.initial_credits,
            is_used: self.initial_credits == 0,
            created_at: self.created_at,
        }
    }
}

/// オフライン検証専用の非正規化チケット。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalTicket {
    pub id: TicketId,
    pub scan_code: ScanCode,
    pub ticket_type_id: TicketTypeId,
    pub museum_id: MuseumId,
    pub remaining_credits: u32,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

/// クレジット消費の計算結果。ストアへの書き込みはまだ行われていない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditConsumption {
    pub expected_remaining: u32,
    pub new_remaining: u32,
    pub now_used: bool,
}

impl LocalTicket {
    pub fn is_exhausted(&self) -> bool {
        self.is_used || self.remaining_credits == 0
    }

    /// `credits` 分を消費できるか判定する。残高が負になることはない。
    pub fn plan_consumption(&self, credits: u32) -> Result<CreditConsumption, RejectReason> {
        if self.is_exhausted() {
            return Err(RejectReason::Exhausted);
        }
        if credits > self.remaining_credits {
            return Err(RejectReason::InsufficientCredits);
        }
        let new_remaining = self.remaining_credits - credits;
        Ok(CreditConsumption {
            expected_remaining: self.remaining_credits,
            new_remaining,
            now_used: new_remaining == 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(credits: u32) -> PendingTicket {
        PendingTicket::new(
            TicketId::generate(),
            ScanCode::generate(Utc::now()),
            TicketTypeId::parse("adult").unwrap(),
            MuseumId::parse("m1").unwrap(),
            None,
            Price::from_cents(1500).unwrap(),
            UserId::parse("cashier-1").unwrap(),
            credits,
            Utc::now(),
        )
    }

    #[test]
    fn projection_starts_with_full_credits() {
        let pending = ticket(3);
        let local = pending.to_local_ticket();
        assert_eq!(local.id, pending.id);
        assert_eq!(local.remaining_credits, 3);
        assert!(!local.is_used);
        assert!(!pending.synced);
    }

    #[test]
    fn consumption_never_goes_negative() {
        let local = ticket(2).to_local_ticket();
        assert_eq!(
            local.plan_consumption(3),
            Err(RejectReason::InsufficientCredits)
        );

        let plan = local.plan_consumption(2).unwrap();
        assert_eq!(plan.new_remaining, 0);
        assert!(plan.now_used);
    }

    #[test]
    fn exhausted_ticket_rejects() {
        let mut local = ticket(1).to_local_ticket();
        local.remaining_credits = 0;
        local.is_used = true;
        assert_eq!(local.plan_consumption(1), Err(RejectReason::Exhausted));
    }
}
