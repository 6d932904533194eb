use crate::domain::value_objects::ticketing::TicketId;
use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotFound,
    WrongMuseum,
    Exhausted,
    InsufficientCredits,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotFound => "not found",
            RejectReason::WrongMuseum => "wrong museum",
            RejectReason::Exhausted => "exhausted",
            RejectReason::InsufficientCredits => "insufficient credits",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 入場判定の結果。オフライン判定では `offline` が常に true。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub admitted: bool,
    pub reason: Option<RejectReason>,
    pub ticket_id: Option<TicketId>,
    pub remaining_credits: Option<u32>,
    pub credits_consumed: u32,
    pub offline: bool,
}

impl ValidationOutcome {
    pub fn admitted(ticket_id: TicketId, remaining_credits: u32, credits_consumed: u32) -> Self {
        Self {
            admitted: true,
            reason: None,
            ticket_id: Some(ticket_id),
            remaining_credits: Some(remaining_credits),
            credits_consumed,
            offline: true,
        }
    }

    pub fn rejected(
        reason: RejectReason,
        ticket_id: Option<TicketId>,
        remaining_credits: Option<u32>,
    ) -> Self {
        Self {
            admitted: false,
            reason: Some(reason),
            ticket_id,
            remaining_credits,
            credits_consumed: 0,
            offline: true,
        }
    }

    /// 拒否をエラー分類（NotFound / StateConflict）に写す。
    pub fn into_result(self) -> Result<Self, AppError> {
        match self.reason {
            None => Ok(self),
            Some(RejectReason::NotFound) => Err(AppError::NotFound(
                "scan code is not cached on this terminal".to_string(),
            )),
            Some(reason) => Err(AppError::StateConflict(reason.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_error_taxonomy() {
        let not_found = ValidationOutcome::rejected(RejectReason::NotFound, None, None);
        assert!(matches!(not_found.into_result(), Err(AppError::NotFound(_))));

        let exhausted = ValidationOutcome::rejected(RejectReason::Exhausted, None, Some(0));
        match exhausted.into_result() {
            Err(AppError::StateConflict(msg)) => assert_eq!(msg, "exhausted"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn admitted_outcome_is_ok() {
        let outcome = ValidationOutcome::admitted(TicketId::generate(), 2, 1);
        assert!(outcome.offline);
        assert!(outcome.clone().into_result().is_ok());
    }
}
