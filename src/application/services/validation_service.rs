use crate::application::ports::offline_store::OfflineStore;
use crate::domain::entities::ticketing::{
    LocalTicket, PendingUsage, RejectReason, ValidationOutcome,
};
use crate::domain::value_objects::ticketing::{MuseumId, ScanCode, UserId};
use crate::shared::error::AppError;
use chrono::Utc;
use std::sync::Arc;

/// 同一チケットへの同時書き込みと競合した場合の再試行回数
const MAX_CONSUME_ATTEMPTS: usize = 3;

/// ローカルキャッシュだけで入場可否を判定する。
pub struct ValidationService {
    store: Arc<dyn OfflineStore>,
    operator: Option<UserId>,
}

impl ValidationService {
    pub fn new(store: Arc<dyn OfflineStore>, operator: Option<UserId>) -> Self {
        Self { store, operator }
    }

    pub async fn validate_offline(
        &self,
        code: &ScanCode,
        museum_id: &MuseumId,
    ) -> Result<ValidationOutcome, AppError> {
        self.validate_offline_with_credits(code, museum_id, 1).await
    }

    /// `credits` 分を消費して入場させる。残数が足りなければ何も消費せずに拒否する。
    pub async fn validate_offline_with_credits(
        &self,
        code: &ScanCode,
        museum_id: &MuseumId,
        credits: u32,
    ) -> Result<ValidationOutcome, AppError> {
        if credits == 0 {
            return Err(AppError::ValidationError(
                "At least one credit must be consumed".to_string(),
            ));
        }

        for attempt in 1..=MAX_CONSUME_ATTEMPTS {
            // キャッシュに無いものはサーバーに問い合わせずに not found とする
            let Some(ticket) = self.store.find_local_ticket_by_code(code).await? else {
                tracing::info!(
                    target: "offline::validation",
                    scan_code = %code,
                    "rejected: not found"
                );
                return Ok(ValidationOutcome::rejected(RejectReason::NotFound, None, None));
            };

            let is_combo = self
                .store
                .find_cached_ticket_type(&ticket.ticket_type_id)
                .await?
                .map(|ticket_type| ticket_type.is_combo)
                .unwrap_or(false);

            if !is_combo && &ticket.museum_id != museum_id {
                return Ok(self.reject(RejectReason::WrongMuseum, &ticket));
            }

            let consumption = match ticket.plan_consumption(credits) {
                Ok(consumption) => consumption,
                Err(reason) => return Ok(self.reject(reason, &ticket)),
            };

            let usage = PendingUsage::new(
                ticket.id.clone(),
                museum_id.clone(),
                credits,
                self.operator.clone(),
                Utc::now(),
            );
            if self.store.apply_offline_usage(&usage, consumption).await? {
                tracing::info!(
                    target: "offline::validation",
                    ticket_id = %ticket.id,
                    museum_id = %museum_id,
                    credits,
                    remaining = consumption.new_remaining,
                    "admitted offline"
                );
                return Ok(ValidationOutcome::admitted(
                    ticket.id,
                    consumption.new_remaining,
                    credits,
                ));
            }

            tracing::debug!(
                target: "offline::validation",
                ticket_id = %ticket.id,
                attempt,
                "ticket changed concurrently, retrying"
            );
        }

        Err(AppError::StateConflict(format!(
            "Ticket {code} is being validated concurrently"
        )))
    }

    fn reject(&self, reason: RejectReason, ticket: &LocalTicket) -> ValidationOutcome {
        tracing::info!(
            target: "offline::validation",
            ticket_id = %ticket.id,
            reason = reason.as_str(),
            "rejected"
        );
        ValidationOutcome::rejected(
            reason,
            Some(ticket.id.clone()),
            Some(ticket.remaining_credits),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ticketing::{CachedTicketType, PendingTicket, ReferenceSnapshot};
    use crate::domain::value_objects::ticketing::{Price, TicketId, TicketTypeId};
    use crate::infrastructure::offline::SqliteOfflineStore;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> Arc<SqliteOfflineStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let store = Arc::new(SqliteOfflineStore::new(pool));

        let ticket_type = |id: &str, credits: u32, is_combo: bool| CachedTicketType {
            id: TicketTypeId::parse(id).unwrap(),
            name: id.to_string(),
            description: None,
            default_price: Price::from_cents(1000).unwrap(),
            credits,
            is_combo,
            is_active: true,
        };
        store
            .replace_cached_reference(ReferenceSnapshot::TicketTypes(vec![
                ticket_type("single", 1, false),
                ticket_type("group", 5, false),
                ticket_type("combo", 3, true),
            ]))
            .await
            .unwrap();
        store
    }

    async fn sold(store: &SqliteOfflineStore, ticket_type: &str, credits: u32) -> PendingTicket {
        let ticket = PendingTicket::new(
            TicketId::generate(),
            ScanCode::generate(Utc::now()),
            TicketTypeId::parse(ticket_type).unwrap(),
            MuseumId::parse("m1").unwrap(),
            None,
            Price::from_cents(1000).unwrap(),
            UserId::parse("cashier").unwrap(),
            credits,
            Utc::now(),
        );
        store.put_pending_ticket(&ticket).await.unwrap();
        ticket
    }

    #[tokio::test]
    async fn single_credit_ticket_admits_then_rejects() {
        let store = setup_store().await;
        let ticket = sold(&store, "single", 1).await;
        let service = ValidationService::new(store.clone(), None);
        let m1 = MuseumId::parse("m1").unwrap();

        let first = service.validate_offline(&ticket.scan_code, &m1).await.unwrap();
        assert!(first.admitted);
        assert!(first.offline);
        assert_eq!(first.remaining_credits, Some(0));

        let second = service.validate_offline(&ticket.scan_code, &m1).await.unwrap();
        assert!(!second.admitted);
        assert_eq!(second.reason, Some(RejectReason::Exhausted));

        let local = store.find_local_ticket(&ticket.id).await.unwrap().unwrap();
        assert!(local.is_used);
        assert_eq!(store.pending_count().await.unwrap().usage, 1);
    }

    #[tokio::test]
    async fn wrong_museum_consumes_nothing() {
        let store = setup_store().await;
        let ticket = sold(&store, "single", 1).await;
        let service = ValidationService::new(store.clone(), None);

        let outcome = service
            .validate_offline(&ticket.scan_code, &MuseumId::parse("m2").unwrap())
            .await
            .unwrap();

        assert_eq!(outcome.reason, Some(RejectReason::WrongMuseum));
        assert_eq!(outcome.remaining_credits, Some(1));
        let local = store.find_local_ticket(&ticket.id).await.unwrap().unwrap();
        assert_eq!(local.remaining_credits, 1);
        assert_eq!(store.pending_count().await.unwrap().usage, 0);
    }

    #[tokio::test]
    async fn combo_ticket_skips_museum_check() {
        let store = setup_store().await;
        let ticket = sold(&store, "combo", 3).await;
        let service = ValidationService::new(store.clone(), None);

        let outcome = service
            .validate_offline(&ticket.scan_code, &MuseumId::parse("m2").unwrap())
            .await
            .unwrap();
        assert!(outcome.admitted);
        assert_eq!(outcome.remaining_credits, Some(2));
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let store = setup_store().await;
        let service = ValidationService::new(store, None);

        let outcome = service
            .validate_offline(
                &ScanCode::parse("MG-UNKNOWN-2345").unwrap(),
                &MuseumId::parse("m1").unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.reason, Some(RejectReason::NotFound));
        assert!(matches!(outcome.into_result(), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn group_scan_consumes_requested_credits() {
        let store = setup_store().await;
        let ticket = sold(&store, "group", 5).await;
        let service = ValidationService::new(store.clone(), Some(UserId::parse("gate-1").unwrap()));
        let m1 = MuseumId::parse("m1").unwrap();

        let outcome = service
            .validate_offline_with_credits(&ticket.scan_code, &m1, 3)
            .await
            .unwrap();
        assert!(outcome.admitted);
        assert_eq!(outcome.credits_consumed, 3);
        assert_eq!(outcome.remaining_credits, Some(2));

        let too_many = service
            .validate_offline_with_credits(&ticket.scan_code, &m1, 3)
            .await
            .unwrap();
        assert_eq!(too_many.reason, Some(RejectReason::InsufficientCredits));
        assert_eq!(too_many.remaining_credits, Some(2));

        let usage = store.list_unsynced_usage().await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].credits_used, 3);
        assert_eq!(usage[0].used_by.as_ref().unwrap().as_str(), "gate-1");
    }

    #[tokio::test]
    async fn zero_credit_request_is_validation_error() {
        let store = setup_store().await;
        let ticket = sold(&store, "single", 1).await;
        let service = ValidationService::new(store, None);

        let err = service
            .validate_offline_with_credits(&ticket.scan_code, &MuseumId::parse("m1").unwrap(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
