use crate::application::ports::offline_store::OfflineStore;
use crate::application::ports::remote_store::RemoteStore;
use crate::application::services::connectivity_monitor::ConnectivityMonitor;
use crate::domain::entities::ticketing::{CartItem, GeneratedTicket, PendingTicket, SaleRequest};
use crate::domain::value_objects::ticketing::{MuseumId, Price, ScanCode, TicketId};
use crate::shared::error::AppError;
use chrono::Utc;
use std::sync::Arc;

/// 販売。オフライン時はローカルストアだけで完結させる。
pub struct SaleService {
    store: Arc<dyn OfflineStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<ConnectivityMonitor>,
    offline_first: bool,
}

impl SaleService {
    pub fn new(
        store: Arc<dyn OfflineStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
        offline_first: bool,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            offline_first,
        }
    }

    /// ローカルの参照キャッシュだけを使って発券し、未同期キューへ積む。
    pub async fn sell_offline(
        &self,
        request: &SaleRequest,
    ) -> Result<Vec<GeneratedTicket>, AppError> {
        let tickets = self.prepare_tickets(request).await?;
        // カート全体を1トランザクションで書く。失敗したら1枚も発券しない
        self.store.put_pending_tickets(&tickets).await?;
        let generated: Vec<_> = tickets
            .iter()
            .map(|ticket| GeneratedTicket::from_pending(ticket, true))
            .collect();

        tracing::info!(
            target: "offline::sale",
            museum_id = request.museum_id.as_ref().map(|id| id.as_str()).unwrap_or_default(),
            tickets = generated.len(),
            "sold offline"
        );
        Ok(generated)
    }

    /// 接続状態に応じて経路を選ぶ。オンライン時にリモートが失敗したチケットはキューへ回す。
    pub async fn sell(&self, request: &SaleRequest) -> Result<Vec<GeneratedTicket>, AppError> {
        if self.offline_first || !self.connectivity.is_online() {
            return self.sell_offline(request).await;
        }

        let tickets = self.prepare_tickets(request).await?;
        let mut generated = Vec::with_capacity(tickets.len());
        let mut fallback = Vec::new();

        for ticket in &tickets {
            match self.remote.insert_ticket(ticket).await {
                Ok(()) => {
                    self.mirror_sold_ticket(ticket).await;
                    generated.push(GeneratedTicket::from_pending(ticket, false));
                }
                Err(err) if err.is_duplicate() => {
                    self.mirror_sold_ticket(ticket).await;
                    generated.push(GeneratedTicket::from_pending(ticket, false));
                }
                Err(err) => {
                    tracing::warn!(
                        target: "offline::sale",
                        ticket_id = %ticket.id,
                        error = %err,
                        "online sale failed, queued for sync"
                    );
                    fallback.push(ticket.clone());
                    generated.push(GeneratedTicket::from_pending(ticket, true));
                }
            }
        }

        if !fallback.is_empty() {
            self.store.put_pending_tickets(&fallback).await?;
        }

        let queued = generated.iter().filter(|ticket| ticket.offline).count();
        tracing::info!(
            target: "offline::sale",
            tickets = generated.len(),
            queued,
            "sold online"
        );
        Ok(generated)
    }

    /// リモートで確定済みのチケットを検証用キャッシュへ写す。
    /// 販売自体は成立しているので、失敗しても呼び出し元へは返さない。
    async fn mirror_sold_ticket(&self, ticket: &PendingTicket) {
        if let Err(err) = self
            .store
            .cache_local_ticket(&ticket.to_local_ticket())
            .await
        {
            tracing::warn!(
                target: "offline::sale",
                ticket_id = %ticket.id,
                error = %err,
                "sold online but not cached for offline validation"
            );
        }
    }

    async fn prepare_tickets(&self, request: &SaleRequest) -> Result<Vec<PendingTicket>, AppError> {
        let museum_id = request
            .museum_id
            .as_ref()
            .ok_or_else(|| AppError::ValidationError("No museum selected".to_string()))?;
        if request.items.is_empty() {
            return Err(AppError::ValidationError("Cart is empty".to_string()));
        }

        let mut tickets = Vec::new();
        for item in &request.items {
            let (price, credits) = self.resolve_item(museum_id, item).await?;
            for _ in 0..item.quantity {
                let now = Utc::now();
                tickets.push(PendingTicket::new(
                    TicketId::generate(),
                    ScanCode::generate(now),
                    item.ticket_type_id.clone(),
                    museum_id.clone(),
                    item.session_id.clone(),
                    price,
                    request.seller_id.clone(),
                    credits,
                    now,
                ));
            }
        }
        Ok(tickets)
    }

    async fn resolve_item(
        &self,
        museum_id: &MuseumId,
        item: &CartItem,
    ) -> Result<(Price, u32), AppError> {
        if item.quantity == 0 {
            return Err(AppError::ValidationError(format!(
                "Quantity for {} must be at least 1",
                item.ticket_type_id
            )));
        }

        let ticket_type = self
            .store
            .find_cached_ticket_type(&item.ticket_type_id)
            .await?
            .filter(|ticket_type| ticket_type.is_active)
            .ok_or_else(|| {
                AppError::ValidationError(format!("Unknown ticket type: {}", item.ticket_type_id))
            })?;

        if let Some(session_id) = &item.session_id {
            let sessions = self.store.list_cached_sessions(museum_id).await?;
            if !sessions.iter().any(|session| &session.id == session_id) {
                return Err(AppError::ValidationError(format!(
                    "Session {session_id} is not available for museum {museum_id}"
                )));
            }
        }

        // 館別価格があればそちらを優先する
        let price = match self
            .store
            .find_museum_price(museum_id, &item.ticket_type_id)
            .await?
        {
            Some(museum_price) => museum_price.price,
            None => ticket_type.default_price,
        };

        Ok((price, ticket_type.credits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ticketing::{
        CachedMuseumPrice, CachedSession, CachedTicketType, ReferenceSnapshot,
    };
    use crate::domain::value_objects::ticketing::{
        MuseumPriceId, SessionId, TicketTypeId, UserId,
    };
    use crate::infrastructure::offline::SqliteOfflineStore;
    use crate::infrastructure::remote::InMemoryRemoteStore;
    use sqlx::sqlite::SqlitePoolOptions;

    struct Fixture {
        store: Arc<SqliteOfflineStore>,
        remote: Arc<InMemoryRemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
    }

    impl Fixture {
        fn service(&self, offline_first: bool) -> SaleService {
            SaleService::new(
                self.store.clone(),
                self.remote.clone(),
                self.connectivity.clone(),
                offline_first,
            )
        }
    }

    async fn setup(online: bool) -> Fixture {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let store = Arc::new(SqliteOfflineStore::new(pool));

        store
            .replace_cached_reference(ReferenceSnapshot::TicketTypes(vec![
                CachedTicketType {
                    id: TicketTypeId::parse("adult").unwrap(),
                    name: "Adult".into(),
                    description: None,
                    default_price: Price::from_cents(1500).unwrap(),
                    credits: 1,
                    is_combo: false,
                    is_active: true,
                },
                CachedTicketType {
                    id: TicketTypeId::parse("family").unwrap(),
                    name: "Family".into(),
                    description: None,
                    default_price: Price::from_cents(4000).unwrap(),
                    credits: 4,
                    is_combo: false,
                    is_active: true,
                },
            ]))
            .await
            .unwrap();
        store
            .replace_cached_reference(ReferenceSnapshot::MuseumPrices(vec![CachedMuseumPrice {
                id: MuseumPriceId::parse("p1").unwrap(),
                museum_id: MuseumId::parse("m1").unwrap(),
                ticket_type_id: TicketTypeId::parse("adult").unwrap(),
                price: Price::from_cents(1200).unwrap(),
                is_active: true,
            }]))
            .await
            .unwrap();
        store
            .replace_cached_reference(ReferenceSnapshot::Sessions(vec![CachedSession {
                id: SessionId::parse("morning").unwrap(),
                museum_id: MuseumId::parse("m1").unwrap(),
                session_date: Utc::now().date_naive(),
                starts_at: None,
                ends_at: None,
                capacity: Some(30),
                is_active: true,
            }]))
            .await
            .unwrap();

        let connectivity = Arc::new(ConnectivityMonitor::new(store.clone(), online));
        Fixture {
            store,
            remote: Arc::new(InMemoryRemoteStore::new()),
            connectivity,
        }
    }

    fn request(museum: Option<&str>, items: Vec<CartItem>) -> SaleRequest {
        SaleRequest {
            items,
            museum_id: museum.map(|id| MuseumId::parse(id).unwrap()),
            seller_id: UserId::parse("cashier-1").unwrap(),
        }
    }

    fn item(ticket_type: &str, quantity: u32) -> CartItem {
        CartItem::new(TicketTypeId::parse(ticket_type).unwrap(), quantity)
    }

    async fn abort_inserts(store: &SqliteOfflineStore, table: &str, after_rows: i64) {
        let sql = format!(
            "CREATE TRIGGER abort_{table} BEFORE INSERT ON {table} \
             WHEN (SELECT COUNT(*) FROM {table}) >= {after_rows} \
             BEGIN SELECT RAISE(ABORT, 'database or disk is full'); END"
        );
        sqlx::query(&sql).execute(store.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn storage_failure_mid_cart_queues_nothing() {
        let fixture = setup(false).await;
        abort_inserts(&fixture.store, "pending_tickets", 1).await;
        let service = fixture.service(true);

        let err = service
            .sell_offline(&request(Some("m1"), vec![item("adult", 3)]))
            .await
            .unwrap_err();
        assert!(err.is_storage());

        let pending = fixture.store.pending_count().await.unwrap();
        assert_eq!(pending.tickets, 0);
        assert!(fixture.store.list_unsynced_tickets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn online_sale_survives_local_cache_failure() {
        let fixture = setup(true).await;
        abort_inserts(&fixture.store, "local_tickets", 0).await;
        let service = fixture.service(false);

        let tickets = service
            .sell(&request(Some("m1"), vec![item("adult", 2)]))
            .await
            .unwrap();

        assert_eq!(tickets.len(), 2);
        assert!(tickets.iter().all(|ticket| !ticket.offline));
        assert_eq!(fixture.remote.ticket_count(), 2);
        assert_eq!(fixture.store.pending_count().await.unwrap().tickets, 0);
    }

    #[tokio::test]
    async fn missing_museum_or_empty_cart_is_validation_error() {
        let fixture = setup(false).await;
        let service = fixture.service(true);

        let err = service
            .sell_offline(&request(None, vec![item("adult", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = service
            .sell_offline(&request(Some("m1"), vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = service
            .sell_offline(&request(Some("m1"), vec![item("adult", 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(fixture.store.pending_count().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn museum_price_overrides_default_price() {
        let fixture = setup(false).await;
        let service = fixture.service(true);

        let at_m1 = service
            .sell_offline(&request(Some("m1"), vec![item("adult", 1)]))
            .await
            .unwrap();
        assert_eq!(at_m1[0].price.cents(), 1200);

        let at_m2 = service
            .sell_offline(&request(Some("m2"), vec![item("adult", 1)]))
            .await
            .unwrap();
        assert_eq!(at_m2[0].price.cents(), 1500);
    }

    #[tokio::test]
    async fn each_unit_becomes_a_pending_ticket_with_type_credits() {
        let fixture = setup(false).await;
        let service = fixture.service(true);

        let tickets = service
            .sell_offline(&request(
                Some("m1"),
                vec![item("adult", 2), item("family", 1)],
            ))
            .await
            .unwrap();

        assert_eq!(tickets.len(), 3);
        assert!(tickets.iter().all(|ticket| ticket.offline));
        assert_eq!(tickets[2].remaining_credits, 4);
        assert_eq!(fixture.store.pending_count().await.unwrap().tickets, 3);

        let local = fixture
            .store
            .find_local_ticket_by_code(&tickets[2].scan_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(local.remaining_credits, 4);
        assert_eq!(fixture.remote.ticket_count(), 0);
    }

    #[tokio::test]
    async fn unknown_type_or_session_is_rejected() {
        let fixture = setup(false).await;
        let service = fixture.service(true);

        let err = service
            .sell_offline(&request(Some("m1"), vec![item("student", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let evening = item("adult", 1).with_session(SessionId::parse("evening").unwrap());
        let err = service
            .sell_offline(&request(Some("m1"), vec![evening]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let morning = item("adult", 1).with_session(SessionId::parse("morning").unwrap());
        let sold = service
            .sell_offline(&request(Some("m1"), vec![morning]))
            .await
            .unwrap();
        assert_eq!(sold[0].session_id.as_ref().unwrap().as_str(), "morning");
    }

    #[tokio::test]
    async fn online_sale_goes_straight_to_remote() {
        let fixture = setup(true).await;
        let service = fixture.service(false);

        let tickets = service
            .sell(&request(Some("m1"), vec![item("adult", 2)]))
            .await
            .unwrap();

        assert!(tickets.iter().all(|ticket| !ticket.offline));
        assert_eq!(fixture.remote.ticket_count(), 2);
        assert_eq!(fixture.store.pending_count().await.unwrap().total(), 0);
        assert!(fixture
            .store
            .find_local_ticket(&tickets[0].id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn online_sale_falls_back_to_queue_when_remote_fails() {
        let fixture = setup(true).await;
        fixture.remote.set_available(false);
        let service = fixture.service(false);

        let tickets = service
            .sell(&request(Some("m1"), vec![item("adult", 1)]))
            .await
            .unwrap();

        assert!(tickets[0].offline);
        assert_eq!(fixture.store.pending_count().await.unwrap().tickets, 1);
    }

    #[tokio::test]
    async fn offline_first_mode_never_calls_remote() {
        let fixture = setup(true).await;
        let service = fixture.service(true);

        service
            .sell(&request(Some("m1"), vec![item("adult", 1)]))
            .await
            .unwrap();

        assert_eq!(fixture.remote.insert_attempts(), 0);
        assert_eq!(fixture.store.pending_count().await.unwrap().tickets, 1);
    }
}
