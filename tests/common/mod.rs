#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use museum_gate_lib::domain::entities::ticketing::{
    CachedMuseum, CachedMuseumPrice, CachedSession, CachedTicketType, CartItem, ReferenceSnapshot,
    SaleRequest,
};
use museum_gate_lib::domain::value_objects::ticketing::{
    MuseumId, MuseumPriceId, Price, SessionId, TicketTypeId, UserId,
};
use museum_gate_lib::infrastructure::remote::InMemoryRemoteStore;
use museum_gate_lib::{AppConfig, AppState};
use tempfile::TempDir;

pub const MUSEUM_A: &str = "museum-a";
pub const MUSEUM_B: &str = "museum-b";

/// 一時ディレクトリ上の SQLite とインメモリのリモートで組み立てた端末。
pub struct TestTerminal {
    pub state: AppState,
    pub remote: Arc<InMemoryRemoteStore>,
    pub dir: TempDir,
}

pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", dir.path().join("gate.db").display());
    config.sync.sync_interval = 1;
    config.sync.pending_poll_interval = 1;
    config.sync.probe_interval = 1;
    config.terminal.seller_id = Some("gate-staff".into());
    config
}

pub async fn setup_terminal() -> TestTerminal {
    let dir = tempfile::tempdir().expect("tempdir");
    let remote = Arc::new(InMemoryRemoteStore::new());
    seed_reference(&remote);

    let state = AppState::with_remote(test_config(&dir), remote.clone())
        .await
        .expect("terminal state");

    TestTerminal { state, remote, dir }
}

/// 参照データを取り込んだ状態の端末を用意し、オフラインに戻す。
pub async fn setup_primed_terminal() -> TestTerminal {
    let terminal = setup_terminal().await;
    terminal.state.connectivity.set_online(true);
    terminal
        .state
        .sync_service
        .run_sync_cycle()
        .await
        .expect("initial cache refresh");
    terminal.state.connectivity.set_online(false);
    terminal
}

pub fn seed_reference(remote: &InMemoryRemoteStore) {
    remote.set_reference(ReferenceSnapshot::Museums(vec![
        museum(MUSEUM_A, "Museum of Clocks"),
        museum(MUSEUM_B, "Harbour Gallery"),
    ]));
    remote.set_reference(ReferenceSnapshot::TicketTypes(vec![
        ticket_type("single", 1500, 1, false),
        ticket_type("family", 4000, 4, false),
        ticket_type("city-pass", 5000, 3, true),
    ]));
    remote.set_reference(ReferenceSnapshot::MuseumPrices(vec![CachedMuseumPrice {
        id: MuseumPriceId::parse("price-a-single").unwrap(),
        museum_id: MuseumId::parse(MUSEUM_A).unwrap(),
        ticket_type_id: TicketTypeId::parse("single").unwrap(),
        price: Price::from_cents(1200).unwrap(),
        is_active: true,
    }]));
    remote.set_reference(ReferenceSnapshot::Sessions(vec![CachedSession {
        id: SessionId::parse("morning").unwrap(),
        museum_id: MuseumId::parse(MUSEUM_A).unwrap(),
        session_date: Utc::now().date_naive(),
        starts_at: None,
        ends_at: None,
        capacity: Some(50),
        is_active: true,
    }]));
}

pub fn museum(id: &str, name: &str) -> CachedMuseum {
    CachedMuseum {
        id: MuseumId::parse(id).unwrap(),
        name: name.to_string(),
        address: None,
        is_active: true,
    }
}

fn ticket_type(id: &str, cents: i64, credits: u32, is_combo: bool) -> CachedTicketType {
    CachedTicketType {
        id: TicketTypeId::parse(id).unwrap(),
        name: id.to_string(),
        description: None,
        default_price: Price::from_cents(cents).unwrap(),
        credits,
        is_combo,
        is_active: true,
    }
}

pub fn sale(museum: &str, ticket_type: &str, quantity: u32) -> SaleRequest {
    SaleRequest {
        items: vec![CartItem::new(
            TicketTypeId::parse(ticket_type).unwrap(),
            quantity,
        )],
        museum_id: Some(MuseumId::parse(museum).unwrap()),
        seller_id: UserId::parse("cashier-1").unwrap(),
    }
}
