mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{museum, sale, setup_primed_terminal, setup_terminal, MUSEUM_A};
use museum_gate_lib::domain::entities::ticketing::{ReferenceSnapshot, SyncSkipReason};
use museum_gate_lib::domain::value_objects::ticketing::MuseumId;
use museum_gate_lib::infrastructure::database::ConnectionPool;
use museum_gate_lib::infrastructure::offline::SqliteOfflineStore;
use museum_gate_lib::OfflineStore;

#[tokio::test]
async fn already_applied_ticket_counts_as_success() {
    let terminal = setup_primed_terminal().await;
    let state = &terminal.state;

    let tickets = state
        .sale_service
        .sell(&sale(MUSEUM_A, "single", 2))
        .await
        .unwrap();
    state
        .validation_service
        .validate_offline(&tickets[0].scan_code, &MuseumId::parse(MUSEUM_A).unwrap())
        .await
        .unwrap();
    let pending = state.store.list_unsynced_tickets().await.unwrap();
    assert_eq!(pending.len(), 2);
    // 前回のサイクルでリモートには届いたが、同期済みの記録前に落ちた想定
    terminal.remote.seed_ticket(&pending[1]);

    state.connectivity.set_online(true);
    let report = state.sync_service.run_sync_cycle().await.unwrap();

    assert_eq!(report.tickets.success, 2);
    assert_eq!(report.tickets.failed, 0);
    assert_eq!(report.usage.success, 1);
    assert_eq!(report.usage.failed, 0);
    assert_eq!(terminal.remote.ticket_count(), 2);
    assert_eq!(state.store.pending_count().await.unwrap().total(), 0);
    assert!(state.sync_service.last_sync_at().await.unwrap().is_some());
}

#[tokio::test]
async fn offline_cycle_is_skipped_and_leaves_records_pending() {
    let terminal = setup_primed_terminal().await;
    let state = &terminal.state;

    state
        .sale_service
        .sell(&sale(MUSEUM_A, "single", 1))
        .await
        .unwrap();
    let attempts_before = terminal.remote.insert_attempts();

    let report = state.sync_service.run_sync_cycle().await.unwrap();
    assert_eq!(report.skipped, Some(SyncSkipReason::Offline));
    assert_eq!(report.total_success(), 0);
    assert_eq!(terminal.remote.insert_attempts(), attempts_before);
    assert_eq!(state.store.pending_count().await.unwrap().tickets, 1);
}

#[tokio::test]
async fn repeated_sync_does_not_duplicate_remote_records() {
    let terminal = setup_primed_terminal().await;
    let state = &terminal.state;

    let ticket = state
        .sale_service
        .sell(&sale(MUSEUM_A, "family", 1))
        .await
        .unwrap()
        .remove(0);
    state
        .validation_service
        .validate_offline(&ticket.scan_code, &MuseumId::parse(MUSEUM_A).unwrap())
        .await
        .unwrap();
    let pending_ticket = state.store.list_unsynced_tickets().await.unwrap().remove(0);
    let pending_usage = state.store.list_unsynced_usage().await.unwrap().remove(0);

    state.connectivity.set_online(true);
    let first = state.sync_service.run_sync_cycle().await.unwrap();
    assert_eq!(first.tickets.success, 1);
    assert_eq!(first.usage.success, 1);

    // 同期済みの記録が失われても、再送は重複として吸収される
    state.store.put_pending_ticket(&pending_ticket).await.unwrap();
    let second = state.sync_service.run_sync_cycle().await.unwrap();
    assert_eq!(second.tickets.success, 1);
    assert_eq!(second.usage.success, 0);

    assert_eq!(terminal.remote.ticket_count(), 1);
    assert_eq!(terminal.remote.usage_count(), 1);
    assert_eq!(
        terminal.remote.ticket(&ticket.id).unwrap().remaining_credits,
        3
    );
    let local = state.store.find_local_ticket(&ticket.id).await.unwrap().unwrap();
    assert_eq!(local.remaining_credits, 3);
    assert_eq!(pending_usage.credits_used, 1);
}

#[tokio::test]
async fn reconnect_drains_pending_records_in_background() {
    let terminal = setup_primed_terminal().await;
    let state = &terminal.state;

    state
        .sale_service
        .sell(&sale(MUSEUM_A, "single", 3))
        .await
        .unwrap();
    terminal.remote.set_available(false);
    assert_eq!(state.connectivity.refresh_pending_count().await.unwrap(), 3);

    let tasks = state.start_background();
    let mut rx = state.connectivity.subscribe();
    terminal.remote.set_available(true);

    tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|current| current.is_online && current.pending_count == 0),
    )
    .await
    .expect("pending records drained after reconnect")
    .unwrap();

    tasks.stop().await;
    assert_eq!(terminal.remote.ticket_count(), 3);
    assert!(state.sync_service.metrics().cycles_completed >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_partial_museum_swap() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("swap.db").display());
    let pool = ConnectionPool::with_options(&url, 4, Duration::from_secs(30))
        .await
        .unwrap();
    pool.migrate().await.unwrap();
    let store = Arc::new(SqliteOfflineStore::new(pool.get_pool().clone()));

    let five: Vec<_> = (1..=5)
        .map(|n| museum(&format!("m{n}"), &format!("Museum {n}")))
        .collect();
    let three: Vec<_> = (6..=8)
        .map(|n| museum(&format!("m{n}"), &format!("Museum {n}")))
        .collect();
    store
        .replace_cached_reference(ReferenceSnapshot::Museums(five.clone()))
        .await
        .unwrap();

    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for round in 0..40 {
                let next = if round % 2 == 0 { &three } else { &five };
                store
                    .replace_cached_reference(ReferenceSnapshot::Museums(next.clone()))
                    .await
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut lengths = Vec::new();
                for _ in 0..60 {
                    lengths.push(store.list_cached_museums().await.unwrap().len());
                    tokio::task::yield_now().await;
                }
                lengths
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        for len in reader.await.unwrap() {
            assert!(len == 5 || len == 3, "observed {len} museums");
        }
    }

    let last = store.list_cached_museums().await.unwrap();
    assert_eq!(last.len(), 5);
    pool.close().await;
}

#[tokio::test]
async fn standalone_terminal_starts_without_cache() {
    let terminal = setup_terminal().await;
    let state = &terminal.state;

    assert!(state.store.list_cached_museums().await.unwrap().is_empty());
    let err = state
        .sale_service
        .sell(&sale(MUSEUM_A, "single", 1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("single"));
}
