//! Session changes made by other clients sharing a durable store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use ballotbox_auth::constants::storage_keys;
use ballotbox_auth::mocks::MockIdentityProvider;
use ballotbox_auth::{
    AuthEnvironment, AuthOperation, RefreshState, ResilienceConfig, Session, SessionManager,
};
use ballotbox_core::environment::Clock;
use ballotbox_core::store::DurableStore;
use ballotbox_runtime::store::{FileStore, MemoryStore};
use ballotbox_testing::{ManualClock, ManualTimer, test_clock};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;

struct Tab {
    manager: SessionManager<MockIdentityProvider>,
    identity: MockIdentityProvider,
    clock: ManualClock,
    timer: ManualTimer,
}

async fn signed_in_tab() -> Tab {
    let clock = test_clock();
    let timer = ManualTimer::new(clock.clone());
    let identity = MockIdentityProvider::new();
    let env = AuthEnvironment::new(
        identity.clone(),
        Arc::new(clock.clone()),
        Arc::new(timer.clone()),
    );
    let manager = SessionManager::new(env, ResilienceConfig::default()).unwrap();

    identity.push_sign_in(Ok(session(&clock, "access-1")));
    manager.sign_in("voter@example.com", "pw").await.unwrap();

    Tab {
        manager,
        identity,
        clock,
        timer,
    }
}

fn session(clock: &ManualClock, access: &str) -> Session {
    Session::new("user-1", access, "refresh", clock.now() + ChronoDuration::hours(1))
}

/// Let the spawned watcher drain its notifications.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_external_write_forces_fresh_lookup() {
    let tab = signed_in_tab().await;
    let store = MemoryStore::new();
    let other_tab = store.share();
    tab.manager.watch_store(&store);

    other_tab
        .save(storage_keys::SESSION, "{}".to_string())
        .await
        .unwrap();
    settle().await;

    assert_eq!(tab.timer.pending_count(), 0);
    assert_eq!(tab.manager.refresh_state(), RefreshState::Idle);

    tab.identity
        .push_session_lookup(Ok(Some(session(&tab.clock, "access-other-tab"))));
    let token = tab.manager.get_access_token().await.unwrap();

    assert_eq!(token.as_deref(), Some("access-other-tab"));
    assert_eq!(tab.identity.calls(AuthOperation::SessionLookup), 1);
    assert_eq!(tab.timer.pending_count(), 1);
}

#[tokio::test]
async fn test_external_sign_out_is_noticed() {
    let tab = signed_in_tab().await;
    let store = MemoryStore::new();
    let other_tab = store.share();
    other_tab
        .save(storage_keys::SESSION, "{}".to_string())
        .await
        .unwrap();
    tab.manager.watch_store(&store);

    other_tab.remove(storage_keys::SESSION).await.unwrap();
    settle().await;

    assert_eq!(tab.manager.get_session().await.unwrap(), None);
    assert_eq!(tab.identity.calls(AuthOperation::SessionLookup), 1);
}

#[tokio::test]
async fn test_own_and_unrelated_writes_are_ignored() {
    let tab = signed_in_tab().await;
    let store = MemoryStore::new();
    tab.manager.watch_store(&store);

    store
        .save(storage_keys::SESSION, "{}".to_string())
        .await
        .unwrap();
    store
        .share()
        .save("ballotbox.auth.attempts.login", "{}".to_string())
        .await
        .unwrap();
    settle().await;

    assert_eq!(
        tab.manager.get_access_token().await.unwrap().as_deref(),
        Some("access-1")
    );
    assert_eq!(tab.identity.calls(AuthOperation::SessionLookup), 0);
    assert_eq!(tab.timer.pending_count(), 1);
}

#[tokio::test]
async fn test_shutdown_stops_watching() {
    let tab = signed_in_tab().await;
    let store = MemoryStore::new();
    tab.manager.watch_store(&store);

    tab.manager.shutdown();
    assert_eq!(tab.timer.pending_count(), 0);

    tab.identity.push_sign_in(Ok(session(&tab.clock, "access-2")));
    tab.manager.sign_in("voter@example.com", "pw").await.unwrap();
    store
        .share()
        .save(storage_keys::SESSION, "{}".to_string())
        .await
        .unwrap();
    settle().await;

    assert_eq!(tab.timer.pending_count(), 1);
    assert_eq!(
        tab.manager.get_access_token().await.unwrap().as_deref(),
        Some("access-2")
    );
}

#[tokio::test]
async fn test_file_store_handles_share_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let tab = signed_in_tab().await;
    let store = FileStore::open(dir.path()).await.unwrap();
    tab.manager.watch_store(&store);

    store
        .share()
        .save(storage_keys::SESSION, "{}".to_string())
        .await
        .unwrap();
    settle().await;

    assert_eq!(tab.timer.pending_count(), 0);
    assert_eq!(tab.manager.refresh_state(), RefreshState::Idle);
}
