//! Throttle classification and attempt tracking integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use ballotbox_auth::rate_limit::{classify_message, ledger::storage_key};
use ballotbox_auth::{
    AlternateOperationPolicy, AttemptKind, AttemptLedger, AuthError, AuthOperation,
    RateLimitClassifier, ResilienceConfig,
};
use ballotbox_core::environment::Clock;
use ballotbox_core::store::DurableStore;
use ballotbox_runtime::store::{FileStore, MemoryStore};
use ballotbox_testing::{ManualClock, test_clock};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;

fn ledger(store: MemoryStore) -> (AttemptLedger<MemoryStore>, ManualClock) {
    let clock = test_clock();
    let ledger = AttemptLedger::new(store, Arc::new(clock.clone()), &ResilienceConfig::default());
    (ledger, clock)
}

// ═══════════════════════════════════════════════════════════════════════
// Attempt ledger
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_warns_after_three_resets_in_a_minute() {
    let (ledger, clock) = ledger(MemoryStore::new());

    for _ in 0..3 {
        ledger.record("a@x.com", AttemptKind::Reset).await;
        clock.advance(Duration::from_secs(20));
    }
    ledger.record("b@x.com", AttemptKind::Reset).await;

    assert!(ledger.should_warn("a@x.com", AttemptKind::Reset).await);
    assert!(!ledger.should_warn("b@x.com", AttemptKind::Reset).await);
    assert!(!ledger.should_warn("a@x.com", AttemptKind::Login).await);
}

#[tokio::test]
async fn test_identifiers_are_normalized() {
    let (ledger, _) = ledger(MemoryStore::new());

    ledger.record("A@X.com", AttemptKind::Login).await;
    ledger.record("  a@x.com ", AttemptKind::Login).await;

    assert_eq!(ledger.count_recent("a@x.com", AttemptKind::Login).await, 2);
}

#[tokio::test]
async fn test_old_attempts_age_out() {
    let (ledger, clock) = ledger(MemoryStore::new());

    ledger.record("a@x.com", AttemptKind::Register).await;
    clock.advance(Duration::from_secs(1800));
    ledger.record("a@x.com", AttemptKind::Register).await;
    clock.advance(Duration::from_secs(1800));

    assert_eq!(ledger.count_recent("a@x.com", AttemptKind::Register).await, 1);

    clock.advance(Duration::from_secs(1800));
    assert_eq!(ledger.count_recent("a@x.com", AttemptKind::Register).await, 0);
    assert!(ledger.snapshot(AttemptKind::Register).await.is_empty());
}

#[tokio::test]
async fn test_clear_forgets_only_one_identifier() {
    let (ledger, _) = ledger(MemoryStore::new());
    ledger.record("a@x.com", AttemptKind::Login).await;
    ledger.record("b@x.com", AttemptKind::Login).await;

    ledger.clear("a@x.com", AttemptKind::Login).await;

    let snapshot = ledger.snapshot(AttemptKind::Login).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get("b@x.com"), Some(&1));
}

#[tokio::test]
async fn test_history_is_shared_between_clients() {
    let store = MemoryStore::new();
    let (tab_a, _) = ledger(store.share());
    let (tab_b, _) = ledger(store.share());

    tab_a.record("a@x.com", AttemptKind::Reset).await;
    tab_b.record("a@x.com", AttemptKind::Reset).await;

    assert_eq!(tab_a.count_recent("a@x.com", AttemptKind::Reset).await, 2);
    assert!(store.entries().contains_key(&storage_key(AttemptKind::Reset)));
}

#[tokio::test]
async fn test_unavailable_store_degrades_silently() {
    let store = MemoryStore::new();
    store.set_available(false);
    let (ledger, _) = ledger(store.share());

    for _ in 0..5 {
        ledger.record("a@x.com", AttemptKind::Login).await;
    }

    assert_eq!(ledger.count_recent("a@x.com", AttemptKind::Login).await, 0);
    assert!(!ledger.should_warn("a@x.com", AttemptKind::Login).await);
    assert!(store.entries().is_empty());
}

#[tokio::test]
async fn test_corrupt_history_is_discarded() {
    let store = MemoryStore::new();
    store
        .save(&storage_key(AttemptKind::Login), "{not json".to_string())
        .await
        .unwrap();
    let (ledger, _) = ledger(store.share());

    assert_eq!(ledger.count_recent("a@x.com", AttemptKind::Login).await, 0);

    ledger.record("a@x.com", AttemptKind::Login).await;
    assert_eq!(ledger.count_recent("a@x.com", AttemptKind::Login).await, 1);
}

#[tokio::test]
async fn test_history_survives_reopening_file_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = test_clock();
    let config = ResilienceConfig::default();

    {
        let store = FileStore::open(dir.path()).await?;
        let ledger = AttemptLedger::new(store, Arc::new(clock.clone()), &config);
        ledger.record("a@x.com", AttemptKind::Reset).await;
        ledger.record("a@x.com", AttemptKind::Reset).await;
    }

    let store = FileStore::open(dir.path()).await?;
    let ledger = AttemptLedger::new(store, Arc::new(clock.clone()), &config);
    assert_eq!(ledger.count_recent("a@x.com", AttemptKind::Reset).await, 2);

    clock.advance(Duration::from_secs(3600));
    assert_eq!(ledger.count_recent("a@x.com", AttemptKind::Reset).await, 0);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_rate_limit_message_is_throttling() {
    let now = test_clock().now();

    let verdict = classify_message("Request rate limit reached", now);

    assert!(verdict.is_throttled);
    assert!(verdict.suggestions.len() >= 3);
    assert_eq!(verdict.estimated_reset, Some(now + ChronoDuration::hours(1)));
}

#[test]
fn test_classifier_reads_provider_errors() {
    let clock = test_clock();
    let classifier =
        RateLimitClassifier::new(Arc::new(clock.clone()), AlternateOperationPolicy::default());

    let throttled = classifier.classify(&AuthError::Provider("429: Too Many Requests".into()));
    let wrong_password = classifier.classify(&AuthError::InvalidCredentials);

    assert!(throttled.is_throttled);
    assert!(!wrong_password.is_throttled);
    assert!(wrong_password.suggestions.is_empty());
}

#[test]
fn test_alternate_operations_follow_policy() {
    let clock = test_clock();
    let sign_in_throttled = AuthError::Provider("Rate limit exceeded for sign in".into());
    let generic = AuthError::Provider("Rate limit exceeded".into());

    let independent =
        RateLimitClassifier::new(Arc::new(clock.clone()), AlternateOperationPolicy::Independent);
    assert!(independent.should_allow_alternate(&generic, AuthOperation::PasswordReset));
    assert!(!independent.should_allow_alternate(&sign_in_throttled, AuthOperation::SignIn));
    assert!(independent.should_allow_alternate(&sign_in_throttled, AuthOperation::PasswordReset));

    let shared = RateLimitClassifier::new(Arc::new(clock), AlternateOperationPolicy::Shared);
    assert!(!shared.should_allow_alternate(&generic, AuthOperation::PasswordReset));
    assert!(shared.should_allow_alternate(&AuthError::InvalidCredentials, AuthOperation::PasswordReset));
}
