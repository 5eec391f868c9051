//! PostgreSQL store tests. Need a database: run with
//! `DATABASE_URL=... cargo test -p editlock-db -- --ignored`.

use std::sync::Arc;

use chrono::{Duration, SubsecRound, Utc};
use editlock_core::clock::SystemClock;
use editlock_core::coordinator::LockCoordinator;
use editlock_core::lock::{AcquireOutcome, LockRecord};
use editlock_core::settings::LockSettings;
use editlock_core::store::{LockStore, VersionStore};
use editlock_core::types::{RecordId, Timestamp, UserId, VersionToken};
use editlock_db::repositories::RecordVersionRepo;
use editlock_db::{PgLockStore, PgVersionStore};
use sqlx::PgPool;

fn record(id: i64) -> RecordId {
    RecordId::new("scene", id).unwrap()
}

fn lease(record_id: RecordId, holder: UserId, acquired_at: Timestamp) -> LockRecord {
    LockRecord {
        record_id,
        holder,
        acquired_at,
        expires_at: acquired_at + Duration::seconds(120),
        version_token: Some(VersionToken::from("v1")),
    }
}

fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_health_check(pool: PgPool) {
    editlock_db::health_check(&pool).await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_cas_insert_only_when_absent(pool: PgPool) {
    let store = PgLockStore::new(pool);
    let t = now();

    assert!(store.compare_and_swap(&record(1), None, &lease(record(1), 1, t)).await.unwrap());
    assert!(!store.compare_and_swap(&record(1), None, &lease(record(1), 2, t)).await.unwrap());

    let stored = store.get(&record(1)).await.unwrap().unwrap();
    assert_eq!(stored, lease(record(1), 1, t));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_cas_update_requires_unchanged_lease(pool: PgPool) {
    let store = PgLockStore::new(pool);
    let t = now();
    let first = lease(record(1), 1, t);
    store.compare_and_swap(&record(1), None, &first).await.unwrap();

    let mut stale = first.clone();
    stale.expires_at = t + Duration::seconds(5);
    let next = lease(record(1), 2, t + Duration::seconds(1));

    assert!(!store.compare_and_swap(&record(1), Some(&stale), &next).await.unwrap());
    assert!(store.compare_and_swap(&record(1), Some(&first), &next).await.unwrap());
    assert_eq!(store.get(&record(1)).await.unwrap().unwrap().holder, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_delete_checks_holder(pool: PgPool) {
    let store = PgLockStore::new(pool);
    store.compare_and_swap(&record(1), None, &lease(record(1), 1, now())).await.unwrap();

    assert!(!store.delete(&record(1), 2).await.unwrap());
    assert!(store.delete(&record(1), 1).await.unwrap());
    assert!(store.get(&record(1)).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_delete_lease_requires_unchanged_lease(pool: PgPool) {
    let store = PgLockStore::new(pool);
    let t = now();
    let current = lease(record(1), 1, t);
    store.compare_and_swap(&record(1), None, &current).await.unwrap();

    let older = lease(record(1), 1, t - Duration::seconds(30));
    assert!(!store.delete_lease(&record(1), &older).await.unwrap());
    assert!(store.delete_lease(&record(1), &current).await.unwrap());
    assert!(store.get(&record(1)).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_list_live_and_purge(pool: PgPool) {
    let store = PgLockStore::new(pool);
    let t = now();
    store
        .compare_and_swap(&record(1), None, &lease(record(1), 1, t - Duration::seconds(600)))
        .await
        .unwrap();
    store.compare_and_swap(&record(2), None, &lease(record(2), 2, t)).await.unwrap();

    let live = store.list_live(t).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].record_id, record(2));

    assert_eq!(store.purge_expired(t).await.unwrap(), 1);
    assert!(store.force_delete(&record(2)).await.unwrap());
    assert!(store.list_live(t).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_version_commit(pool: PgPool) {
    let versions = PgVersionStore::new(pool.clone());
    assert!(versions.current(&record(1)).await.unwrap().is_none());

    RecordVersionRepo::upsert(&pool, &record(1), &VersionToken::from("v1"))
        .await
        .unwrap();
    let next = versions.commit(&record(1)).await.unwrap();
    assert_ne!(next, VersionToken::from("v1"));
    assert_eq!(versions.current(&record(1)).await.unwrap(), Some(next));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_acquire_on_postgres_grants_one(pool: PgPool) {
    let coordinator = Arc::new(LockCoordinator::new(
        Arc::new(PgLockStore::new(pool.clone())),
        Arc::new(PgVersionStore::new(pool)),
        Arc::new(SystemClock),
        LockSettings::default(),
    ));

    let mut handles = Vec::new();
    for user in 1..=8 {
        let coordinator = Arc::clone(&coordinator);
        handles.push(tokio::spawn(async move {
            coordinator.acquire(&record(1), user).await
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if let AcquireOutcome::Granted(_) = handle.await.unwrap().unwrap() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
}
