use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use flowmesh::config::LockConfig;
use flowmesh::events::EventEmitter;
use flowmesh::lock::{InMemoryLeaseStore, LeaseStore, LockManager};

fn manager_with(
    store: &Arc<InMemoryLeaseStore>,
    worker: &str,
    config: LockConfig,
) -> LockManager {
    LockManager::new(
        Arc::clone(store) as Arc<_>,
        config,
        worker,
        EventEmitter::disconnected(),
    )
}

fn quick_config() -> LockConfig {
    LockConfig::default()
        .with_ttl(ChronoDuration::seconds(5))
        .with_renew_schedule_rate(Duration::from_millis(25))
}

#[tokio::test]
async fn get_lock_returns_stable_identity() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let manager = manager_with(&store, "worker-a", quick_config());

    let first = manager.get_lock("ctx-1");
    let second = manager.get_lock("ctx-1");
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn capacity_two_evicts_least_recently_touched() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let manager = manager_with(&store, "worker-a", quick_config().with_cache_capacity(2));

    let a = manager.get_lock("a");
    let _b = manager.get_lock("b");
    // Touch "a" so "b" is the LRU entry.
    let a_again = manager.get_lock("a");
    assert!(Arc::ptr_eq(&a, &a_again));

    let _c = manager.get_lock("c");
    assert_eq!(manager.cached_locks(), 2);

    // "a" survived; "b" was evicted and comes back as a fresh instance.
    assert!(Arc::ptr_eq(&a, &manager.get_lock("a")));
    let b_fresh = manager.get_lock("b");
    assert!(!Arc::ptr_eq(&_b, &b_fresh));
}

#[tokio::test]
async fn try_acquire_rejects_contended_lease() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let alpha = manager_with(&store, "worker-alpha", quick_config());
    let beta = manager_with(&store, "worker-beta", quick_config());

    let held = alpha.get_lock("ctx-1");
    assert!(held.try_acquire().await);

    let contender = beta.get_lock("ctx-1");
    assert!(!contender.try_acquire().await);
    assert!(!contender.is_held());
}

#[tokio::test]
async fn expired_lease_is_taken_over() {
    let store = Arc::new(InMemoryLeaseStore::new());
    // Alpha renews far too slowly to keep its lease alive once the store
    // clock jumps: an abandoned-holder simulation.
    let slow_renew = quick_config()
        .with_ttl(ChronoDuration::seconds(2))
        .with_renew_schedule_rate(Duration::from_secs(600));
    let alpha = manager_with(&store, "worker-alpha", slow_renew);
    let beta = manager_with(&store, "worker-beta", quick_config());

    let held = alpha.get_lock("ctx-1");
    assert!(held.try_acquire().await);

    store.advance_clock(ChronoDuration::seconds(10));

    let taker = beta.get_lock("ctx-1");
    assert!(taker.try_acquire().await);
    let status = store.get_status("ctx-1").await.unwrap().unwrap();
    assert_eq!(status.holder, "worker-beta");
}

#[tokio::test]
async fn reacquire_by_same_holder_succeeds() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let manager = manager_with(&store, "worker-a", quick_config());

    let lock = manager.get_lock("ctx-1");
    assert!(lock.try_acquire().await);
    assert!(lock.try_acquire().await);
    assert!(lock.is_held());
}

#[tokio::test(flavor = "multi_thread")]
async fn renewal_failure_invalidates_and_notifies() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let manager = manager_with(&store, "worker-a", quick_config());

    let lock = manager.get_lock("ctx-1");
    assert!(lock.try_acquire().await);
    let mut invalidation = lock.subscribe_invalidation();
    assert!(!*invalidation.borrow());

    // Another worker steals the lease out from under the renewal task.
    store.usurp("ctx-1", "worker-rogue", ChronoDuration::seconds(30));

    invalidation.changed().await.unwrap();
    assert!(*invalidation.borrow());
    assert!(lock.is_invalidated());
    assert!(!lock.is_held());
}

#[tokio::test(flavor = "multi_thread")]
async fn renewal_extends_lease_while_held() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let manager = manager_with(&store, "worker-a", quick_config());

    let lock = manager.get_lock("ctx-1");
    assert!(lock.try_acquire().await);
    let initial = store.get_status("ctx-1").await.unwrap().unwrap().expires_at;

    let mut extended = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let current = store.get_status("ctx-1").await.unwrap().unwrap().expires_at;
        if current > initial {
            extended = true;
            break;
        }
    }
    assert!(extended, "renewal task never extended the lease");
    assert!(lock.is_held());
}

#[tokio::test]
async fn release_deletes_backing_lease() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let manager = manager_with(&store, "worker-a", quick_config());

    let lock = manager.get_lock("ctx-1");
    assert!(lock.try_acquire().await);
    assert!(store.is_exists("ctx-1").await.unwrap());

    lock.release().await;
    assert!(!lock.is_held());
    assert!(!store.is_exists("ctx-1").await.unwrap());
}

#[tokio::test]
async fn delete_expired_locks_sweeps_idle_unheld_entries() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let manager = manager_with(&store, "worker-a", quick_config());

    let held = manager.get_lock("held");
    assert!(held.try_acquire().await);
    let _idle = manager.get_lock("idle");
    assert_eq!(manager.cached_locks(), 2);

    manager.delete_expired_locks(Duration::ZERO).await;

    // The held lock survives the sweep; the idle one is gone.
    assert_eq!(manager.cached_locks(), 1);
    assert!(Arc::ptr_eq(&held, &manager.get_lock("held")));

    // Idempotent when nothing is left to sweep.
    manager.delete_expired_locks(Duration::ZERO).await;
}
