//! Flight Group Tests
//!
//! Validates duplicate suppression and the bookkeeping around in-flight calls.
//!
//! ## Test Scopes
//! - **Suppression**: Concurrent callers for one key share a single loader execution.
//! - **Parallelism**: Distinct keys never serialize on each other.
//! - **Introspection**: `count` and `longest_running_start_time` track in-flight calls.
//! - **Failure**: A panicking leader still releases its followers.

#[cfg(test)]
mod tests {
    use crate::error::CacheError;
    use crate::flight::group::{FlightGroup, LeaderFailed};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant, SystemTime};
    use tokio::sync::Notify;

    type Group = FlightGroup<String, CacheError>;

    // ============================================================
    // DUPLICATE SUPPRESSION
    // ============================================================

    #[tokio::test]
    async fn test_work_returns_loader_value() {
        let group = Group::new();

        let value = group
            .work("key", || async { Ok("bar".to_string()) })
            .await
            .unwrap();

        assert_eq!(value, "bar");
        assert_eq!(group.count(), 0);
    }

    #[tokio::test]
    async fn test_work_returns_loader_error() {
        let group = Group::new();

        let result = group
            .work("key", || async {
                Err(CacheError::BadRequest("some error".to_string()))
            })
            .await;

        match result {
            Err(CacheError::BadRequest(message)) => assert_eq!(message, "some error"),
            other => panic!("Expected BadRequest, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_share_one_execution() {
        // ARRANGE: a loader that blocks until released
        let group = Arc::new(Group::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let group = group.clone();
            let calls = calls.clone();
            let release = release.clone();
            let started = started.clone();
            handles.push(tokio::spawn(async move {
                group
                    .work("shared", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        started.notify_one();
                        release.notified().await;
                        Ok("value".to_string())
                    })
                    .await
            }));
        }

        // ACT: wait for the leader, give followers time to attach, then release
        started.notified().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(group.count(), 1, "All callers should share one key entry");
        release.notify_one();

        // ASSERT
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "value");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "Loader should run exactly once");
        assert_eq!(group.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_followers_receive_leader_error() {
        let group = Arc::new(Group::new());
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let leader = {
            let group = group.clone();
            let release = release.clone();
            let started = started.clone();
            tokio::spawn(async move {
                group
                    .work("failing", || async move {
                        started.notify_one();
                        release.notified().await;
                        Err(CacheError::GroupNotFound("missing".to_string()))
                    })
                    .await
            })
        };
        started.notified().await;

        let follower = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .work("failing", || async { Ok("never".to_string()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.notify_one();

        assert!(matches!(
            leader.await.unwrap(),
            Err(CacheError::GroupNotFound(_))
        ));
        assert!(matches!(
            follower.await.unwrap(),
            Err(CacheError::GroupNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_keys_run_in_parallel() {
        let group = Arc::new(Group::new());
        let delay = Duration::from_millis(300);

        let start = Instant::now();
        let a = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .work("a", || async move {
                        tokio::time::sleep(delay).await;
                        Ok("a".to_string())
                    })
                    .await
            })
        };
        let b = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .work("b", || async move {
                        tokio::time::sleep(delay).await;
                        Ok("b".to_string())
                    })
                    .await
            })
        };

        assert_eq!(a.await.unwrap().unwrap(), "a");
        assert_eq!(b.await.unwrap().unwrap(), "b");

        let elapsed = start.elapsed();
        assert!(
            elapsed < delay * 2,
            "Two keys should overlap, took {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_sequential_calls_execute_again() {
        let group = Group::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        for _ in 0..3 {
            group
                .work("key", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("v".to_string())
                })
                .await
                .unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    // ============================================================
    // INTROSPECTION
    // ============================================================

    #[tokio::test]
    async fn test_idle_group_has_no_start_time() {
        let group = Group::new();

        assert_eq!(group.count(), 0);
        assert!(group.longest_running_start_time().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_longest_running_start_time_while_in_flight() {
        let group = Arc::new(Group::new());
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let before = SystemTime::now();
        let handle = {
            let group = group.clone();
            let release = release.clone();
            let started = started.clone();
            tokio::spawn(async move {
                group
                    .work("slow", || async move {
                        started.notify_one();
                        release.notified().await;
                        Ok("done".to_string())
                    })
                    .await
            })
        };
        started.notified().await;

        let oldest = group
            .longest_running_start_time()
            .expect("A call is in flight");
        assert!(oldest >= before);
        assert!(oldest <= SystemTime::now());
        assert_eq!(group.count(), 1);

        release.notify_one();
        handle.await.unwrap().unwrap();

        assert_eq!(group.count(), 0);
        assert!(group.longest_running_start_time().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_count_tracks_keys_not_callers() {
        let group = Arc::new(Group::new());
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for key in ["a", "a", "a", "b"] {
            let group = group.clone();
            let release = release.clone();
            handles.push(tokio::spawn(async move {
                group
                    .work(key, || async move {
                        release.notified().await;
                        Ok(key.to_string())
                    })
                    .await
            }));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(group.count(), 2);

        // One notification per leader
        release.notify_one();
        release.notify_one();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(group.count(), 0);
    }

    // ============================================================
    // LOCK
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_blocks_new_calls() {
        // ARRANGE
        let group: Arc<FlightGroup<Instant, CacheError>> = Arc::new(FlightGroup::new());
        let lock_released = Arc::new(parking_lot::Mutex::new(None::<Instant>));

        // ACT: hold the lock for a while on a blocking thread
        let locker = {
            let group = group.clone();
            let lock_released = lock_released.clone();
            tokio::task::spawn_blocking(move || {
                group.lock(|| {
                    std::thread::sleep(Duration::from_millis(300));
                    *lock_released.lock() = Some(Instant::now());
                });
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let loader_started = {
            let group = group.clone();
            tokio::task::spawn_blocking(move || {
                tokio::runtime::Handle::current().block_on(async move {
                    group
                        .work("fresh", || async { Ok(Instant::now()) })
                        .await
                })
            })
        };

        locker.await.unwrap();
        let started = loader_started.await.unwrap().expect("Loader should run");

        // ASSERT
        let released = lock_released.lock().expect("Lock closure should finish");
        assert!(
            started >= released,
            "Loader must not start before the lock is released"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_does_not_wait_for_running_loaders() {
        let group = Arc::new(Group::new());
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let handle = {
            let group = group.clone();
            let release = release.clone();
            let started = started.clone();
            tokio::spawn(async move {
                group
                    .work("running", || async move {
                        started.notify_one();
                        release.notified().await;
                        Ok("ok".to_string())
                    })
                    .await
            })
        };
        started.notified().await;

        // The loader is parked outside the lock, so this returns immediately
        let in_flight = group.lock(|| 42);
        assert_eq!(in_flight, 42);
        assert_eq!(group.count(), 1);

        release.notify_one();
        assert_eq!(handle.await.unwrap().unwrap(), "ok");
    }

    // ============================================================
    // ABNORMAL TERMINATION
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panicking_leader_releases_followers() {
        // ARRANGE
        let group = Arc::new(Group::new());
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let leader = {
            let group = group.clone();
            let release = release.clone();
            let started = started.clone();
            tokio::spawn(async move {
                group
                    .work("boom", || async move {
                        started.notify_one();
                        release.notified().await;
                        panic!("loader exploded");
                    })
                    .await
            })
        };
        started.notified().await;

        let follower = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .work("boom", || async { Ok("unused".to_string()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // ACT
        release.notify_one();

        // ASSERT: the panic reaches the leader's caller, the follower gets the sentinel
        let leader_result = leader.await;
        assert!(leader_result.unwrap_err().is_panic());

        match follower.await.unwrap() {
            Err(CacheError::LeaderFailed(LeaderFailed)) => {}
            other => panic!("Expected LeaderFailed, got {:?}", other),
        }
        assert_eq!(group.count(), 0, "Entry must be removed after a panic");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_leader_releases_followers() {
        let group = Arc::new(Group::new());
        let started = Arc::new(Notify::new());

        let leader = {
            let group = group.clone();
            let started = started.clone();
            tokio::spawn(async move {
                group
                    .work("cancelled", || async move {
                        started.notify_one();
                        std::future::pending::<()>().await;
                        Ok("never".to_string())
                    })
                    .await
            })
        };
        started.notified().await;

        let follower = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .work("cancelled", || async { Ok("unused".to_string()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        leader.abort();

        let result = tokio::time::timeout(Duration::from_secs(2), follower)
            .await
            .expect("Follower should be released")
            .unwrap();
        assert!(matches!(result, Err(CacheError::LeaderFailed(_))));
        assert_eq!(group.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_follower_timeout_leaves_leader_running() {
        let group = Arc::new(Group::new());
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let leader = {
            let group = group.clone();
            let release = release.clone();
            let started = started.clone();
            tokio::spawn(async move {
                group
                    .work("patient", || async move {
                        started.notify_one();
                        release.notified().await;
                        Ok("leader".to_string())
                    })
                    .await
            })
        };
        started.notified().await;

        let follower = tokio::time::timeout(
            Duration::from_millis(50),
            group.work("patient", || async { Ok("unused".to_string()) }),
        )
        .await;
        assert!(follower.is_err(), "Follower should give up on its own deadline");
        assert_eq!(group.count(), 1, "Leader keeps running");

        release.notify_one();
        assert_eq!(leader.await.unwrap().unwrap(), "leader");
    }
}
