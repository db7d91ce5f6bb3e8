use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;

/// Result handed to followers when the leader never stored one, either
/// because its loader panicked or because its future was dropped mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("singleflight leader failed without producing a result")]
pub struct LeaderFailed;

/// An in-flight `work` call.
struct Call<T, E> {
    done: watch::Sender<bool>,
    created: SystemTime,
    result: Mutex<Result<T, E>>,
}

enum Role<T, E> {
    Leader(Arc<Call<T, E>>),
    Follower(Arc<Call<T, E>>),
}

/// A namespace in which units of work are executed with duplicate
/// suppression: at most one loader runs per key at any time.
pub struct FlightGroup<T, E> {
    calls: Mutex<HashMap<String, Arc<Call<T, E>>>>,
}

impl<T, E> FlightGroup<T, E>
where
    T: Clone,
    E: Clone + From<LeaderFailed>,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `loader` for `key` unless a run for the same key is already in
    /// flight, in which case the caller waits for that run and receives a
    /// clone of its result.
    ///
    /// The group lock is only held while the call map is inspected or
    /// updated, never while `loader` runs, so different keys proceed in
    /// parallel. A follower waits until the leader finishes; dropping the
    /// follower's future stops its wait without affecting the leader.
    pub async fn work<F, Fut>(&self, key: &str, loader: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let role = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(call) => Role::Follower(call.clone()),
                None => {
                    let (done, _) = watch::channel(false);
                    let call = Arc::new(Call {
                        done,
                        created: SystemTime::now(),
                        result: Mutex::new(Err(E::from(LeaderFailed))),
                    });
                    calls.insert(key.to_string(), call.clone());
                    Role::Leader(call)
                }
            }
        };

        match role {
            Role::Follower(call) => {
                tracing::trace!("Joining in-flight call for key {}", key);
                Self::wait(call).await
            }
            Role::Leader(call) => {
                let guard = LeaderGuard {
                    group: self,
                    key,
                    call: &call,
                };

                let result = loader().await;
                *call.result.lock() = result.clone();
                drop(guard);

                result
            }
        }
    }

    async fn wait(call: Arc<Call<T, E>>) -> Result<T, E> {
        let mut done = call.done.subscribe();
        // The sender lives inside `call`, so the channel stays open while we wait.
        let _ = done.wait_for(|finished| *finished).await;
        call.result.lock().clone()
    }

    /// Number of distinct keys currently in flight.
    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Creation time of the oldest in-flight call, `None` when idle.
    pub fn longest_running_start_time(&self) -> Option<SystemTime> {
        self.calls.lock().values().map(|call| call.created).min()
    }

    /// Runs `f` while holding the group lock. No new call can start until
    /// `f` returns; loaders already executing keep running.
    pub fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _calls = self.calls.lock();
        f()
    }
}

impl<T, E> Default for FlightGroup<T, E>
where
    T: Clone,
    E: Clone + From<LeaderFailed>,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Signals completion and removes the call on every exit path of the
/// leader, including unwinding and cancellation.
struct LeaderGuard<'a, T, E> {
    group: &'a FlightGroup<T, E>,
    key: &'a str,
    call: &'a Arc<Call<T, E>>,
}

impl<T, E> Drop for LeaderGuard<'_, T, E> {
    fn drop(&mut self) {
        self.call.done.send_replace(true);

        let mut calls = self.group.calls.lock();
        if calls
            .get(self.key)
            .is_some_and(|call| Arc::ptr_eq(call, self.call))
        {
            calls.remove(self.key);
        }
    }
}
