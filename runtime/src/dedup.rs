//! Deduplication registry
//!
//! Collapses concurrent identical calls onto one underlying exchange.
//!
//! ```text
//! caller A ──dedupe(K)──► miss ──► spawn work ──► register K ─┐
//! caller B ──dedupe(K)──► hit ─────────────────────────────────┤ await shared outcome
//! caller C ──dedupe(K)──► hit ─────────────────────────────────┘
//!                                  work settles ──► remove K ──► A, B, C get the same outcome
//! caller D ──dedupe(K)──► miss ──► fresh work
//! ```
//!
//! The work runs on its own task, so callers walking away do not cancel
//! it; the entry is removed when the task finishes, including by panic.

use crate::metrics::RequestMetrics;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use hearth_core::{error::RequestError, request::RequestKey};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::debug;

/// Settled result of one exchange, shared by every collapsed caller
pub type Outcome = Result<Value, RequestError>;

type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;
type Entries = Arc<Mutex<HashMap<RequestKey, SharedOutcome>>>;

/// Registry of in-flight exchanges keyed by [`RequestKey`]
#[derive(Clone, Default)]
pub struct DedupRegistry {
    entries: Entries,
}

/// Removes a key from the registry when the owning task ends
struct Deregister {
    entries: Entries,
    key: RequestKey,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        lock(&self.entries).remove(&self.key);
    }
}

impl DedupRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the pending exchange for `key`, or start one with `factory`
    ///
    /// The entry is removed before the outcome reaches any caller, so a call
    /// made after settlement always starts fresh work.
    pub async fn dedupe<F, Fut>(&self, key: RequestKey, factory: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let shared = {
            let mut entries = lock(&self.entries);

            if let Some(pending) = entries.get(&key) {
                debug!(key = %key, "Joining in-flight request");
                RequestMetrics::record_dedup_hit();
                pending.clone()
            } else {
                let work = factory();
                let registered = Arc::clone(&self.entries);
                let registered_key = key.clone();
                let handle = tokio::spawn(async move {
                    let deregister = Deregister {
                        entries: registered,
                        key: registered_key,
                    };
                    let outcome = work.await;
                    drop(deregister);
                    outcome
                });

                let shared = settle(handle).boxed().shared();
                entries.insert(key, shared.clone());
                shared
            }
        };

        shared.await
    }

    /// Keys with an exchange currently in flight
    #[must_use]
    pub fn pending_keys(&self) -> Vec<RequestKey> {
        lock(&self.entries).keys().cloned().collect()
    }

    /// Number of in-flight entries
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Check if nothing is in flight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

/// Await a spawned exchange, turning a panicked task into an `Internal` failure
pub(crate) async fn settle(handle: JoinHandle<Outcome>) -> Outcome {
    handle
        .await
        .unwrap_or_else(|e| Err(RequestError::internal(format!("request task failed: {e}"))))
}

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<RequestKey, SharedOutcome>> {
    // The map is only touched in short, non-panicking sections.
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use hearth_core::request::RequestDescriptor;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn key(path: &str) -> RequestKey {
        RequestDescriptor::get(path).key(true).unwrap()
    }

    fn counted(runs: Arc<AtomicUsize>) -> impl FnOnce() -> BoxFuture<'static, Outcome> {
        move || {
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_identical_calls_share_one_execution() {
        let registry = DedupRegistry::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();
        let gate = gate.shared();

        let make = || {
            let runs = Arc::clone(&runs);
            let gate = gate.clone();
            move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                let _ = gate.await;
                Ok(json!({ "posts": [1, 2, 3] }))
            }
        };

        let first = registry.dedupe(key("/feed"), make());
        let second = registry.dedupe(key("/feed"), make());
        let third = registry.dedupe(key("/feed"), make());

        let waiter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            release.send(()).unwrap();
        });

        let (a, b, c) = tokio::join!(first, second, third);
        waiter.await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.unwrap(), json!({ "posts": [1, 2, 3] }));
    }

    #[tokio::test]
    async fn test_settled_entry_is_removed_and_next_call_runs_fresh() {
        let registry = DedupRegistry::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2 {
            let runs_clone = Arc::clone(&runs);
            let outcome = registry
                .dedupe(key("/profile"), move || async move {
                    Ok(json!(runs_clone.fetch_add(1, Ordering::SeqCst) + 1))
                })
                .await;

            assert_eq!(outcome.unwrap(), json!(expected));
            assert!(registry.is_empty());
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_fanned_out_and_deregistered() {
        let registry = DedupRegistry::new();

        let failing = || {
            || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(RequestError::from_status(404, "Post not found"))
            }
        };

        let (a, b) = tokio::join!(
            registry.dedupe(key("/posts/9"), failing()),
            registry.dedupe(key("/posts/9"), failing()),
        );

        assert_eq!(a, b);
        assert_eq!(a.unwrap_err().status, Some(404));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_collapse() {
        let registry = DedupRegistry::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            registry.dedupe(key("/communities/1"), counted(Arc::clone(&runs))),
            registry.dedupe(key("/communities/2"), counted(Arc::clone(&runs))),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_work() {
        let registry = DedupRegistry::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let finished_clone = Arc::clone(&finished);

        let call = registry.dedupe(key("/journal"), move || async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            finished_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });

        let abandoned = tokio::time::timeout(Duration::from_millis(1), call).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_work_is_internal_failure_and_deregistered() {
        let registry = DedupRegistry::new();

        let outcome = registry
            .dedupe(key("/milestones"), || async { panic!("decoder bug") })
            .await;

        assert_eq!(outcome.unwrap_err().kind, hearth_core::ErrorKind::Internal);
        assert!(registry.is_empty());
    }
}
