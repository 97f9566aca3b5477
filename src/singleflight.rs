//! Keyed single-flight request coalescing.
//!
//! Within one process many logical callers may ask the same source for the
//! same remote listing at the same time (resolving every tool in an RC file
//! hits the same catalog once per tool). Instead of each source keeping its
//! own ad-hoc "pending request" slot, every adapter shares this utility: the
//! first caller for a key becomes the leader and runs the underlying future,
//! later callers attach to the same shared future, and the table entry is
//! removed exactly once when the call settles — success or failure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::future::{FutureExt, Shared};

use crate::source::error::SourceError;

type SharedCall<T> = Shared<Pin<Box<dyn Future<Output = Result<T, Arc<SourceError>>> + Send>>>;

/// A keyed single-flight table.
///
/// `T` is the (cloneable) result every attached caller receives. Errors are
/// wrapped in `Arc` so one failure can be handed to every waiter.
pub struct SingleFlight<T> {
    inflight: Arc<Mutex<HashMap<String, SharedCall<T>>>>,
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `work` under `key`, or attach to the call already in flight for
    /// that key.
    ///
    /// The check-and-insert is a single critical section, so two racing
    /// callers can never both become leader. The leader's future removes its
    /// own table entry right after the underlying call settles, before any
    /// waiter observes the result, so a caller arriving after settlement
    /// starts a fresh call.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T, SourceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SourceError>> + Send + 'static,
    {
        let call = {
            let mut table = self
                .inflight
                .lock()
                .expect("single-flight table lock poisoned");
            if let Some(existing) = table.get(key) {
                existing.clone()
            } else {
                let table_ref = Arc::clone(&self.inflight);
                let owned_key = key.to_string();
                let fut = work();
                let call: SharedCall<T> = async move {
                    let result = fut.await.map_err(Arc::new);
                    table_ref
                        .lock()
                        .expect("single-flight table lock poisoned")
                        .remove(&owned_key);
                    result
                }
                .boxed()
                .shared();
                table.insert(key.to_string(), call.clone());
                call
            }
        };

        call.await.map_err(SourceError::from)
    }

    /// Number of calls currently in flight.
    pub fn inflight_len(&self) -> usize {
        self.inflight
            .lock()
            .expect("single-flight table lock poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let flight = Arc::new(SingleFlight::<Vec<String>>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flight
                    .run("list-tools", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(vec!["java".to_string()])
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result, vec!["java".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight = SingleFlight::<u32>::new();
        let a = flight.run("a", || async { Ok(1) }).await.unwrap();
        let b = flight.run("b", || async { Ok(2) }).await.unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn test_entry_removed_after_settlement() {
        let flight = SingleFlight::<u32>::new();
        flight.run("k", || async { Ok(7) }).await.unwrap();
        assert_eq!(flight.inflight_len(), 0);

        // A failure must also clear the entry.
        let err = flight
            .run("k", || async { Err(SourceError::protocol(500, "boom")) })
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Coalesced(_)));
        assert_eq!(flight.inflight_len(), 0);

        // Fresh call after settlement runs again and can succeed.
        let again = flight.run("k", || async { Ok(9) }).await.unwrap();
        assert_eq!(again, 9);
    }

    #[tokio::test]
    async fn test_failure_is_delivered_to_every_waiter() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flight
                    .run("fails", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(SourceError::protocol(502, "bad gateway"))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
