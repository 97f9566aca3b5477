//! Bounded concurrency gate.
//!
//! Some transports cap the number of concurrently open logical streams
//! (HTTP/2 `MAX_CONCURRENT_STREAMS` on the CDN backend). The gate is a small
//! async semaphore: an integer permit counter plus a FIFO queue of waiters.
//! `acquire` never blocks a worker thread; callers that find no permit left
//! park on a oneshot channel and are woken in arrival order. Transports
//! without a stream cap simply never go through the gate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

struct GateState {
    permits: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

struct GateInner {
    state: Mutex<GateState>,
}

impl GateInner {
    /// Hand the permit to the oldest waiter still listening, skipping the
    /// counter entirely; only when no live waiter remains does the permit go
    /// back to the counter.
    fn release_one(&self) {
        let mut state = self.state.lock().expect("gate lock poisoned");
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
            // Receiver gave up while queued; try the next one.
        }
        state.permits += 1;
    }
}

/// A cloneable handle to a fixed-capacity gate.
#[derive(Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

impl Gate {
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: Mutex::new(GateState {
                    permits,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Acquire one permit, waiting (without blocking the thread) when none
    /// are available. Waiters are served strictly first-come first-served.
    pub async fn acquire(&self) -> Permit {
        let waiter = {
            let mut state = self.inner.state.lock().expect("gate lock poisoned");
            if state.permits > 0 {
                state.permits -= 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = waiter {
            // The sender lives in the queue until a release pops it; it is
            // dropped without sending only if a release found us cancelled,
            // which cannot happen while we are still awaiting here.
            let _ = rx.await;
        }

        Permit {
            gate: Some(Arc::clone(&self.inner)),
        }
    }

    /// Permits currently available (diagnostic only; racy by nature).
    pub fn available(&self) -> usize {
        self.inner.state.lock().expect("gate lock poisoned").permits
    }

    /// Waiters currently parked (diagnostic only; racy by nature).
    pub fn queued(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("gate lock poisoned")
            .waiters
            .len()
    }
}

/// A held permit. Released explicitly or on drop; releasing twice is a no-op
/// so defensive cleanup paths can call `release` unconditionally.
pub struct Permit {
    gate: Option<Arc<GateInner>>,
}

impl Permit {
    pub fn release(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release_one();
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_within_capacity_is_immediate() {
        let gate = Gate::new(2);
        let _a = gate.acquire().await;
        let _b = gate.acquire().await;
        assert_eq!(gate.available(), 0);
    }

    #[tokio::test]
    async fn test_excess_acquirers_block_until_release() {
        let gate = Gate::new(1);
        let held = gate.acquire().await;

        let gate2 = gate.clone();
        let waiter = tokio::spawn(async move {
            let _p = gate2.acquire().await;
        });

        // Give the waiter time to park; it must not have finished.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken by release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_fifo_fairness() {
        let gate = Gate::new(1);
        let held = gate.acquire().await;
        let order = Arc::new(Mutex::new(Vec::new()));

        // Spawn each waiter only after the previous one is observably
        // parked, so queue order is deterministic.
        let mut handles = Vec::new();
        for i in 0..3 {
            let gate2 = gate.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _p = gate2.acquire().await;
                order.lock().unwrap().push(i);
                // Hold briefly so releases are strictly sequential.
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
            while gate.queued() != i + 1 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_double_release_is_noop() {
        let gate = Gate::new(1);
        let mut permit = gate.acquire().await;
        permit.release();
        permit.release();
        drop(permit);
        // Exactly one permit came back.
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_skipped() {
        let gate = Gate::new(1);
        let held = gate.acquire().await;

        // Queue a waiter and then cancel it.
        let gate2 = gate.clone();
        let cancelled = tokio::spawn(async move {
            let _p = gate2.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancelled.abort();
        let _ = cancelled.await;

        drop(held);
        // Permit must come back to the counter, not vanish with the
        // cancelled waiter.
        tokio::time::timeout(Duration::from_secs(1), gate.acquire())
            .await
            .expect("permit should be available again");
    }
}
