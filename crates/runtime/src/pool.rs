use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Counting semaphore with FIFO waiters.
///
/// Key properties:
/// - At most `concurrency` acquisitions are granted without a matching release.
/// - Waiters are granted in the order they called `acquire`.
/// - `release` hands its slot straight to the oldest waiter, if any.
///
/// The pool does not track who holds a slot. Every `acquire` must be paired
/// with exactly one `release`; prefer [`ResourcePool::permit`] or
/// [`ResourcePool::run`], which release on drop.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    concurrency: usize,
    state: Arc<Mutex<PoolState>>,
}

#[derive(Debug)]
struct PoolState {
    available: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl ResourcePool {
    /// `concurrency` is clamped to at least one slot.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            concurrency,
            state: Arc::new(Mutex::new(PoolState {
                available: concurrency,
                waiters: VecDeque::new(),
            })),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Callers queued for a slot.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Claims a slot, waiting behind earlier callers if none is free.
    ///
    /// The caller's place in the queue is taken when this is called, not when
    /// the returned future is first polled.
    pub fn acquire(&self) -> impl Future<Output = ()> + Send + 'static {
        let waiter = {
            let mut state = self.state.lock();
            if state.available > 0 {
                state.available -= 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            }
        };

        async move {
            if let Some(rx) = waiter {
                // The sender only disappears together with the pool itself.
                let _ = rx.await;
            }
        }
    }

    /// Returns a slot, granting it to the oldest live waiter.
    pub fn release(&self) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
        }
        state.available += 1;
    }

    /// Acquires a slot that is released when the permit drops.
    pub async fn permit(&self) -> PoolPermit {
        self.acquire().await;
        PoolPermit { pool: self.clone() }
    }

    /// Runs `operation` while holding a slot.
    pub async fn run<F>(&self, operation: F) -> F::Output
    where
        F: Future,
    {
        let _permit = self.permit().await;
        operation.await
    }
}

/// Scoped slot of a [`ResourcePool`].
#[derive(Debug)]
pub struct PoolPermit {
    pool: ResourcePool,
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        self.pool.release();
    }
}
