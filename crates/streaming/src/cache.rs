use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::Shared;
use parking_lot::Mutex;

use crate::residency::{Residency, ResidencyState};
use crate::source::BoxFuture;

/// A pending-or-completed result every caller can await.
pub type SharedResult<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// Write access to one entry's residency, handed to the producing future.
#[derive(Debug, Clone)]
pub struct ResidencyHandle(Arc<Mutex<Residency>>);

impl ResidencyHandle {
    pub fn set(&self, state: ResidencyState) {
        self.0.lock().advance(state);
    }

    pub fn state(&self) -> ResidencyState {
        self.0.lock().state
    }
}

struct CacheEntry<V, E> {
    residency: ResidencyHandle,
    result: SharedResult<V, E>,
}

/// Coalescing cache of in-flight and completed fetches.
///
/// The first request for a key starts the fetch and stores the shared future
/// itself; every later request, concurrent or not, awaits that same future
/// and observes the same result. Failures are cached like successes.
///
/// When a tokio runtime is available the fetch is driven eagerly in a spawned
/// task, so it completes even if the first caller stops waiting.
pub struct SharedCache<K, V, E>
where
    V: Clone,
    E: Clone,
{
    entries: DashMap<K, CacheEntry<V, E>>,
}

impl<K, V, E> Default for SharedCache<K, V, E>
where
    K: Eq + Hash,
    V: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K, V, E> SharedCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored result for `key`, starting `fetch` on a miss.
    ///
    /// The boolean is `true` when an existing entry was reused.
    pub fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> (SharedResult<V, E>, bool)
    where
        F: FnOnce(ResidencyHandle) -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => (entry.get().result.clone(), true),
            Entry::Vacant(entry) => {
                let residency = ResidencyHandle(Arc::new(Mutex::new(Residency::new())));
                let tracker = residency.clone();
                let fetch = fetch(residency.clone());
                let future: BoxFuture<'static, Result<V, E>> = Box::pin(async move {
                    let result = fetch.await;
                    tracker.set(match result {
                        Ok(_) => ResidencyState::Resident,
                        Err(_) => ResidencyState::Failed,
                    });
                    result
                });
                let result = future.shared();

                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(result.clone());
                }

                entry.insert(CacheEntry {
                    residency,
                    result: result.clone(),
                });
                (result, false)
            }
        }
    }

    pub fn state(&self, key: &K) -> Option<ResidencyState> {
        self.entries.get(key).map(|entry| entry.residency.state())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry. Fetches already running finish for their current
    /// awaiters but are no longer reachable through the cache.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
