use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use log::warn;

/// Default capacity of the in-process dedup cache. Webhook event ids are short-lived; ten
/// thousand entries comfortably covers the provider's redelivery window.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Remembers recently processed webhook event ids so that at-least-once deliveries are applied
/// at most once.
///
/// Implementations must be bounded and safe to call from concurrent request handlers. The
/// bundled [`InMemoryDedupCache`] is explicitly a best-effort single-process cache; a
/// multi-instance deployment must inject an implementation backed by a shared store instead.
#[allow(async_fn_in_trait)]
pub trait EventDedupStore: Clone + Send + Sync {
    /// Records `event_id` as processed. Returns `true` if this is the first time the id is seen,
    /// `false` if it is a duplicate and the event must be skipped.
    async fn mark_processed(&self, event_id: &str) -> bool;

    /// Releases a previously recorded id. Callers use this when processing fails after the id was
    /// claimed, so that the provider's redelivery is not swallowed as a duplicate.
    async fn forget(&self, event_id: &str);
}

/// Bounded in-memory dedup cache: a hash set for membership plus an insertion-order queue for
/// evict-oldest on overflow.
#[derive(Clone)]
pub struct InMemoryDedupCache {
    inner: Arc<Mutex<DedupInner>>,
}

struct DedupInner {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl InMemoryDedupCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let inner = DedupInner {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        };
        Self { inner: Arc::new(Mutex::new(inner)) }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.seen.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryDedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl EventDedupStore for InMemoryDedupCache {
    async fn mark_processed(&self, event_id: &str) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("📬️ Dedup cache mutex was poisoned. Continuing with the recovered guard.");
                poisoned.into_inner()
            },
        };
        if inner.seen.contains(event_id) {
            return false;
        }
        if inner.seen.len() >= inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        inner.seen.insert(event_id.to_string());
        inner.order.push_back(event_id.to_string());
        true
    }

    async fn forget(&self, event_id: &str) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("📬️ Dedup cache mutex was poisoned. Continuing with the recovered guard.");
                poisoned.into_inner()
            },
        };
        if inner.seen.remove(event_id) {
            inner.order.retain(|id| id != event_id);
        }
    }
}
