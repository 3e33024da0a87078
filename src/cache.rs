use std::collections::BTreeMap;
use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

use crate::{
    domain::{FollowCounts, PendingLists, Principal, RelationshipSnapshot},
    notification::Notification,
};

#[derive(Debug)]
struct Slot<V> {
    epoch: u64,
    value: Option<(V, Instant)>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            epoch: 0,
            value: None,
        }
    }
}

/// Keyed cache with per-key mutation epochs.
///
/// A read captures the key's epoch with `begin` and hands it back to `store`;
/// an invalidation in between bumps the epoch, so the late store is discarded.
/// This is what keeps a slow stale read from overwriting the effect of a
/// newer mutation.
#[derive(Debug)]
pub struct Cache<K, V> {
    ttl: Duration,
    slots: Mutex<BTreeMap<K, Slot<V>>>,
}

impl<K: Ord + Clone, V: Clone> Cache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current epoch for a key, creating the slot on first use.
    pub async fn begin(&self, key: &K) -> u64 {
        let mut slots = self.slots.lock().await;
        slots.entry(key.clone()).or_default().epoch
    }

    /// Cached value if present and within the freshness window.
    pub async fn fresh(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock().await;
        let (value, fetched_at) = slots.get(key)?.value.as_ref()?;
        if fetched_at.elapsed() > self.ttl {
            return None;
        }
        Some(value.clone())
    }

    /// Store a read result, unless the key was invalidated after the read
    /// began. Returns whether the value was kept.
    pub async fn store(&self, key: &K, epoch: u64, value: V) -> bool {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(key.clone()).or_default();
        if slot.epoch != epoch {
            return false;
        }
        slot.value = Some((value, Instant::now()));
        true
    }

    /// Drop the cached value and bump the epoch so in-flight reads for this
    /// key are discarded on arrival.
    pub async fn invalidate(&self, key: &K) {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(key.clone()).or_default();
        slot.epoch += 1;
        slot.value = None;
    }
}

/// Process-wide derived relationship state. Populated only by the resolvers
/// and written only through invalidate-then-refetch; consumers never compute
/// a new value locally.
#[derive(Debug)]
pub struct RelationCache {
    pub relationships: Cache<(Principal, Principal), RelationshipSnapshot>,
    pub follows: Cache<(Principal, Principal), bool>,
    pub follow_counts: Cache<Principal, FollowCounts>,
    pub connections: Cache<Principal, Vec<Principal>>,
    pub pending_requests: Cache<Principal, PendingLists>,
    pub following: Cache<Principal, Vec<Principal>>,
    pub notifications: Cache<Principal, Vec<Notification>>,
}

impl RelationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            relationships: Cache::new(ttl),
            follows: Cache::new(ttl),
            follow_counts: Cache::new(ttl),
            connections: Cache::new(ttl),
            pending_requests: Cache::new(ttl),
            following: Cache::new(ttl),
            notifications: Cache::new(ttl),
        }
    }
}
