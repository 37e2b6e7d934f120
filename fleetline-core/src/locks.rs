use dashmap::DashMap;
use fleetline_shared::{Assignment, ResourceKind};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// What a write path serializes on. `Trip` sorts before `Resource`, and
/// every acquisition is sorted, so lock order is global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Trip(Uuid),
    Resource(ResourceKind, Uuid),
}

impl LockKey {
    pub fn for_assignment(assignment: &Assignment) -> [LockKey; 2] {
        [
            LockKey::Resource(ResourceKind::Driver, assignment.driver_id),
            LockKey::Resource(ResourceKind::Bus, assignment.bus_id),
        ]
    }
}

/// In-process mutual exclusion keyed by trip or (kind, resource).
#[derive(Debug, Default)]
pub struct ResourceLocks {
    slots: DashMap<LockKey, Arc<Mutex<()>>>,
}

/// Guards held for the duration of one write sequence.
#[must_use = "locks are released as soon as the set is dropped"]
pub struct LockSet {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> LockSet {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            // The map shard guard must be released before awaiting.
            let slot = self.slots.entry(key).or_default().clone();
            guards.push(slot.lock_owned().await);
        }
        LockSet { _guards: guards }
    }

    /// Drops slots nobody holds or waits on.
    pub fn prune(&self) {
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(ResourceLocks::new());
        let key = LockKey::Resource(ResourceKind::Bus, Uuid::new_v4());

        let held = locks.acquire([key]).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _set = locks.acquire([key]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(held);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_keys_do_not_self_deadlock() {
        let locks = ResourceLocks::new();
        let key = LockKey::Trip(Uuid::new_v4());
        let _set = locks.acquire([key, key]).await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_slots() {
        let locks = ResourceLocks::new();
        let held_key = LockKey::Trip(Uuid::new_v4());
        let held = locks.acquire([held_key]).await;
        drop(locks.acquire([LockKey::Trip(Uuid::new_v4())]).await);

        locks.prune();
        assert_eq!(locks.len(), 1);

        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }

    #[test]
    fn test_trip_keys_sort_first() {
        let resource = LockKey::Resource(ResourceKind::Driver, Uuid::nil());
        let trip = LockKey::Trip(Uuid::from_u128(u128::MAX));
        assert!(trip < resource);
    }
}
