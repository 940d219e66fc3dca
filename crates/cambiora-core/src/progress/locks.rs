//! Per-key single-writer serialization.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

type Key = (String, String);

/// Hands out one mutex per `(user, subject)` key.
///
/// Writers for the same key queue up; different keys only share a shard
/// lock for the lookup. A slot is dropped from the table once its last
/// holder releases it, so the table only holds keys that are in use.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: DashMap<Key, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the key's lock.
    ///
    /// A panic inside another holder does not wedge the key.
    pub fn with_lock<R>(&self, user_id: &str, subject_id: &str, f: impl FnOnce() -> R) -> R {
        let key = (user_id.to_string(), subject_id.to_string());
        let slot = Arc::clone(&self.slots.entry(key.clone()).or_default());

        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        drop(slot);
        // Only the table's own reference left: nobody holds or waits on it.
        self.slots.remove_if(&key, |_, slot| Arc::strong_count(slot) == 1);
        result
    }

    /// Number of keys currently held or waited on.
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
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_lock("u1", "h1", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn distinct_keys_get_distinct_slots() {
        let locks = KeyedLocks::new();
        let value = locks.with_lock("u1", "h1", || {
            locks.with_lock("u1", "h2", || {
                assert_eq!(locks.len(), 2);
                7
            })
        });
        assert_eq!(value, 7);
        assert!(locks.is_empty());
    }

    #[test]
    fn released_slots_are_evicted() {
        let locks = KeyedLocks::new();
        for i in 0..10_000 {
            locks.with_lock("u1", &format!("c{i}"), || ());
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn contended_slot_survives_until_last_holder() {
        let locks = Arc::new(KeyedLocks::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let locks = Arc::clone(&locks);
                thread::spawn(move || {
                    locks.with_lock("u1", if i % 2 == 0 { "h1" } else { "h2" }, || {
                        thread::sleep(Duration::from_millis(1));
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(locks.is_empty());
    }
}
