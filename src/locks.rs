//! In-process async mutex per string key.
//!
//! Used to serialise read-modify-write sequences on one chat session and
//! the dedup-then-store sequence on one scrape URL. Entries nobody holds
//! are pruned once the map grows past a threshold.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    const PRUNE_THRESHOLD: usize = 1024;

    /// Wait for exclusive access to `key`; released when the guard drops.
    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            if map.len() >= Self::PRUNE_THRESHOLD {
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::default());
        let guard = locks.lock("s1").await;
        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock("s1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        // A different key is independent.
        let _other = locks.lock("s2").await;
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = KeyedLocks::default();
        for i in 0..KeyedLocks::PRUNE_THRESHOLD + 10 {
            let _g = locks.lock(&format!("k{}", i)).await;
        }
        assert!(locks.locks.lock().await.len() <= KeyedLocks::PRUNE_THRESHOLD);
    }
}
