//! Per-group write serialization.
//!
//! `groupOfNames` membership edits are read-modify-write (the placeholder
//! check reads `member` before deleting), so two reconciliations touching
//! the same group must not interleave. Locks are keyed by the lowercased
//! group name and are independent of any per-identity serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of async locks, one per group name.
#[derive(Debug, Default)]
pub struct GroupLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for `group`, waiting for any current holder.
    pub async fn lock(&self, group: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            locks
                .entry(group.to_lowercase())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of groups that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_group_is_serialized() {
        let locks = Arc::new(GroupLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            // Mixed case still maps to one lock.
            let name = if i % 2 == 0 { "Editors" } else { "editors" };
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(name).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_different_groups_do_not_block() {
        let locks = GroupLocks::new();
        let _a = locks.lock("editors").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("admins")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
