use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Cap before eviction kicks in, matching `UserResolver`'s cache-size
/// threshold in spirit — past this, the least-recently-touched half of
/// entries are dropped rather than letting the map grow unbounded.
const MAX_ENTRIES: usize = 256;

struct Entry {
    lock: Arc<Mutex<()>>,
    last_touched: u64,
}

/// Serializes LLM job processing per user, so a user's jobs run in FIFO
/// order even though the worker consumes several streams concurrently
///. Holding the guard for the duration of a job's handler call
/// is what gives the ordering; the map only tracks which users currently
/// have an outstanding lock.
pub struct UserLocks {
    entries: DashMap<i64, Entry>,
    clock: std::sync::atomic::AtomicU64,
}

impl UserLocks {
    pub fn new() -> Self {
        Self { entries: DashMap::new(), clock: std::sync::atomic::AtomicU64::new(0) }
    }

    /// Acquire the lock for `user_id`, blocking until any in-flight job for
    /// the same user finishes. The returned guard holds the lock alive for
    /// the caller's `await` scope.
    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let tick = self.clock.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let lock = {
            let mut entry = self.entries.entry(user_id).or_insert_with(|| Entry {
                lock: Arc::new(Mutex::new(())),
                last_touched: tick,
            });
            entry.last_touched = tick;
            entry.lock.clone()
        };

        if self.entries.len() > MAX_ENTRIES {
            self.evict_idle(user_id);
        }

        // `lock_owned` hands back a guard backed by the Arc itself, so it
        // stays valid even if this entry gets evicted from the map while
        // the guard is held.
        lock.lock_owned().await
    }

    fn evict_idle(&self, keep: i64) {
        let mut touched: Vec<(i64, u64)> = self
            .entries
            .iter()
            .filter(|kv| *kv.key() != keep)
            .map(|kv| (*kv.key(), kv.value().last_touched))
            .collect();
        touched.sort_by_key(|&(_, t)| t);
        let evict_count = touched.len() / 2;
        for (user_id, _) in touched.into_iter().take(evict_count) {
            self.entries.remove_if(&user_id, |_, e| Arc::strong_count(&e.lock) == 1);
        }
    }
}

impl Default for UserLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_user_serializes() {
        let locks = Arc::new(UserLocks::new());
        let l1 = locks.clone();
        let g1 = l1.acquire(1).await;

        let l2 = locks.clone();
        let handle = tokio::spawn(async move {
            let _g2 = l2.acquire(1).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(g1);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn different_users_do_not_block_each_other() {
        let locks = UserLocks::new();
        let _g1 = locks.acquire(1).await;
        let g2 = tokio::time::timeout(std::time::Duration::from_millis(50), locks.acquire(2)).await;
        assert!(g2.is_ok());
    }
}
