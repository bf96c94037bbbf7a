//! In-process expiring lock sets shared by the signal-to-order pipeline
//! (`spec.md` §3, §5). Each lock set is exclusively owned by one component and
//! reset on restart; the durable invariants they protect (open-order cap,
//! recent-order cooldown) are re-derived from `OrderStore` instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Generic TTL-expiring lock set keyed by an arbitrary hashable key. An entry is
/// "held" until its expiry instant passes; acquiring re-arms the expiry.
pub struct ExpiringLockSet<K> {
    entries: Arc<RwLock<HashMap<K, Instant>>>,
    ttl: Duration,
}

impl<K> ExpiringLockSet<K>
where
    K: std::hash::Hash + Eq + Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// True if the key is currently locked (not yet expired).
    pub async fn is_locked(&self, key: &K) -> bool {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(expiry) => Instant::now() < *expiry,
            None => false,
        }
    }

    /// Attempts to acquire the lock for `key`. Returns `true` if acquired (it was
    /// free or had already expired), `false` if another holder still owns it.
    pub async fn try_acquire(&self, key: K) -> bool {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let free = match entries.get(&key) {
            Some(expiry) => now >= *expiry,
            None => true,
        };
        if free {
            entries.insert(key, now + self.ttl);
        }
        free
    }

    pub async fn release(&self, key: &K) {
        self.entries.write().await.remove(key);
    }
}

/// Order-creation lock per symbol, default 10 s expiry (G1 in `spec.md` §4.7).
pub fn creation_lock_set() -> ExpiringLockSet<String> {
    ExpiringLockSet::new(Duration::from_secs(10))
}

/// Alert-sending lock per (symbol, side), 2 s expiry (`spec.md` §4.8, §5).
pub fn alert_send_lock_set() -> ExpiringLockSet<(String, super::types::OrderSide)> {
    ExpiringLockSet::new(Duration::from_secs(2))
}

/// Margin-error-609 lockout per symbol, >=30 minute expiry (`spec.md` §3, §4.6
/// step 8). A symbol inside its lockout window is forced to SPOT regardless of
/// `trade_on_margin`.
pub fn margin_lockout_609_set() -> ExpiringLockSet<String> {
    ExpiringLockSet::new(Duration::from_secs(30 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_acquire_blocks_concurrent_holder() {
        let locks = ExpiringLockSet::<String>::new(Duration::from_millis(50));
        assert!(locks.try_acquire("ADA_USDT".to_string()).await);
        assert!(!locks.try_acquire("ADA_USDT".to_string()).await);
    }

    #[tokio::test]
    async fn lock_expires_after_ttl() {
        let locks = ExpiringLockSet::<String>::new(Duration::from_millis(20));
        assert!(locks.try_acquire("ADA_USDT".to_string()).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!locks.is_locked(&"ADA_USDT".to_string()).await);
        assert!(locks.try_acquire("ADA_USDT".to_string()).await);
    }

    #[tokio::test]
    async fn release_frees_the_key_immediately() {
        let locks = ExpiringLockSet::<String>::new(Duration::from_secs(30));
        locks.try_acquire("SOL_USDT".to_string()).await;
        locks.release(&"SOL_USDT".to_string()).await;
        assert!(!locks.is_locked(&"SOL_USDT".to_string()).await);
    }
}
