//! Per-symbol leverage-learning cache used by `ProtectiveOrderEngine`'s 306
//! recovery ladder (`spec.md` §4.6 step 9): remembers the leverage multiple
//! that last worked for a symbol so future entries start there instead of
//! re-discovering it by trial and error every time.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// `spec.md` §2.1 (SPEC_FULL supplement): default ladder when a symbol has no
/// recorded history, highest leverage first.
pub const DEFAULT_LEVERAGE_LADDER: &[u32] = &[10, 5, 2, 1];

pub struct LeverageCache {
    working_leverage: Arc<RwLock<HashMap<String, u32>>>,
}

impl Default for LeverageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LeverageCache {
    pub fn new() -> Self {
        Self {
            working_leverage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The ladder to walk for `symbol`, starting from its last known-working
    /// leverage (if any) and falling through the default ladder's remaining
    /// lower multiples down to 1x.
    pub async fn ladder_for(&self, symbol: &str) -> Vec<u32> {
        let remembered = self.working_leverage.read().await.get(symbol).copied();
        match remembered {
            Some(start) => DEFAULT_LEVERAGE_LADDER
                .iter()
                .copied()
                .filter(|&lev| lev <= start)
                .collect(),
            None => DEFAULT_LEVERAGE_LADDER.to_vec(),
        }
    }

    /// Records the leverage that succeeded, so the next entry for this symbol
    /// starts there rather than at the top of the default ladder.
    pub async fn record_working_leverage(&self, symbol: &str, leverage: u32) {
        self.working_leverage
            .write()
            .await
            .insert(symbol.to_string(), leverage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseen_symbol_uses_full_default_ladder() {
        let cache = LeverageCache::new();
        assert_eq!(cache.ladder_for("ADA_USDT").await, vec![10, 5, 2, 1]);
    }

    #[tokio::test]
    async fn remembered_leverage_trims_ladder_to_last_known_start() {
        let cache = LeverageCache::new();
        cache.record_working_leverage("ADA_USDT", 5).await;
        assert_eq!(cache.ladder_for("ADA_USDT").await, vec![5, 2, 1]);
    }
}
