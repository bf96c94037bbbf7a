//! C8 AlertThrottler (`spec.md` §4.8): decides whether to send an alert for a
//! given (symbol, side, price), and owns the write-before-send state update so
//! two concurrent scheduler ticks can never double-send.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::trading::locks::ExpiringLockSet;
use crate::domain::trading::types::{AlertState, OrderSide};

pub struct ThrottleDecision {
    pub should_send: bool,
    pub reason: &'static str,
}

/// Owns in-process alert state plus the 2 s send-lock keyed by (symbol, side).
/// Exclusive owner is `SignalMonitor`; no other component mutates this state
/// (`spec.md` §5).
pub struct AlertThrottler {
    state: Arc<Mutex<HashMap<(String, OrderSide), AlertState>>>,
    send_locks: ExpiringLockSet<(String, OrderSide)>,
    cooldown_ms: i64,
}

impl AlertThrottler {
    pub fn new(cooldown_ms: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            send_locks: crate::domain::trading::locks::alert_send_lock_set(),
            cooldown_ms,
        }
    }

    pub fn with_default_cooldown() -> Self {
        Self::new(5 * 60 * 1000)
    }

    /// Acquires the 2 s send-lock for (symbol, side). Callers must hold this
    /// across both the throttle decision and the state write (`spec.md` §4.8,
    /// invariant 6 in §3: "Alert state is write-before-send").
    pub async fn try_acquire_send_lock(&self, symbol: &str, side: OrderSide) -> bool {
        self.send_locks
            .try_acquire((symbol.to_string(), side))
            .await
    }

    /// Evaluates whether to send, given the caller already holds the send-lock.
    /// `spec.md` §4.8 rules, evaluated in order:
    /// - opposite side more recent -> allow immediately
    /// - no prior alert for (symbol, side) -> allow
    /// - same side, trade disabled -> require price-change only
    /// - same side, trade enabled -> cooldown elapsed OR price-change
    pub async fn should_send(
        &self,
        symbol: &str,
        side: OrderSide,
        current_price: Decimal,
        trade_enabled: bool,
        min_price_change_pct: Decimal,
        now_ms: i64,
    ) -> ThrottleDecision {
        let state = self.state.lock().await;

        let opposite_more_recent = state
            .get(&(symbol.to_string(), side.opposite()))
            .zip(state.get(&(symbol.to_string(), side)))
            .map(|(opp, same)| opp.last_alert_time > same.last_alert_time)
            .unwrap_or_else(|| state.contains_key(&(symbol.to_string(), side.opposite())));

        if opposite_more_recent {
            return ThrottleDecision {
                should_send: true,
                reason: "direction_change",
            };
        }

        let Some(prior) = state.get(&(symbol.to_string(), side)) else {
            return ThrottleDecision {
                should_send: true,
                reason: "first_alert",
            };
        };

        let price_change_pct = if prior.last_alert_price.is_zero() {
            Decimal::MAX
        } else {
            ((current_price - prior.last_alert_price) / prior.last_alert_price).abs()
                * Decimal::from(100)
        };
        let price_changed_enough = price_change_pct >= min_price_change_pct;

        if !trade_enabled {
            return ThrottleDecision {
                should_send: price_changed_enough,
                reason: "trade_disabled_price_change_only",
            };
        }

        let cooldown_elapsed = now_ms - prior.last_alert_time >= self.cooldown_ms;
        ThrottleDecision {
            should_send: cooldown_elapsed || price_changed_enough,
            reason: "trade_enabled_cooldown_or_price_change",
        }
    }

    /// Commits the new alert state. Must be called, under the same send-lock
    /// hold, before the outbound alert dispatch (write-before-send).
    pub async fn commit(&self, symbol: &str, side: OrderSide, price: Decimal, now_ms: i64) {
        let mut state = self.state.lock().await;
        state.insert(
            (symbol.to_string(), side),
            AlertState {
                last_alert_time: now_ms,
                last_alert_price: price,
            },
        );
    }

    pub async fn release_send_lock(&self, symbol: &str, side: OrderSide) {
        self.send_locks
            .release(&(symbol.to_string(), side))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn first_alert_always_allowed() {
        let throttler = AlertThrottler::with_default_cooldown();
        let decision = throttler
            .should_send("ADA_USDT", OrderSide::Buy, dec!(0.5), true, dec!(1.0), 0)
            .await;
        assert!(decision.should_send);
    }

    #[tokio::test]
    async fn same_side_trade_disabled_requires_price_change() {
        let throttler = AlertThrottler::with_default_cooldown();
        throttler.commit("ADA_USDT", OrderSide::Buy, dec!(0.500), 0).await;

        let blocked = throttler
            .should_send("ADA_USDT", OrderSide::Buy, dec!(0.503), false, dec!(1.0), 1_000)
            .await;
        assert!(!blocked.should_send);

        let allowed = throttler
            .should_send("ADA_USDT", OrderSide::Buy, dec!(0.520), false, dec!(1.0), 1_000)
            .await;
        assert!(allowed.should_send);
    }

    #[tokio::test]
    async fn same_side_trade_enabled_allows_after_cooldown_even_without_price_change() {
        let throttler = AlertThrottler::new(5_000);
        throttler.commit("ADA_USDT", OrderSide::Buy, dec!(0.500), 0).await;

        let too_soon = throttler
            .should_send("ADA_USDT", OrderSide::Buy, dec!(0.500), true, dec!(1.0), 1_000)
            .await;
        assert!(!too_soon.should_send);

        let after_cooldown = throttler
            .should_send("ADA_USDT", OrderSide::Buy, dec!(0.500), true, dec!(1.0), 6_000)
            .await;
        assert!(after_cooldown.should_send);
    }

    #[tokio::test]
    async fn opposite_side_never_throttled() {
        let throttler = AlertThrottler::with_default_cooldown();
        throttler.commit("ADA_USDT", OrderSide::Buy, dec!(0.500), 0).await;
        let decision = throttler
            .should_send("ADA_USDT", OrderSide::Sell, dec!(0.500), true, dec!(1.0), 100)
            .await;
        assert!(decision.should_send);
    }

    #[tokio::test]
    async fn send_lock_serializes_concurrent_decisions() {
        let throttler = AlertThrottler::with_default_cooldown();
        assert!(
            throttler
                .try_acquire_send_lock("ADA_USDT", OrderSide::Buy)
                .await
        );
        assert!(
            !throttler
                .try_acquire_send_lock("ADA_USDT", OrderSide::Buy)
                .await
        );
    }
}
