//! Boundary stub for signal derivation. `spec.md` §4.9 places the exact
//! indicator math on the feed side of the boundary ("the core only consumes
//! the boolean outputs"); `SignalMonitor` only needs *some* `SignalClassifier`
//! to turn a `PriceWithIndicators` reading into `BUY`/`SELL`/`WAIT`.

use crate::domain::trading::types::{Signal, WatchlistItem};
use crate::infrastructure::price_feed::client::PriceWithIndicators;

pub trait SignalClassifier: Send + Sync {
    fn classify(&self, indicators: &PriceWithIndicators, watchlist_item: &WatchlistItem) -> Signal;
}

/// Simple trend/momentum heuristic: price above both moving averages with
/// room left on RSI and above-average volume reads as BUY; price below the
/// short moving average with RSI cooling off reads as SELL.
pub struct HeuristicSignalClassifier;

impl SignalClassifier for HeuristicSignalClassifier {
    fn classify(&self, indicators: &PriceWithIndicators, _watchlist_item: &WatchlistItem) -> Signal {
        use rust_decimal_macros::dec;

        let above_trend = indicators.price > indicators.ma50 && indicators.price > indicators.ma200;
        let volume_confirms = indicators.current_volume > indicators.avg_volume;
        let rsi_has_room = indicators.rsi < dec!(70);

        if above_trend && volume_confirms && rsi_has_room {
            return Signal::Buy;
        }

        let below_short_trend = indicators.price < indicators.ma50;
        let rsi_cooling = indicators.rsi > dec!(30) && indicators.rsi < dec!(50);
        if below_short_trend && rsi_cooling {
            return Signal::Sell;
        }

        Signal::Wait
    }
}
