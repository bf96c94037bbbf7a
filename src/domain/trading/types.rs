use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopLimit,
    TakeProfitLimit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
            OrderType::TakeProfitLimit => write!(f, "TAKE_PROFIT_LIMIT"),
        }
    }
}

/// `null` for entry orders; `STOP_LOSS`/`TAKE_PROFIT` for protective children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRole {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for OrderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderRole::StopLoss => write!(f, "STOP_LOSS"),
            OrderRole::TakeProfit => write!(f, "TAKE_PROFIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Active,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::Active | OrderStatus::PartiallyFilled
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::Active => "ACTIVE",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        };
        write!(f, "{}", s)
    }
}

/// Whether an order was placed automatically by the control plane or by a manual
/// operator action (dashboard retry, inline button). Propagates to logs and to
/// signal-event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSource {
    Auto,
    Manual,
}

impl fmt::Display for OrderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSource::Auto => write!(f, "auto"),
            OrderSource::Manual => write!(f, "manual"),
        }
    }
}

/// The atomic unit tracked by the `OrderStore` (C4). Mirrors `spec.md` §3 exactly;
/// every numeric field is a `Decimal` so FIFO lot math never touches a binary float.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub exchange_order_id: String,
    pub client_oid: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub order_role: Option<OrderRole>,
    pub status: OrderStatus,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub quantity: Decimal,
    pub cumulative_quantity: Decimal,
    pub cumulative_value: Decimal,
    pub parent_order_id: Option<String>,
    pub oco_group_id: Option<String>,
    pub source: OrderSource,
    pub exchange_create_time: i64,
    pub exchange_update_time: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    pub fn is_entry(&self) -> bool {
        self.order_role.is_none()
    }

    pub fn is_protective(&self) -> bool {
        self.order_role.is_some()
    }

    /// Invariant 4 from `spec.md` §3: `cumulative_quantity <= quantity` always.
    pub fn cumulative_quantity_is_valid(&self) -> bool {
        self.cumulative_quantity <= self.quantity
    }
}

/// Remaining unclosed quantity from a filled BUY, after applying later SELL fills
/// FIFO. Derived, never persisted (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenLot {
    pub symbol: String,
    pub buy_order_id: String,
    pub buy_time: i64,
    pub buy_price: Decimal,
    pub lot_qty: Decimal,
    pub parent_order_id: Option<String>,
    pub oco_group_id: Option<String>,
    /// Synthesized from balance + weighted-average historical buys (or, failing
    /// that, the current market price) rather than a single traceable BUY order.
    pub is_virtual: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SltpMode {
    Conservative,
    Aggressive,
}

impl SltpMode {
    /// Strategy-default SL/TP percentage pair when the watchlist row leaves the
    /// field null (`spec.md` §4.6 step 2).
    pub fn default_percentages(self) -> (Decimal, Decimal) {
        match self {
            SltpMode::Conservative => (Decimal::new(3, 0), Decimal::new(3, 0)),
            SltpMode::Aggressive => (Decimal::new(2, 0), Decimal::new(2, 0)),
        }
    }
}

/// Per-symbol configuration, mutated by the dashboard and read fresh by
/// `SignalMonitor` on each evaluation (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub symbol: String,
    pub alert_enabled: bool,
    pub trade_enabled: bool,
    pub trade_amount_usd: Decimal,
    pub trade_on_margin: bool,
    pub sl_tp_mode: SltpMode,
    pub sl_percentage: Option<Decimal>,
    pub tp_percentage: Option<Decimal>,
    pub min_price_change_pct: Decimal,
    pub skip_sl_tp_reminder: bool,
    pub buy_target: Option<Decimal>,
    pub purchase_price: Option<Decimal>,
    pub is_deleted: bool,
}

impl WatchlistItem {
    pub fn resolved_percentages(&self) -> (Decimal, Decimal) {
        let (sl_default, tp_default) = self.sl_tp_mode.default_percentages();
        (
            self.sl_percentage.unwrap_or(sl_default),
            self.tp_percentage.unwrap_or(tp_default),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Wait,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Wait => write!(f, "WAIT"),
        }
    }
}

/// In-memory per-symbol signal tracking (`spec.md` §3). `last_order_price` is
/// preserved across transitions so `GuardrailEvaluator`'s price-change gate (G5)
/// can compare against it even after several WAIT ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalState {
    pub state: Signal,
    pub last_order_price: Option<Decimal>,
    pub orders_count: u64,
    pub timestamp: i64,
}

impl SignalState {
    pub fn initial() -> Self {
        Self {
            state: Signal::Wait,
            last_order_price: None,
            orders_count: 0,
            timestamp: 0,
        }
    }
}

/// In-memory per-(symbol, side) alert tracking (`spec.md` §3), consulted by
/// `AlertThrottler`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertState {
    pub last_alert_time: i64,
    pub last_alert_price: Decimal,
}

// ===== Symbol normalization =====

/// Quote currencies treated as equivalent for lot-matching and exposure
/// aggregation, ordered longest-first so `USDT` is preferred over `USD` when a
/// symbol could be split either way (`spec.md` §3, §9).
const EQUIVALENT_QUOTES: &[&str] = &["USDT", "USD"];

/// Splits a canonical `BASE_QUOTE` symbol (e.g. `ADA_USDT`) into its base
/// currency. The base is the exposure key everywhere in this crate; `USD` and
/// `USDT` quotes collapse onto the same base (`spec.md` §3, §9: "Symbol
/// equivalence is a first-class helper, not ad-hoc").
pub fn base_of(symbol: &str) -> &str {
    match symbol.split_once('_') {
        Some((base, _quote)) => base,
        None => symbol,
    }
}

pub fn quote_of(symbol: &str) -> Option<&str> {
    symbol.split_once('_').map(|(_, quote)| quote)
}

/// True when two symbols share a base currency, treating `USD`/`USDT` quotes as
/// the same equivalence class.
pub fn same_base(a: &str, b: &str) -> bool {
    base_of(a) == base_of(b)
}

/// The `USD` and `USDT` spellings of a base currency, in priority order
/// (`USDT` first). Used wherever a query must cover both variants.
pub fn quote_variants(base: &str) -> [String; 2] {
    [
        format!("{base}_{}", EQUIVALENT_QUOTES[0]),
        format!("{base}_{}", EQUIVALENT_QUOTES[1]),
    ]
}

pub fn canonical_symbol(base: &str, quote: &str) -> String {
    format!("{base}_{quote}")
}
