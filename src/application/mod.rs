pub mod audit_log;
pub mod order_store;
pub mod settings_store;
pub mod watchlist_store;

pub mod exchange_sync;
pub mod expected_tp_engine;
pub mod leverage_cache;
pub mod protective_order_engine;
pub mod signal_monitor;
pub mod sltp_checker;
pub mod system;
