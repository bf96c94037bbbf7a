pub mod core;
pub mod exchange;
pub mod notifier;
pub mod observability;
pub mod persistence;
pub mod price_feed;
