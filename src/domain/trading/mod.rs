//! Core trading domain entities and value objects: orders, open lots,
//! watchlist configuration, and in-memory signal/alert state.
pub mod locks;
pub mod types;
