pub mod throttler;

pub use throttler::{AlertThrottler, ThrottleDecision};
