//! Throttling detection and attempt tracking.
//!
//! - [`RateLimitClassifier`]: recognises provider throttling and produces
//!   recovery guidance
//! - [`ThrottleTracker`]: remembers throttled operations until their
//!   estimated reset
//! - [`AttemptLedger`]: durable, time-windowed attempt counts per identifier

pub mod classifier;
pub mod ledger;
pub mod throttle;

pub use classifier::{
    RateLimitClassifier, RateLimitVerdict, allows_alternate, classify_message,
    classify_message_for, is_throttling_message, suggestions_for,
};
pub use ledger::AttemptLedger;
pub use throttle::ThrottleTracker;
