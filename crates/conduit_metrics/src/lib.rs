//! Conduit Metrics - Session activity counters
//!
//! Named counters that the script bridge bumps as it executes scripts,
//! drains continuations and converts values. Everything vanishes when the
//! `metrics` feature is disabled.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use conduit_metrics::Counter;
//!
//! let mut counter = Counter::new();
//! conduit_metrics::metrics! {
//!     counter.increment("executions", 1);
//! }
//! println!("executions: {}", counter.get("executions"));
//! ```

#[cfg(feature = "metrics")]
mod counter;

#[cfg(feature = "metrics")]
pub use counter::Counter;

// ============================================================================
// Macros for conditional compilation
// ============================================================================

/// Execute code only when metrics are enabled
///
/// The `cfg` is evaluated in the calling crate, so callers forward their own
/// `metrics` feature to `conduit_metrics/metrics`.
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> { Vec::new() }
}
