//! # Usage Meter
//!
//! Counts how often each class of expensive operation ran and how often a
//! cache hit avoided it, over a rolling daily window.
//!
//! - Per-metric call and saved-call counters
//! - Lazy reset: the first access after the window elapses zeroes the counters
//! - Threshold warnings and advisory suggestions (never blocking)
//! - Optional persistence of the counters through a
//!   [`PersistentTier`](crate::cache::PersistentTier)
//!
//! ## Example
//!
//! ```rust
//! use gencache::usage::{UsageConfig, UsageMeter};
//!
//! let meter = UsageMeter::new(UsageConfig::default().with_threshold("generation-calls", 2));
//!
//! meter.track_call_once("generation-calls");
//! meter.track_saved("generation-calls");
//! assert!(!meter.should_warn());
//!
//! meter.track_call("generation-calls", 2);
//! assert!(meter.should_warn());
//! ```

pub mod config;
pub mod meter;

pub use config::UsageConfig;
pub use meter::{UsageMeter, UsageSnapshot};
