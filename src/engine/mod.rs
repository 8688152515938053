//! Dispatch engine: assignment lifecycle, expiry timers, reconciliation.

pub mod lifecycle;
pub mod locks;
pub mod sweep;
pub mod timers;

pub use lifecycle::{DispatchOutcome, Dispatcher, SkipReason};
pub use sweep::SweepLoop;
