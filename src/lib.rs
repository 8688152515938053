//! # repair-dispatch
//!
//! Order assignment and dispatch for an appliance-repair marketplace.
//!
//! New orders are offered to one master at a time, best-scored first. Each
//! offer has an acceptance window; a rejection or a lapsed window cascades
//! the order to the next candidate until someone accepts, nobody eligible
//! is left, or the attempt limit cancels the order. A reconciliation sweep
//! recovers offers whose in-process timers were lost.

pub mod config;
pub mod db;
pub mod disclosure;
pub mod engine;
pub mod error;
pub mod geo;
pub mod model;
pub mod notify;
pub mod ranking;
pub mod scoring;
pub mod store;
pub mod telemetry;
