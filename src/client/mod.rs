//! Observer-Side Reconciliation
//!
//! Display logic for connected clients. Everything here is advisory: the
//! tracker turns server messages into a smooth local phase/multiplier
//! estimate, and none of its output ever decides a settlement. A cashout
//! request carries only a bet id.

pub mod reconcile;

pub use reconcile::{RoundTracker, RoundView};
