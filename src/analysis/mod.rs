//! Analysis modules.
//!
//! Turns validated job records into the reservation usage table.

pub mod aggregator;

pub use aggregator::*;
