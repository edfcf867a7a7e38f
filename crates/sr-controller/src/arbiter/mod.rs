//! Ownership Arbiter.
//!
//! Decides per device whether the local controller instance programs it.
//! A dual-homed pair is owned by one node: the smallest, under a
//! cluster-wide [`NodeOrder`], of the masters of the two devices.

mod order;
mod ownership;

pub use order::{LexicographicOrder, NodeOrder};
pub use ownership::{ArbiterStats, ArbiterStatsSnapshot, OwnershipArbiter};
