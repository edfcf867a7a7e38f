//! Rule Populator and the core-owned forwarding tables.

mod rules;
mod tables;
mod types;

pub use rules::{PopulatorStats, PopulatorStatsSnapshot, RulePopulator};
pub use tables::{BridgingTable, RoutingTable, SubnetTable, TableSnapshot};
pub use types::{BridgingEntry, BridgingKey, Egress, NextHopAction, RoutingEntry, RoutingKey};
