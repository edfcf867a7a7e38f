//! Segment routing fabric controller core.
//!
//! This crate turns cluster-wide host, route, device and mastership events
//! into per-switch bridging and routing entries. Every controller instance
//! runs the same code against the same replicated inputs; the
//! [`arbiter::OwnershipArbiter`] makes sure exactly one of them programs each
//! dual-homed switch pair.
//!
//! # Architecture
//!
//! ```text
//!  HostEvent ──┐                 ┌──> HostHandler ──┐
//!  RouteEvent ─┼──> SrController ┤                  ├──> RulePopulator ──> FlowProgrammer
//!  DeviceEvent ┤    (KeyedExecutor)──> RouteHandler ─┘        │
//!  Mastership ─┘         │                                    └──> DeviceConfiguration
//!                        └──> OwnershipArbiter (cache invalidation)         (add/removeSubnet)
//! ```
//!
//! # Key Components
//!
//! - [`arbiter`]: per-device "do I program this switch" decision
//! - [`interface`]: port VLAN policies and host VLAN admission
//! - [`populator`]: core-owned routing, bridging and subnet tables
//! - [`host`]: host location handling with pair-link redirection
//! - [`route`]: route next-hop projection with ECMP and failover
//! - [`daemon`]: the event dispatcher tying everything together
//! - [`services`] / [`memory`]: external collaborators and in-memory stand-ins

pub mod arbiter;
pub mod config;
pub mod daemon;
pub mod error;
pub mod host;
pub mod interface;
pub mod memory;
pub mod populator;
pub mod route;
pub mod services;

pub use error::{ConfigError, ControllerError, Result};
