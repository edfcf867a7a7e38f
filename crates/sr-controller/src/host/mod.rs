//! Host Location Handler.
//!
//! Turns host attachment changes into bridging and routing entries,
//! including the pair-link redirects that keep a dual-homed host reachable
//! while one of its leaves is down.

mod handler;
mod probe;
mod types;

pub use handler::{HostHandler, HostHandlerConfig, HostHandlerStats, HostHandlerStatsSnapshot};
pub use types::{Host, HostEvent, HostId, ProbeMode};
