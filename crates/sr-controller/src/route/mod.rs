//! Route/Next-Hop Handler.
//!
//! Projects RIB routes onto per-device routing entries: each next hop is
//! resolved through the host directory to the leaves it is attached to,
//! filtered by ownership, and grouped per device for ECMP. Entries for next
//! hops that merely left an ECMP set are kept until the set empties.

mod handler;
mod resolve;
mod types;

pub use handler::{RouteHandler, RouteHandlerStats, RouteHandlerStatsSnapshot};
pub use types::{ResolvedRoute, RouteEvent, RouteInfo};
