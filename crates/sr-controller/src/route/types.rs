//! Route and next-hop types.

use crate::host::HostId;
use serde::{Deserialize, Serialize};
use sr_types::{IpAddress, IpPrefix, MacAddress, VlanId};

/// A route next hop resolved to the host that answers for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolvedRoute {
    pub prefix: IpPrefix,
    pub next_hop: IpAddress,
    pub next_hop_mac: MacAddress,
    #[serde(default)]
    pub next_hop_vlan: Option<VlanId>,
}

impl ResolvedRoute {
    pub fn new(
        prefix: IpPrefix,
        next_hop: IpAddress,
        next_hop_mac: MacAddress,
        next_hop_vlan: Option<VlanId>,
    ) -> Self {
        Self {
            prefix,
            next_hop,
            next_hop_mac,
            next_hop_vlan,
        }
    }

    /// Host directory key of the next hop.
    pub fn host_id(&self) -> HostId {
        HostId::new(self.next_hop_mac, self.next_hop_vlan)
    }
}

/// A RIB entry: one prefix and all its resolved alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub prefix: IpPrefix,
    #[serde(default)]
    pub next_hops: Vec<ResolvedRoute>,
}

impl RouteInfo {
    pub fn new(prefix: IpPrefix, next_hops: Vec<ResolvedRoute>) -> Self {
        Self { prefix, next_hops }
    }
}

/// RIB change notification.
///
/// `next_hops` always carries the complete alternative set after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteEvent {
    Added {
        prefix: IpPrefix,
        next_hops: Vec<ResolvedRoute>,
    },
    /// Best route changed.
    Updated {
        prefix: IpPrefix,
        next_hops: Vec<ResolvedRoute>,
        #[serde(default)]
        prev_next_hops: Vec<ResolvedRoute>,
    },
    AlternativesChanged {
        prefix: IpPrefix,
        next_hops: Vec<ResolvedRoute>,
        #[serde(default)]
        prev_next_hops: Vec<ResolvedRoute>,
    },
    Removed {
        prefix: IpPrefix,
        #[serde(default)]
        next_hops: Vec<ResolvedRoute>,
    },
}

impl RouteEvent {
    pub fn prefix(&self) -> IpPrefix {
        match self {
            RouteEvent::Added { prefix, .. }
            | RouteEvent::Updated { prefix, .. }
            | RouteEvent::AlternativesChanged { prefix, .. }
            | RouteEvent::Removed { prefix, .. } => *prefix,
        }
    }

    pub fn next_hops(&self) -> &[ResolvedRoute] {
        match self {
            RouteEvent::Added { next_hops, .. }
            | RouteEvent::Updated { next_hops, .. }
            | RouteEvent::AlternativesChanged { next_hops, .. }
            | RouteEvent::Removed { next_hops, .. } => next_hops,
        }
    }
}
