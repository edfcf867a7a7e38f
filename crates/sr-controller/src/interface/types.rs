//! Interface and VLAN policy types.

use serde::{Deserialize, Serialize};
use sr_types::{ConnectPoint, IpAddress, IpPrefix, VlanId};
use std::collections::BTreeSet;

/// VLAN admission policy of a port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VlanPolicy {
    /// Access port carrying untagged traffic into the given VLAN.
    Untagged(VlanId),
    /// Trunk port carrying the tagged set, plus an optional native VLAN for
    /// untagged frames.
    Tagged {
        tagged: BTreeSet<VlanId>,
        native: Option<VlanId>,
    },
    #[default]
    Unconfigured,
}

impl VlanPolicy {
    pub fn untagged(vlan: VlanId) -> Self {
        VlanPolicy::Untagged(vlan)
    }

    pub fn tagged(tagged: impl IntoIterator<Item = VlanId>, native: Option<VlanId>) -> Self {
        VlanPolicy::Tagged {
            tagged: tagged.into_iter().collect(),
            native,
        }
    }

    /// VLAN assigned to untagged frames on this port.
    pub fn internal_vlan(&self) -> Option<VlanId> {
        match self {
            VlanPolicy::Untagged(vlan) => Some(*vlan),
            VlanPolicy::Tagged { native, .. } => *native,
            VlanPolicy::Unconfigured => None,
        }
    }

    pub fn tagged_vlans(&self) -> Option<&BTreeSet<VlanId>> {
        match self {
            VlanPolicy::Tagged { tagged, .. } => Some(tagged),
            _ => None,
        }
    }

    /// Returns true if `vlan` is carried on this port in any form.
    pub fn carries(&self, vlan: VlanId) -> bool {
        self.internal_vlan() == Some(vlan)
            || self.tagged_vlans().is_some_and(|tagged| tagged.contains(&vlan))
    }
}

/// A configured port: connect point, VLAN policy and locally routed subnets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    #[serde(default)]
    pub name: String,
    pub connect_point: ConnectPoint,
    #[serde(default)]
    pub vlan: VlanPolicy,
    #[serde(default)]
    pub subnets: Vec<IpPrefix>,
}

impl Interface {
    pub fn new(connect_point: ConnectPoint, vlan: VlanPolicy) -> Self {
        Self {
            name: String::new(),
            connect_point,
            vlan,
            subnets: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_subnet(mut self, subnet: IpPrefix) -> Self {
        self.subnets.push(subnet);
        self
    }

    /// Returns true if one of this interface's subnets contains `ip`.
    ///
    /// A default (`/0`) subnet never matches.
    pub fn contains_ip(&self, ip: &IpAddress) -> bool {
        self.subnets
            .iter()
            .any(|subnet| !subnet.is_default() && subnet.contains(ip))
    }
}
