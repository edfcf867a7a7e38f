//! Forwarding entry types produced by the handlers.

use serde::{Deserialize, Serialize};
use sr_types::{DeviceId, IpPrefix, MacAddress, PortNumber, VlanId};
use std::fmt;

/// Key of a bridging entry: the VLAN is the one installed on the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BridgingKey {
    pub device_id: DeviceId,
    pub mac: MacAddress,
    pub vlan: VlanId,
}

impl fmt::Display for BridgingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.device_id, self.mac, self.vlan)
    }
}

/// L2 forwarding entry for a host MAC on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgingEntry {
    pub device_id: DeviceId,
    pub mac: MacAddress,
    pub vlan: VlanId,
    pub port: PortNumber,
    /// Strip the VLAN tag on egress.
    pub pop_vlan: bool,
}

impl BridgingEntry {
    pub fn key(&self) -> BridgingKey {
        BridgingKey {
            device_id: self.device_id.clone(),
            mac: self.mac,
            vlan: self.vlan,
        }
    }
}

/// Key of a routing entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutingKey {
    pub device_id: DeviceId,
    pub prefix: IpPrefix,
}

impl RoutingKey {
    pub fn new(device_id: DeviceId, prefix: IpPrefix) -> Self {
        Self { device_id, prefix }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device_id, self.prefix)
    }
}

/// One member of a next-hop group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NextHopAction {
    pub port: PortNumber,
    pub mac: MacAddress,
    pub vlan: Option<VlanId>,
}

/// Where a routing entry sends matching traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Egress {
    Port(PortNumber),
    /// ECMP group, members sorted.
    Group(Vec<NextHopAction>),
}

/// L3 forwarding entry for a prefix on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub device_id: DeviceId,
    pub prefix: IpPrefix,
    pub next_hop_mac: MacAddress,
    pub next_hop_vlan: Option<VlanId>,
    pub egress: Egress,
    pub pop_vlan: bool,
}

impl RoutingEntry {
    /// Entry forwarding straight out of one port.
    pub fn direct(
        device_id: DeviceId,
        prefix: IpPrefix,
        next_hop_mac: MacAddress,
        next_hop_vlan: Option<VlanId>,
        port: PortNumber,
        pop_vlan: bool,
    ) -> Self {
        Self {
            device_id,
            prefix,
            next_hop_mac,
            next_hop_vlan,
            egress: Egress::Port(port),
            pop_vlan,
        }
    }

    /// Entry for a set of next-hop actions; a single action collapses to a
    /// port egress. Returns `None` for an empty set.
    pub fn from_actions(
        device_id: DeviceId,
        prefix: IpPrefix,
        actions: impl IntoIterator<Item = NextHopAction>,
    ) -> Option<Self> {
        let mut actions: Vec<NextHopAction> = actions.into_iter().collect();
        actions.sort();
        actions.dedup();
        let first = actions.first()?.clone();
        let egress = if actions.len() == 1 {
            Egress::Port(first.port)
        } else {
            Egress::Group(actions)
        };
        Some(Self {
            device_id,
            prefix,
            next_hop_mac: first.mac,
            next_hop_vlan: first.vlan,
            egress,
            pop_vlan: first.vlan.is_none(),
        })
    }

    pub fn key(&self) -> RoutingKey {
        RoutingKey::new(self.device_id.clone(), self.prefix)
    }

    /// Output port for a single-port entry.
    pub fn port(&self) -> Option<PortNumber> {
        match &self.egress {
            Egress::Port(port) => Some(*port),
            Egress::Group(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_actions_collapses_single_member() {
        let device: DeviceId = "of:0000000000000001".parse().unwrap();
        let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
        let mac: MacAddress = "00:00:00:00:00:01".parse().unwrap();
        let action = NextHopAction {
            port: PortNumber::new(1),
            mac,
            vlan: None,
        };

        let entry =
            RoutingEntry::from_actions(device.clone(), prefix, [action.clone(), action]).unwrap();
        assert_eq!(entry.port(), Some(PortNumber::new(1)));
        assert!(entry.pop_vlan);
        assert!(RoutingEntry::from_actions(device, prefix, []).is_none());
    }

    #[test]
    fn test_from_actions_groups_sorted() {
        let device: DeviceId = "of:0000000000000001".parse().unwrap();
        let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
        let a = NextHopAction {
            port: PortNumber::new(2),
            mac: "00:00:00:00:00:02".parse().unwrap(),
            vlan: Some(VlanId::new(20).unwrap()),
        };
        let b = NextHopAction {
            port: PortNumber::new(1),
            mac: "00:00:00:00:00:01".parse().unwrap(),
            vlan: Some(VlanId::new(10).unwrap()),
        };

        let entry = RoutingEntry::from_actions(device, prefix, [a.clone(), b.clone()]).unwrap();
        assert_eq!(entry.egress, Egress::Group(vec![b.clone(), a]));
        assert_eq!(entry.next_hop_mac, b.mac);
        assert_eq!(entry.port(), None);
    }
}
