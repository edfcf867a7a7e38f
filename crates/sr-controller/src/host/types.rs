//! Host identity, attributes and events.

use serde::{Deserialize, Serialize};
use sr_types::{ConnectPoint, DeviceId, IpAddress, MacAddress, VlanId};
use std::collections::BTreeSet;
use std::fmt;

/// Host identity: MAC plus VLAN (`None` for untagged hosts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId {
    pub mac: MacAddress,
    #[serde(default)]
    pub vlan: Option<VlanId>,
}

impl HostId {
    pub fn new(mac: MacAddress, vlan: Option<VlanId>) -> Self {
        Self { mac, vlan }
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vlan {
            Some(vlan) => write!(f, "{}/{}", self.mac, vlan),
            None => write!(f, "{}/None", self.mac),
        }
    }
}

/// A host as known to the host directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub mac: MacAddress,
    #[serde(default)]
    pub vlan: Option<VlanId>,
    #[serde(default)]
    pub locations: BTreeSet<ConnectPoint>,
    #[serde(default)]
    pub ips: BTreeSet<IpAddress>,
}

impl Host {
    pub fn new(mac: MacAddress, vlan: Option<VlanId>) -> Self {
        Self {
            mac,
            vlan,
            locations: BTreeSet::new(),
            ips: BTreeSet::new(),
        }
    }

    pub fn with_location(mut self, location: ConnectPoint) -> Self {
        self.locations.insert(location);
        self
    }

    pub fn with_ip(mut self, ip: IpAddress) -> Self {
        self.ips.insert(ip);
        self
    }

    pub fn id(&self) -> HostId {
        HostId::new(self.mac, self.vlan)
    }

    pub fn is_untagged(&self) -> bool {
        self.vlan.is_none()
    }

    /// Returns true if one of the host's locations is on `device_id`.
    pub fn has_location_on(&self, device_id: &DeviceId) -> bool {
        self.locations
            .iter()
            .any(|location| location.device_id() == device_id)
    }

    /// Devices the host is attached to.
    pub fn devices(&self) -> BTreeSet<DeviceId> {
        self.locations
            .iter()
            .map(|location| location.device_id().clone())
            .collect()
    }
}

/// Host directory change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Added { host: Host },
    Removed { host: Host },
    /// Location set changed.
    Moved { host: Host, prev: Host },
    /// IP set changed.
    Updated { host: Host, prev: Host },
}

impl HostEvent {
    /// The host in its current state (last known state for removals).
    pub fn subject(&self) -> &Host {
        match self {
            HostEvent::Added { host }
            | HostEvent::Removed { host }
            | HostEvent::Moved { host, .. }
            | HostEvent::Updated { host, .. } => host,
        }
    }
}

/// Probe flavour requested from the host probing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// Learn whether the host is reachable at a new point.
    Discover,
    /// Confirm the host is still at a known location.
    Verify,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_host_id_display() {
        let mac: MacAddress = "00:00:00:00:00:01".parse().unwrap();
        assert_eq!(HostId::new(mac, None).to_string(), "00:00:00:00:00:01/None");
        assert_eq!(
            HostId::new(mac, Some(VlanId::new(20).unwrap())).to_string(),
            "00:00:00:00:00:01/20"
        );
    }

    #[test]
    fn test_host_event_json() {
        let json = r#"{"type":"added","host":{"mac":"00:00:00:00:00:01",
            "locations":["of:0000000000000001/1"],"ips":["10.0.1.1"]}}"#;
        let event: HostEvent = serde_json::from_str(json).unwrap();
        let host = event.subject();
        assert_eq!(host.vlan, None);
        assert!(host.has_location_on(&"of:0000000000000001".parse().unwrap()));
        assert_eq!(host.ips.len(), 1);
    }
}
