//! Device pairing, interfaces and subnet registrations.

use crate::error::ConfigError;
use crate::interface::Interface;
use crate::services::{DeviceConfiguration, InterfaceService};
use log::debug;
use parking_lot::RwLock;
use sr_types::{ConnectPoint, DeviceId, IpAddress, IpPrefix, PortNumber};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Dual-homing configuration of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicePairing {
    pub pair_device_id: Option<DeviceId>,
    pub pair_local_port: Option<PortNumber>,
}

/// A recorded subnet write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubnetCall {
    Add(ConnectPoint, IpPrefix),
    Remove(ConnectPoint, IpPrefix),
}

/// Network configuration: pairs, interfaces and registered subnets.
///
/// Every subnet write is recorded in order so callers can check how often
/// the controller touched the store.
#[derive(Debug, Default)]
pub struct NetworkConfig {
    devices: RwLock<BTreeMap<DeviceId, DevicePairing>>,
    interfaces: RwLock<Vec<Interface>>,
    subnets: RwLock<BTreeMap<ConnectPoint, BTreeSet<IpPrefix>>>,
    calls: RwLock<Vec<SubnetCall>>,
    fail_writes: AtomicBool,
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pairing(&self, device_id: &DeviceId, pairing: DevicePairing) {
        self.devices.write().insert(device_id.clone(), pairing);
    }

    /// Pairs two devices that reach each other through `port` on both sides.
    pub fn set_pair(&self, a: &DeviceId, b: &DeviceId, port: PortNumber) {
        self.set_pairing(
            a,
            DevicePairing {
                pair_device_id: Some(b.clone()),
                pair_local_port: Some(port),
            },
        );
        self.set_pairing(
            b,
            DevicePairing {
                pair_device_id: Some(a.clone()),
                pair_local_port: Some(port),
            },
        );
    }

    pub fn add_interface(&self, interface: Interface) {
        self.interfaces.write().push(interface);
    }

    /// Replaces every interface at `connect_point`.
    pub fn replace_interfaces(&self, connect_point: &ConnectPoint, interfaces: Vec<Interface>) {
        let mut all = self.interfaces.write();
        all.retain(|intf| intf.connect_point != *connect_point);
        all.extend(interfaces);
    }

    /// Subnets currently registered through `add_subnet`.
    pub fn registered_subnets(&self) -> BTreeMap<ConnectPoint, BTreeSet<IpPrefix>> {
        self.subnets.read().clone()
    }

    pub fn subnet_calls(&self) -> Vec<SubnetCall> {
        self.calls.read().clone()
    }

    pub fn clear_subnet_calls(&self) {
        self.calls.write().clear();
    }

    /// Makes subsequent subnet writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }
}

impl DeviceConfiguration for NetworkConfig {
    fn pair_device_id(&self, device_id: &DeviceId) -> Option<DeviceId> {
        self.devices
            .read()
            .get(device_id)
            .and_then(|pairing| pairing.pair_device_id.clone())
    }

    fn pair_local_port(&self, device_id: &DeviceId) -> Option<PortNumber> {
        self.devices
            .read()
            .get(device_id)
            .and_then(|pairing| pairing.pair_local_port)
    }

    fn in_same_subnet(&self, connect_point: &ConnectPoint, ip: &IpAddress) -> bool {
        self.interfaces
            .read()
            .iter()
            .filter(|intf| intf.connect_point == *connect_point)
            .any(|intf| intf.contains_ip(ip))
    }

    fn add_subnet(
        &self,
        connect_point: &ConnectPoint,
        prefix: &IpPrefix,
    ) -> Result<(), ConfigError> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(ConfigError::AddSubnet {
                connect_point: connect_point.clone(),
                prefix: *prefix,
                reason: "store unavailable".to_string(),
            });
        }
        debug!("NetworkConfig: add subnet {} at {}", prefix, connect_point);
        self.calls
            .write()
            .push(SubnetCall::Add(connect_point.clone(), *prefix));
        self.subnets
            .write()
            .entry(connect_point.clone())
            .or_default()
            .insert(*prefix);
        Ok(())
    }

    fn remove_subnet(
        &self,
        connect_point: &ConnectPoint,
        prefix: &IpPrefix,
    ) -> Result<(), ConfigError> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(ConfigError::RemoveSubnet {
                connect_point: connect_point.clone(),
                prefix: *prefix,
                reason: "store unavailable".to_string(),
            });
        }
        debug!("NetworkConfig: remove subnet {} at {}", prefix, connect_point);
        self.calls
            .write()
            .push(SubnetCall::Remove(connect_point.clone(), *prefix));
        let mut subnets = self.subnets.write();
        if let Some(prefixes) = subnets.get_mut(connect_point) {
            prefixes.remove(prefix);
            if prefixes.is_empty() {
                subnets.remove(connect_point);
            }
        }
        Ok(())
    }
}

impl InterfaceService for NetworkConfig {
    fn interfaces_at(&self, connect_point: &ConnectPoint) -> Vec<Interface> {
        self.interfaces
            .read()
            .iter()
            .filter(|intf| intf.connect_point == *connect_point)
            .cloned()
            .collect()
    }

    fn interfaces(&self) -> Vec<Interface> {
        self.interfaces.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::VlanPolicy;
    use pretty_assertions::assert_eq;
    use sr_types::VlanId;

    fn cp(s: &str) -> ConnectPoint {
        s.parse().unwrap()
    }

    #[test]
    fn test_pairing_is_symmetric() {
        let config = NetworkConfig::new();
        let a: DeviceId = "of:3".parse().unwrap();
        let b: DeviceId = "of:4".parse().unwrap();
        config.set_pair(&a, &b, PortNumber::new(9));
        assert_eq!(config.pair_device_id(&a), Some(b.clone()));
        assert_eq!(config.pair_device_id(&b), Some(a));
        assert_eq!(config.pair_local_port(&b), Some(PortNumber::new(9)));
    }

    #[test]
    fn test_in_same_subnet() {
        let config = NetworkConfig::new();
        config.add_interface(
            Interface::new(cp("of:1/1"), VlanPolicy::untagged(VlanId::new(10).unwrap()))
                .with_subnet("10.0.1.254/24".parse().unwrap()),
        );
        config.add_interface(
            Interface::new(cp("of:1/2"), VlanPolicy::Unconfigured)
                .with_subnet("0.0.0.0/0".parse().unwrap()),
        );
        assert!(config.in_same_subnet(&cp("of:1/1"), &"10.0.1.1".parse().unwrap()));
        assert!(!config.in_same_subnet(&cp("of:1/1"), &"10.0.2.1".parse().unwrap()));
        assert!(!config.in_same_subnet(&cp("of:1/2"), &"10.0.2.1".parse().unwrap()));
        assert!(config.is_configured(&cp("of:1/1")));
        assert!(!config.is_configured(&cp("of:1/3")));
    }

    #[test]
    fn test_failed_write_not_recorded() {
        let config = NetworkConfig::new();
        config.set_fail_writes(true);
        let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
        assert!(config.add_subnet(&cp("of:1/1"), &prefix).is_err());
        assert!(config.subnet_calls().is_empty());
        assert!(config.registered_subnets().is_empty());
    }
}
