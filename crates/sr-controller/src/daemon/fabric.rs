//! In-memory fabric state kept in step with an event feed.

use super::events::{DeviceEvent, FabricEvent, InterfaceEvent, MastershipEvent};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::host::HostEvent;
use crate::interface::{Interface, VlanPolicy};
use crate::memory::{
    DevicePairing, LoggingProber, MemoryHostDirectory, MemoryRouteStore, NetworkConfig,
    StaticCluster, StaticDeviceService, StaticMastership,
};
use crate::route::RouteEvent;
use crate::services::{FabricServices, InterfaceService};
use sr_types::{IpPrefix, NodeId, VlanId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The in-memory collaborators of one controller instance.
///
/// An event describes a change that has already happened in the fabric, so
/// [`MemoryFabric::apply`] must run before the event is submitted to the
/// controller.
pub struct MemoryFabric {
    pub mastership: Arc<StaticMastership>,
    pub cluster: Arc<StaticCluster>,
    pub network: Arc<NetworkConfig>,
    pub hosts: Arc<MemoryHostDirectory>,
    pub routes: Arc<MemoryRouteStore>,
    pub devices: Arc<StaticDeviceService>,
    pub prober: Arc<LoggingProber>,
}

impl MemoryFabric {
    pub fn new(local_node: NodeId) -> Self {
        Self {
            mastership: Arc::new(StaticMastership::new()),
            cluster: Arc::new(StaticCluster::new(local_node)),
            network: Arc::new(NetworkConfig::new()),
            hosts: Arc::new(MemoryHostDirectory::new()),
            routes: Arc::new(MemoryRouteStore::new()),
            devices: Arc::new(StaticDeviceService::new()),
            prober: Arc::new(LoggingProber),
        }
    }

    /// Builds the fabric described by a validated configuration.
    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        let fabric = Self {
            mastership: Arc::new(StaticMastership::from_map(config.mastership.clone())),
            ..Self::new(config.controller.local_node.clone())
        };
        for device in &config.devices {
            fabric.network.set_pairing(
                &device.id,
                DevicePairing {
                    pair_device_id: device.pair_device.clone(),
                    pair_local_port: device.pair_local_port,
                },
            );
        }
        for interface in config.interfaces()? {
            fabric.network.add_interface(interface);
        }
        Ok(fabric)
    }

    pub fn services(&self) -> FabricServices {
        FabricServices {
            mastership: self.mastership.clone(),
            cluster: self.cluster.clone(),
            device_config: self.network.clone(),
            interfaces: self.network.clone(),
            hosts: self.hosts.clone(),
            routes: self.routes.clone(),
            devices: self.devices.clone(),
            prober: self.prober.clone(),
        }
    }

    /// Records the state change carried by `event`.
    pub fn apply(&self, event: &FabricEvent) {
        match event {
            FabricEvent::Host(event) => match event {
                HostEvent::Added { host }
                | HostEvent::Moved { host, .. }
                | HostEvent::Updated { host, .. } => {
                    self.hosts.upsert(host.clone());
                }
                HostEvent::Removed { host } => {
                    self.hosts.remove(&host.id());
                }
            },
            FabricEvent::Route(event) => match event {
                RouteEvent::Removed { prefix, .. } => self.routes.remove(prefix),
                _ => self.routes.set(event.prefix(), event.next_hops().to_vec()),
            },
            FabricEvent::Mastership(MastershipEvent::MasterChanged { device_id, master }) => {
                self.mastership.set_master(device_id, master.clone());
            }
            FabricEvent::Device(event) => match event {
                DeviceEvent::Available { device_id } => self.devices.set_available(device_id, true),
                DeviceEvent::Unavailable { device_id } => {
                    self.devices.set_available(device_id, false)
                }
                DeviceEvent::PortUp { connect_point } => {
                    self.devices.set_port_enabled(connect_point, true)
                }
                DeviceEvent::PortDown { connect_point } => {
                    self.devices.set_port_enabled(connect_point, false)
                }
            },
            FabricEvent::Interface(event) => self.apply_interface(event),
        }
    }

    fn apply_interface(&self, event: &InterfaceEvent) {
        let connect_point = event.connect_point();
        let mut interfaces = self.network.interfaces_at(connect_point);
        if interfaces.is_empty() {
            interfaces.push(Interface::new(connect_point.clone(), VlanPolicy::Unconfigured));
        }
        let Some(interface) = interfaces.first_mut() else {
            return;
        };
        match event {
            InterfaceEvent::VlanUpdated {
                vlan,
                pop_vlan,
                install,
                ..
            } => {
                interface.vlan = updated_policy(&interface.vlan, *vlan, *pop_vlan, *install);
            }
            InterfaceEvent::IpUpdated {
                prefixes, install, ..
            } => update_subnets(&mut interface.subnets, prefixes, *install),
        }
        self.network.replace_interfaces(connect_point, interfaces);
    }
}

fn updated_policy(current: &VlanPolicy, vlan: VlanId, pop_vlan: bool, install: bool) -> VlanPolicy {
    match (current, install) {
        (VlanPolicy::Tagged { tagged, .. }, true) if pop_vlan => VlanPolicy::Tagged {
            tagged: tagged.clone(),
            native: Some(vlan),
        },
        (_, true) if pop_vlan => VlanPolicy::Untagged(vlan),
        (VlanPolicy::Tagged { tagged, native }, true) => {
            let mut tagged = tagged.clone();
            tagged.insert(vlan);
            VlanPolicy::Tagged {
                tagged,
                native: *native,
            }
        }
        (VlanPolicy::Untagged(native), true) => VlanPolicy::tagged([vlan], Some(*native)),
        (VlanPolicy::Unconfigured, true) => VlanPolicy::tagged([vlan], None),
        (VlanPolicy::Untagged(untagged), false) if *untagged == vlan => VlanPolicy::Unconfigured,
        (VlanPolicy::Tagged { tagged, native }, false) => {
            let tagged: BTreeSet<VlanId> = tagged.iter().copied().filter(|v| *v != vlan).collect();
            let native = native.filter(|v| *v != vlan);
            if tagged.is_empty() {
                native.map_or(VlanPolicy::Unconfigured, VlanPolicy::Untagged)
            } else {
                VlanPolicy::Tagged { tagged, native }
            }
        }
        (policy, false) => policy.clone(),
    }
}

fn update_subnets(subnets: &mut Vec<IpPrefix>, prefixes: &[IpPrefix], install: bool) {
    if install {
        for prefix in prefixes {
            if !subnets.contains(prefix) {
                subnets.push(*prefix);
            }
        }
    } else {
        subnets.retain(|subnet| !prefixes.contains(subnet));
    }
}
