//! External collaborators consumed by the controller.
//!
//! The controller never mutates these inputs except through
//! [`DeviceConfiguration::add_subnet`] / [`DeviceConfiguration::remove_subnet`];
//! changes to them arrive as events.

use crate::error::ConfigError;
use crate::host::{Host, HostId, ProbeMode};
use crate::interface::Interface;
use crate::populator::{BridgingEntry, RoutingEntry};
use crate::route::RouteInfo;
use sr_types::{ConnectPoint, DeviceId, IpAddress, IpPrefix, NodeId, PortNumber};
use std::sync::Arc;

/// Cluster mastership assignment.
pub trait MastershipService: Send + Sync {
    fn master_of(&self, device_id: &DeviceId) -> Option<NodeId>;
}

pub trait ClusterService: Send + Sync {
    fn local_node_id(&self) -> NodeId;
}

/// Static device configuration plus subnet bookkeeping.
pub trait DeviceConfiguration: Send + Sync {
    /// Dual-homing sibling of `device_id`.
    fn pair_device_id(&self, device_id: &DeviceId) -> Option<DeviceId>;

    /// Port on `device_id` that leads to its pair.
    fn pair_local_port(&self, device_id: &DeviceId) -> Option<PortNumber>;

    /// Returns true if a subnet configured at `connect_point` contains `ip`.
    fn in_same_subnet(&self, connect_point: &ConnectPoint, ip: &IpAddress) -> bool;

    fn add_subnet(&self, connect_point: &ConnectPoint, prefix: &IpPrefix)
        -> Result<(), ConfigError>;

    fn remove_subnet(
        &self,
        connect_point: &ConnectPoint,
        prefix: &IpPrefix,
    ) -> Result<(), ConfigError>;
}

pub trait InterfaceService: Send + Sync {
    fn interfaces_at(&self, connect_point: &ConnectPoint) -> Vec<Interface>;

    fn interfaces(&self) -> Vec<Interface>;

    fn is_configured(&self, connect_point: &ConnectPoint) -> bool {
        !self.interfaces_at(connect_point).is_empty()
    }
}

/// Read access to tracked hosts.
pub trait HostDirectory: Send + Sync {
    fn host(&self, id: &HostId) -> Option<Host>;

    fn hosts(&self) -> Vec<Host>;

    /// Hosts with a location equal to `connect_point`.
    fn connected_hosts(&self, connect_point: &ConnectPoint) -> Vec<Host> {
        self.hosts()
            .into_iter()
            .filter(|host| host.locations.contains(connect_point))
            .collect()
    }

    /// Hosts with a location on `device_id`.
    fn hosts_on_device(&self, device_id: &DeviceId) -> Vec<Host> {
        self.hosts()
            .into_iter()
            .filter(|host| host.has_location_on(device_id))
            .collect()
    }
}

/// The RIB.
pub trait RouteService: Send + Sync {
    fn routes(&self) -> Vec<RouteInfo>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatus {
    pub port: PortNumber,
    pub enabled: bool,
}

pub trait DeviceService: Send + Sync {
    fn is_available(&self, device_id: &DeviceId) -> bool;

    fn ports(&self, device_id: &DeviceId) -> Vec<PortStatus>;

    /// Unknown ports count as enabled.
    fn is_port_enabled(&self, connect_point: &ConnectPoint) -> bool {
        self.ports(connect_point.device_id())
            .iter()
            .find(|status| status.port == connect_point.port())
            .map_or(true, |status| status.enabled)
    }
}

/// Active host probing. Fire-and-forget.
pub trait HostProbingService: Send + Sync {
    fn probe_host(&self, host: &Host, connect_point: &ConnectPoint, mode: ProbeMode);
}

/// Southbound sink for forwarding entries. Fire-and-forget.
pub trait FlowProgrammer: Send + Sync {
    fn install_bridging(&self, entry: &BridgingEntry);

    fn remove_bridging(&self, entry: &BridgingEntry);

    fn install_routing(&self, entry: &RoutingEntry);

    fn remove_routing(&self, entry: &RoutingEntry);
}

/// Bundle of collaborators shared by the handlers.
#[derive(Clone)]
pub struct FabricServices {
    pub mastership: Arc<dyn MastershipService>,
    pub cluster: Arc<dyn ClusterService>,
    pub device_config: Arc<dyn DeviceConfiguration>,
    pub interfaces: Arc<dyn InterfaceService>,
    pub hosts: Arc<dyn HostDirectory>,
    pub routes: Arc<dyn RouteService>,
    pub devices: Arc<dyn DeviceService>,
    pub prober: Arc<dyn HostProbingService>,
}
