//! Events accepted by the controller.

use crate::host::HostEvent;
use crate::route::RouteEvent;
use serde::{Deserialize, Serialize};
use sr_types::{ConnectPoint, DeviceId, IpPrefix, NodeId, VlanId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MastershipEvent {
    MasterChanged {
        device_id: DeviceId,
        #[serde(default)]
        master: Option<NodeId>,
    },
}

impl MastershipEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            MastershipEvent::MasterChanged { device_id, .. } => device_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// Device connected or reconnected.
    Available { device_id: DeviceId },
    Unavailable { device_id: DeviceId },
    PortUp { connect_point: ConnectPoint },
    PortDown { connect_point: ConnectPoint },
}

impl DeviceEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            DeviceEvent::Available { device_id } | DeviceEvent::Unavailable { device_id } => {
                device_id
            }
            DeviceEvent::PortUp { connect_point } | DeviceEvent::PortDown { connect_point } => {
                connect_point.device_id()
            }
        }
    }
}

/// Interface configuration change at one connect point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterfaceEvent {
    VlanUpdated {
        connect_point: ConnectPoint,
        vlan: VlanId,
        #[serde(default)]
        pop_vlan: bool,
        install: bool,
    },
    IpUpdated {
        connect_point: ConnectPoint,
        prefixes: Vec<IpPrefix>,
        install: bool,
    },
}

impl InterfaceEvent {
    pub fn connect_point(&self) -> &ConnectPoint {
        match self {
            InterfaceEvent::VlanUpdated { connect_point, .. }
            | InterfaceEvent::IpUpdated { connect_point, .. } => connect_point,
        }
    }
}

/// Any event the controller reacts to.
///
/// In a JSON feed each line is one event, e.g.
/// `{"kind":"host","type":"added","host":{"mac":"00:00:00:00:00:01"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FabricEvent {
    Host(HostEvent),
    Route(RouteEvent),
    Mastership(MastershipEvent),
    Device(DeviceEvent),
    Interface(InterfaceEvent),
}
