//! Device lifecycle and interface change handling.

use super::events::{DeviceEvent, InterfaceEvent};
use crate::error::{ControllerError, Result};
use crate::host::HostHandler;
use crate::populator::RulePopulator;
use crate::route::RouteHandler;
use crate::services::DeviceService;
use log::{debug, info};
use sr_orch_common::EventHandler;
use sr_types::{ConnectPoint, DeviceId};
use std::sync::Arc;

/// Reacts to devices connecting, disconnecting and changing port state.
///
/// A device that becomes available gets every host and route touching it
/// or its pair reinstalled; one that goes away loses all recorded entries
/// and its cached ownership decision.
pub struct DeviceHandler {
    hosts: Arc<HostHandler>,
    routes: Arc<RouteHandler>,
    populator: Arc<RulePopulator>,
    devices: Arc<dyn DeviceService>,
}

impl DeviceHandler {
    pub fn new(
        hosts: Arc<HostHandler>,
        routes: Arc<RouteHandler>,
        populator: Arc<RulePopulator>,
        devices: Arc<dyn DeviceService>,
    ) -> Self {
        Self {
            hosts,
            routes,
            populator,
            devices,
        }
    }

    /// Reinstalls hosts and routes on `device_id`.
    pub fn process_device_available(&self, device_id: &DeviceId) -> Result<()> {
        if !self.devices.is_available(device_id) {
            debug!("DeviceHandler: {} reported available but is not, skipping", device_id);
            return Ok(());
        }
        info!("DeviceHandler: {} available", device_id);
        self.hosts.init(device_id)?;
        self.routes.init(device_id)
    }

    pub fn process_device_unavailable(&self, device_id: &DeviceId) -> Result<()> {
        let purged = self.populator.purge_device(device_id);
        self.routes.purge_device(device_id);
        self.populator.arbiter().invalidate(device_id);
        info!("DeviceHandler: {} unavailable, dropped {} entries", device_id, purged);
        Ok(())
    }

    pub fn process_port_up(&self, connect_point: &ConnectPoint) -> Result<()> {
        self.hosts.process_port_up(connect_point)
    }
}

impl EventHandler<DeviceEvent> for DeviceHandler {
    type Key = DeviceId;
    type Error = ControllerError;

    fn name(&self) -> &str {
        "DeviceHandler"
    }

    fn key(&self, event: &DeviceEvent) -> DeviceId {
        event.device_id().clone()
    }

    fn handle(&self, event: DeviceEvent) -> Result<()> {
        match event {
            DeviceEvent::Available { device_id } => self.process_device_available(&device_id),
            DeviceEvent::Unavailable { device_id } => self.process_device_unavailable(&device_id),
            DeviceEvent::PortUp { connect_point } => self.process_port_up(&connect_point),
            DeviceEvent::PortDown { connect_point } => {
                debug!("DeviceHandler: port {} down", connect_point);
                Ok(())
            }
        }
    }
}

impl EventHandler<InterfaceEvent> for HostHandler {
    type Key = ConnectPoint;
    type Error = ControllerError;

    fn name(&self) -> &str {
        "HostHandler"
    }

    fn key(&self, event: &InterfaceEvent) -> ConnectPoint {
        event.connect_point().clone()
    }

    fn handle(&self, event: InterfaceEvent) -> Result<()> {
        match event {
            InterfaceEvent::VlanUpdated {
                connect_point,
                vlan,
                pop_vlan,
                install,
            } => self.process_intf_vlan_updated(&connect_point, vlan, pop_vlan, install),
            InterfaceEvent::IpUpdated {
                connect_point,
                prefixes,
                install,
            } => self.process_intf_ip_updated(&connect_point, &prefixes, install),
        }
    }
}
