//! Host directory, RIB, device state and logging sinks.

use crate::host::{Host, HostId, ProbeMode};
use crate::populator::{BridgingEntry, RoutingEntry};
use crate::route::{ResolvedRoute, RouteInfo};
use crate::services::{
    DeviceService, FlowProgrammer, HostDirectory, HostProbingService, PortStatus, RouteService,
};
use log::{debug, info};
use parking_lot::RwLock;
use sr_types::{ConnectPoint, DeviceId, IpPrefix};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct MemoryHostDirectory {
    hosts: RwLock<BTreeMap<HostId, Host>>,
}

impl MemoryHostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a host, returning the previous state.
    pub fn upsert(&self, host: Host) -> Option<Host> {
        self.hosts.write().insert(host.id(), host)
    }

    pub fn remove(&self, id: &HostId) -> Option<Host> {
        self.hosts.write().remove(id)
    }
}

impl HostDirectory for MemoryHostDirectory {
    fn host(&self, id: &HostId) -> Option<Host> {
        self.hosts.read().get(id).cloned()
    }

    fn hosts(&self) -> Vec<Host> {
        self.hosts.read().values().cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryRouteStore {
    routes: RwLock<BTreeMap<IpPrefix, Vec<ResolvedRoute>>>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the alternatives for `prefix`; an empty set withdraws it.
    pub fn set(&self, prefix: IpPrefix, next_hops: Vec<ResolvedRoute>) {
        let mut routes = self.routes.write();
        if next_hops.is_empty() {
            routes.remove(&prefix);
        } else {
            routes.insert(prefix, next_hops);
        }
    }

    pub fn remove(&self, prefix: &IpPrefix) {
        self.routes.write().remove(prefix);
    }
}

impl RouteService for MemoryRouteStore {
    fn routes(&self) -> Vec<RouteInfo> {
        self.routes
            .read()
            .iter()
            .map(|(prefix, next_hops)| RouteInfo::new(*prefix, next_hops.clone()))
            .collect()
    }
}

/// Device and port state. Devices are available and ports enabled unless
/// marked otherwise.
#[derive(Debug, Default)]
pub struct StaticDeviceService {
    unavailable: RwLock<BTreeSet<DeviceId>>,
    ports: RwLock<BTreeMap<ConnectPoint, bool>>,
}

impl StaticDeviceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, device_id: &DeviceId, available: bool) {
        let mut unavailable = self.unavailable.write();
        if available {
            unavailable.remove(device_id);
        } else {
            unavailable.insert(device_id.clone());
        }
    }

    pub fn set_port_enabled(&self, connect_point: &ConnectPoint, enabled: bool) {
        self.ports.write().insert(connect_point.clone(), enabled);
    }
}

impl DeviceService for StaticDeviceService {
    fn is_available(&self, device_id: &DeviceId) -> bool {
        !self.unavailable.read().contains(device_id)
    }

    fn ports(&self, device_id: &DeviceId) -> Vec<PortStatus> {
        self.ports
            .read()
            .iter()
            .filter(|(cp, _)| cp.device_id() == device_id)
            .map(|(cp, enabled)| PortStatus {
                port: cp.port(),
                enabled: *enabled,
            })
            .collect()
    }
}

/// Prober that only logs the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProber;

impl HostProbingService for LoggingProber {
    fn probe_host(&self, host: &Host, connect_point: &ConnectPoint, mode: ProbeMode) {
        info!(
            "LoggingProber: probe {} at {} ({:?})",
            host.id(),
            connect_point,
            mode
        );
    }
}

/// Southbound sink that only logs entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProgrammer;

impl FlowProgrammer for LoggingProgrammer {
    fn install_bridging(&self, entry: &BridgingEntry) {
        debug!(
            "LoggingProgrammer: install bridging {} -> port {}",
            entry.key(),
            entry.port
        );
    }

    fn remove_bridging(&self, entry: &BridgingEntry) {
        debug!("LoggingProgrammer: remove bridging {}", entry.key());
    }

    fn install_routing(&self, entry: &RoutingEntry) {
        debug!(
            "LoggingProgrammer: install routing {} -> {:?}",
            entry.key(),
            entry.egress
        );
    }

    fn remove_routing(&self, entry: &RoutingEntry) {
        debug!("LoggingProgrammer: remove routing {}", entry.key());
    }
}
