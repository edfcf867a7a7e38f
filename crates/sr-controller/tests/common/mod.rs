//! Shared fixture: a small leaf-spine topology with one leaf pair.
//!
//! ```text
//!   of:1 ──port 9── of:2        of:3        of:4
//!    │ 1 (untagged 10)  │ 1     │ 1 (30)    │ 1 (40)
//!    │ 2 (tagged 20)    │ 2
//! ```
//!
//! Pair ports carry every subnet of the pair so that redirected host routes
//! pass the subnet check.

#![allow(dead_code)]

use parking_lot::Mutex;
use sr_controller::arbiter::OwnershipArbiter;
use sr_controller::daemon::MemoryFabric;
use sr_controller::host::{Host, HostHandler, HostHandlerConfig, ProbeMode};
use sr_controller::interface::{Interface, VlanPolicy};
use sr_controller::populator::{BridgingKey, RoutingEntry, RoutingKey, RulePopulator};
use sr_controller::route::{ResolvedRoute, RouteHandler};
use sr_controller::services::{FabricServices, HostProbingService};
use sr_types::{ConnectPoint, DeviceId, IpAddress, IpPrefix, MacAddress, NodeId, PortNumber, VlanId};
use std::sync::Arc;

pub const PAIR_PORT: u64 = 9;

pub fn dev(n: u8) -> DeviceId {
    DeviceId::new(format!("of:{}", n)).unwrap()
}

pub fn cp(n: u8, port: u64) -> ConnectPoint {
    ConnectPoint::new(dev(n), PortNumber::new(port))
}

pub fn vlan(id: u16) -> VlanId {
    VlanId::new(id).unwrap()
}

pub fn mac(n: u8) -> MacAddress {
    MacAddress::new([0, 0, 0, 0, 0, n])
}

pub fn ip(s: &str) -> IpAddress {
    s.parse().unwrap()
}

pub fn prefix(s: &str) -> IpPrefix {
    s.parse().unwrap()
}

pub fn host_prefix(s: &str) -> IpPrefix {
    ip(s).to_host_prefix()
}

pub fn host(n: u8, vlan: Option<VlanId>, locations: &[ConnectPoint], ips: &[&str]) -> Host {
    let mut host = Host::new(mac(n), vlan);
    for location in locations {
        host = host.with_location(location.clone());
    }
    for addr in ips {
        host = host.with_ip(ip(addr));
    }
    host
}

pub fn next_hop(route: &str, host: &Host, addr: &str) -> ResolvedRoute {
    ResolvedRoute::new(prefix(route), ip(addr), host.mac, host.vlan)
}

/// Probe requests seen by the fixture.
#[derive(Default)]
pub struct RecordingProber {
    probes: Mutex<Vec<(MacAddress, ConnectPoint, ProbeMode)>>,
}

impl RecordingProber {
    pub fn probes(&self) -> Vec<(MacAddress, ConnectPoint, ProbeMode)> {
        self.probes.lock().clone()
    }

    pub fn clear(&self) {
        self.probes.lock().clear();
    }
}

impl HostProbingService for RecordingProber {
    fn probe_host(&self, host: &Host, connect_point: &ConnectPoint, mode: ProbeMode) {
        self.probes.lock().push((host.mac, connect_point.clone(), mode));
    }
}

pub struct Fixture {
    pub fabric: MemoryFabric,
    pub prober: Arc<RecordingProber>,
    pub populator: Arc<RulePopulator>,
    pub hosts: HostHandler,
    pub routes: RouteHandler,
}

impl Fixture {
    /// Every device mastered by `n1`, which is the local node.
    pub fn new() -> Self {
        Self::with_local("n1", HostHandlerConfig::default())
    }

    pub fn with_local(local: &str, config: HostHandlerConfig) -> Self {
        let fabric = MemoryFabric::new(NodeId::from(local));
        fabric.network.set_pair(&dev(1), &dev(2), PortNumber::new(PAIR_PORT));

        let untagged = VlanPolicy::untagged(vlan(10));
        let tagged = VlanPolicy::tagged([vlan(20)], None);
        let pair_link = VlanPolicy::tagged([vlan(20)], Some(vlan(10)));
        for device in [1, 2] {
            fabric.network.add_interface(
                Interface::new(cp(device, 1), untagged.clone())
                    .with_subnet(prefix("10.0.1.254/24")),
            );
            fabric.network.add_interface(
                Interface::new(cp(device, 2), tagged.clone()).with_subnet(prefix("10.0.2.254/24")),
            );
            fabric.network.add_interface(
                Interface::new(cp(device, PAIR_PORT), pair_link.clone())
                    .with_subnet(prefix("10.0.1.254/24"))
                    .with_subnet(prefix("10.0.2.254/24")),
            );
        }
        fabric.network.add_interface(
            Interface::new(cp(3, 1), VlanPolicy::untagged(vlan(30)))
                .with_subnet(prefix("10.0.3.254/24")),
        );
        fabric.network.add_interface(
            Interface::new(cp(4, 1), VlanPolicy::untagged(vlan(40)))
                .with_subnet(prefix("10.0.4.254/24")),
        );
        for device in 1..=4 {
            fabric.mastership.set_master(&dev(device), Some(NodeId::from("n1")));
        }

        let prober = Arc::new(RecordingProber::default());
        let mut services: FabricServices = fabric.services();
        services.prober = prober.clone();

        let arbiter = Arc::new(OwnershipArbiter::new(
            services.mastership.clone(),
            services.cluster.clone(),
            services.device_config.clone(),
        ));
        let populator = Arc::new(RulePopulator::new(arbiter, services.device_config.clone()));
        let hosts = HostHandler::new(config, &services, populator.clone());
        let routes = RouteHandler::new(&services, populator.clone());

        Self {
            fabric,
            prober,
            populator,
            hosts,
            routes,
        }
    }

    pub fn bridging_port(
        &self,
        device: u8,
        mac: MacAddress,
        vlan: VlanId,
    ) -> Option<(PortNumber, bool)> {
        self.populator
            .bridging_table()
            .get(&BridgingKey {
                device_id: dev(device),
                mac,
                vlan,
            })
            .map(|entry| (entry.port, entry.pop_vlan))
    }

    pub fn route(&self, device: u8, prefix: IpPrefix) -> Option<RoutingEntry> {
        self.populator
            .routing_table()
            .get(&RoutingKey::new(dev(device), prefix))
    }
}
