//! Active probing of hosts on the pair device.

use super::handler::HostHandler;
use super::types::{Host, ProbeMode};
use crate::interface::admission;
use log::debug;
use sr_types::{ConnectPoint, DeviceId, PortNumber};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;

impl HostHandler {
    /// Probes `host`, seen at `location`, on the ports of `pair` that carry
    /// its VLAN. The pair link itself is never probed.
    pub(super) fn probe(
        &self,
        host: &Host,
        location: &ConnectPoint,
        pair: &DeviceId,
        pair_port: PortNumber,
    ) {
        if self.hosts.host(&host.id()).is_none() {
            debug!("HostHandler: {} no longer known, not probing", host.id());
            return;
        }

        let probe_vlan = match host.vlan {
            Some(vlan) => Some(vlan),
            None => admission::internal_vlan(&self.interfaces.interfaces_at(location)),
        };
        let Some(probe_vlan) = probe_vlan else {
            debug!("HostHandler: no VLAN to probe {} with", host.id());
            return;
        };

        let targets: BTreeSet<ConnectPoint> = self
            .interfaces
            .interfaces()
            .into_iter()
            .filter(|intf| intf.connect_point.device_id() == pair)
            .filter(|intf| intf.vlan.carries(probe_vlan))
            .map(|intf| intf.connect_point)
            .filter(|cp| {
                if self.config.symmetric_probing {
                    cp.port() == location.port()
                } else {
                    cp.port() != pair_port
                }
            })
            .collect();

        for target in targets {
            if !self.devices.is_port_enabled(&target) {
                debug!("HostHandler: {} is disabled, not probing {}", target, host.id());
                continue;
            }
            debug!("HostHandler: probing {} at {} on VLAN {}", host.id(), target, probe_vlan);
            self.prober.probe_host(host, &target, ProbeMode::Discover);
            self.stats.probes.fetch_add(1, Ordering::Relaxed);
        }
    }
}
