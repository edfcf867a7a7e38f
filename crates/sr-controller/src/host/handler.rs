//! Host event processing.

use super::types::{Host, HostEvent, HostId, ProbeMode};
use crate::error::{ControllerError, Result};
use crate::interface::admission;
use crate::populator::{BridgingEntry, BridgingKey, RoutingEntry, RoutingKey, RulePopulator};
use crate::services::{
    DeviceConfiguration, DeviceService, FabricServices, HostDirectory, HostProbingService,
    InterfaceService, RouteService,
};
use log::{debug, info};
use serde::Serialize;
use sr_orch_common::EventHandler;
use sr_types::{ConnectPoint, DeviceId, IpAddress, IpPrefix, PortNumber, VlanId};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Configuration for [`HostHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostHandlerConfig {
    /// Probe the pair device for hosts seen on only one leaf.
    pub active_probing: bool,
    /// Probe only the port with the same number as the host's port.
    pub symmetric_probing: bool,
}

impl Default for HostHandlerConfig {
    fn default() -> Self {
        Self {
            active_probing: true,
            symmetric_probing: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct HostHandlerStats {
    pub(super) added: AtomicU64,
    pub(super) removed: AtomicU64,
    pub(super) moved: AtomicU64,
    pub(super) updated: AtomicU64,
    pub(super) locations_skipped: AtomicU64,
    pub(super) probes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostHandlerStatsSnapshot {
    pub added: u64,
    pub removed: u64,
    pub moved: u64,
    pub updated: u64,
    pub locations_skipped: u64,
    pub probes: u64,
}

impl HostHandlerStats {
    pub fn snapshot(&self) -> HostHandlerStatsSnapshot {
        HostHandlerStatsSnapshot {
            added: self.added.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            moved: self.moved.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            locations_skipped: self.locations_skipped.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
        }
    }
}

/// Keeps bridging and routing entries in line with host locations.
///
/// Entries for a location whose port rejects the host's VLAN, or that has no
/// interface at all, are skipped. A host seen on one leaf of a pair is also
/// given a redirect on the other leaf pointing at the pair link.
pub struct HostHandler {
    pub(super) config: HostHandlerConfig,
    pub(super) populator: Arc<RulePopulator>,
    pub(super) device_config: Arc<dyn DeviceConfiguration>,
    pub(super) interfaces: Arc<dyn InterfaceService>,
    pub(super) hosts: Arc<dyn HostDirectory>,
    pub(super) routes: Arc<dyn RouteService>,
    pub(super) devices: Arc<dyn DeviceService>,
    pub(super) prober: Arc<dyn HostProbingService>,
    pub(super) stats: HostHandlerStats,
}

impl HostHandler {
    pub fn new(
        config: HostHandlerConfig,
        services: &FabricServices,
        populator: Arc<RulePopulator>,
    ) -> Self {
        Self {
            config,
            populator,
            device_config: Arc::clone(&services.device_config),
            interfaces: Arc::clone(&services.interfaces),
            hosts: Arc::clone(&services.hosts),
            routes: Arc::clone(&services.routes),
            devices: Arc::clone(&services.devices),
            prober: Arc::clone(&services.prober),
            stats: HostHandlerStats::default(),
        }
    }

    pub fn config(&self) -> HostHandlerConfig {
        self.config
    }

    pub fn stats(&self) -> HostHandlerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Reinstalls every host attached to `device_id` or its pair.
    pub fn init(&self, device_id: &DeviceId) -> Result<()> {
        info!("HostHandler: initializing hosts on {}", device_id);
        let pair = self.device_config.pair_device_id(device_id);
        for host in self.hosts.hosts() {
            for location in &host.locations {
                let on_device = location.device_id() == device_id;
                let on_pair = pair.as_ref() == Some(location.device_id());
                if on_device || on_pair {
                    self.process_host_added_at_location(&host, location)?;
                }
            }
        }
        Ok(())
    }

    pub fn process_host_added(&self, host: &Host) -> Result<()> {
        info!("HostHandler: host {} added at {:?}", host.id(), host.locations);
        self.stats.added.fetch_add(1, Ordering::Relaxed);
        for location in &host.locations {
            self.process_host_added_at_location(host, location)?;
        }
        Ok(())
    }

    /// Installs the entries for one of the host's locations, plus the
    /// redirect on the pair device when the host is not also attached there.
    pub fn process_host_added_at_location(
        &self,
        host: &Host,
        location: &ConnectPoint,
    ) -> Result<()> {
        if !host.locations.contains(location) {
            return Err(ControllerError::InvalidLocation {
                host: host.id().to_string(),
                location: location.clone(),
            });
        }

        self.populate_location(host, location, &host.ips);
        if let Some(redirect) = self.populate_pair_redirect(host, location) {
            if self.config.active_probing {
                self.probe(host, location, redirect.device_id(), redirect.port());
            }
        }
        Ok(())
    }

    /// Revokes every entry of a host that disappeared, and the subnets of
    /// routes that depended on it alone at a location.
    pub fn process_host_removed(&self, host: &Host) -> Result<()> {
        info!("HostHandler: host {} removed", host.id());
        self.stats.removed.fetch_add(1, Ordering::Relaxed);

        for location in &host.locations {
            self.revoke_location(host, location, &host.ips);
            self.revoke_pair_redirect(host, location);
            self.revoke_orphaned_subnets(host, location)?;
        }
        Ok(())
    }

    pub fn process_host_moved(&self, host: &Host, prev: &Host) -> Result<()> {
        if host.locations == prev.locations {
            debug!("HostHandler: {} moved without a location change", host.id());
            return Ok(());
        }
        if host.locations.is_empty() {
            return self.process_host_removed(prev);
        }
        info!(
            "HostHandler: host {} moved {:?} -> {:?}",
            host.id(),
            prev.locations,
            host.locations
        );
        self.stats.moved.fetch_add(1, Ordering::Relaxed);

        let new_devices = host.devices();
        let removed_ips: BTreeSet<IpAddress> = prev.ips.difference(&host.ips).copied().collect();
        let kept_ips: BTreeSet<IpAddress> = prev.ips.intersection(&host.ips).copied().collect();

        for prev_location in prev.locations.difference(&host.locations) {
            let device = prev_location.device_id();
            for ip in &removed_ips {
                self.populator
                    .revoke_route(&RoutingKey::new(device.clone(), ip.to_host_prefix()));
            }

            if !new_devices.contains(device) {
                let pair = self.device_config.pair_device_id(device);
                let on_pair = host
                    .locations
                    .iter()
                    .find(|location| pair.as_ref() == Some(location.device_id()));
                let Some(remaining) = on_pair else {
                    // Gone from both leaves: the pair's redirect goes too.
                    self.revoke_location(host, prev_location, &kept_ips);
                    self.revoke_pair_redirect(prev, prev_location);
                    continue;
                };

                // Lost one leaf of a pair: keep the lost leaf forwarding to
                // the host over the pair link.
                let Some((redirect, vlan)) = self.pair_redirect(host.vlan, remaining) else {
                    self.revoke_location(host, prev_location, &kept_ips);
                    continue;
                };
                info!(
                    "HostHandler: redirecting {} on {} via pair port {}",
                    host.id(),
                    device,
                    redirect.port()
                );
                self.revoke_stale_bridging(host, device, vlan);
                for ip in kept_ips
                    .iter()
                    .filter(|ip| !self.device_config.in_same_subnet(&redirect, ip))
                {
                    self.populator
                        .revoke_route(&RoutingKey::new(device.clone(), ip.to_host_prefix()));
                }
                self.install_redirect(host, &redirect, vlan, &host.ips);
                continue;
            }

            // Same device, other port.
            let prev_interfaces = self.interfaces.interfaces_at(prev_location);
            let vlan_survives = host.locations.iter().any(|location| {
                let interfaces = self.interfaces.interfaces_at(location);
                let tagged_ok = host
                    .vlan
                    .is_some_and(|vlan| admission::tagged_vlans(&interfaces).contains(&vlan));
                let internal = admission::internal_vlan(&interfaces);
                tagged_ok
                    || (internal.is_some()
                        && internal == admission::internal_vlan(&prev_interfaces))
            });
            if !vlan_survives {
                if let Some(vlan) = admission::admit(host.vlan, &prev_interfaces) {
                    self.populator.revoke_bridging(&BridgingKey {
                        device_id: device.clone(),
                        mac: host.mac,
                        vlan,
                    });
                }
            }
            for ip in &kept_ips {
                let still_routed = host
                    .locations
                    .iter()
                    .any(|location| self.device_config.in_same_subnet(location, ip));
                if !still_routed {
                    self.populator
                        .revoke_route(&RoutingKey::new(device.clone(), ip.to_host_prefix()));
                }
            }
        }

        for new_location in host.locations.difference(&prev.locations) {
            let installed = self.populate_location(host, new_location, &host.ips);
            if let Some(vlan) = installed {
                self.revoke_stale_bridging(host, new_location.device_id(), vlan);
            }
            self.populate_pair_redirect(host, new_location);

            if self.config.active_probing {
                if let Some(pair) = self.device_config.pair_device_id(new_location.device_id()) {
                    if let Some(pair_port) = self.device_config.pair_local_port(&pair) {
                        self.probe(host, new_location, &pair, pair_port);
                    }
                }
            }
        }

        for location in host.locations.intersection(&prev.locations) {
            self.update_location_ips(host, prev, location);
            self.prober.probe_host(host, location, ProbeMode::Verify);
            self.stats.probes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Applies an IP set change at every location and pair redirect.
    pub fn process_host_updated(&self, host: &Host, prev: &Host) -> Result<()> {
        info!("HostHandler: host {} updated {:?} -> {:?}", host.id(), prev.ips, host.ips);
        self.stats.updated.fetch_add(1, Ordering::Relaxed);

        for location in &host.locations {
            self.update_location_ips(host, prev, location);

            let Some((redirect, vlan)) = self.pair_redirect(host.vlan, location) else {
                continue;
            };
            let pair = redirect.device_id();
            if host.has_location_on(pair) {
                continue;
            }
            for ip in prev.ips.difference(&host.ips) {
                self.populator
                    .revoke_route(&RoutingKey::new(pair.clone(), ip.to_host_prefix()));
            }
            for ip in host.ips.difference(&prev.ips) {
                self.process_routing(&redirect, host, vlan, false, ip);
            }
            if self.config.active_probing {
                self.probe(host, location, pair, redirect.port());
            }
        }
        Ok(())
    }

    /// Reacts to a port coming up on a paired device by probing the hosts
    /// of the pair device that could also be reachable through it.
    pub fn process_port_up(&self, connect_point: &ConnectPoint) -> Result<()> {
        let device = connect_point.device_id();
        if self.device_config.pair_local_port(device) == Some(connect_point.port()) {
            return Ok(());
        }
        if !self.config.active_probing {
            return Ok(());
        }
        let Some(pair) = self.device_config.pair_device_id(device) else {
            return Ok(());
        };

        let interfaces = self.interfaces.interfaces_at(connect_point);
        let tagged = admission::tagged_vlans(&interfaces);
        let internal = admission::internal_vlan(&interfaces);
        for host in self.hosts.hosts_on_device(&pair) {
            let tagged_fit = host.vlan.is_some_and(|vlan| tagged.contains(&vlan));
            let internal_fit = internal.is_some()
                && host
                    .locations
                    .iter()
                    .filter(|location| location.device_id() == &pair)
                    .any(|location| {
                        admission::internal_vlan(&self.interfaces.interfaces_at(location))
                            == internal
                    });
            if tagged_fit || internal_fit {
                debug!("HostHandler: port {} up, probing {}", connect_point, host.id());
                self.prober.probe_host(&host, connect_point, ProbeMode::Discover);
                self.stats.probes.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reprograms hosts at `connect_point` after its VLAN policy changed.
    ///
    /// With `install` false the entries installed with `vlan` are revoked;
    /// with `install` true they are installed for hosts valid under the new
    /// policy.
    pub fn process_intf_vlan_updated(
        &self,
        connect_point: &ConnectPoint,
        vlan: VlanId,
        pop_vlan: bool,
        install: bool,
    ) -> Result<()> {
        info!(
            "HostHandler: VLAN {} {} at {}",
            vlan,
            if install { "added" } else { "removed" },
            connect_point
        );
        let device = connect_point.device_id();
        for host in self.hosts.connected_hosts(connect_point) {
            if !install {
                self.populator.revoke_bridging(&BridgingKey {
                    device_id: device.clone(),
                    mac: host.mac,
                    vlan,
                });
                for ip in &host.ips {
                    self.populator
                        .revoke_route(&RoutingKey::new(device.clone(), ip.to_host_prefix()));
                }
                continue;
            }

            let valid = if pop_vlan {
                host.is_untagged()
            } else {
                host.vlan == Some(vlan)
            };
            if !valid {
                continue;
            }
            self.populator.populate_bridging(BridgingEntry {
                device_id: device.clone(),
                mac: host.mac,
                vlan,
                port: connect_point.port(),
                pop_vlan,
            });
            for ip in &host.ips {
                self.process_routing(connect_point, &host, vlan, pop_vlan, ip);
            }
        }
        Ok(())
    }

    /// Installs or revokes host routes at `connect_point` after subnets were
    /// added to or removed from its interface.
    pub fn process_intf_ip_updated(
        &self,
        connect_point: &ConnectPoint,
        prefixes: &[IpPrefix],
        install: bool,
    ) -> Result<()> {
        let device = connect_point.device_id();
        let interfaces = self.interfaces.interfaces_at(connect_point);
        for host in self.hosts.connected_hosts(connect_point) {
            for ip in host
                .ips
                .iter()
                .filter(|ip| prefixes.iter().any(|prefix| prefix.contains(ip)))
            {
                if !install {
                    self.populator
                        .revoke_route(&RoutingKey::new(device.clone(), ip.to_host_prefix()));
                    continue;
                }
                if let Some(vlan) = admission::admit(host.vlan, &interfaces) {
                    self.install_route(connect_point, &host, vlan, host.is_untagged(), ip);
                }
            }
        }
        Ok(())
    }

    /// Ports of `device_id` used by dual-homed hosts.
    pub fn dual_homed_host_ports(&self, device_id: &DeviceId) -> BTreeSet<PortNumber> {
        self.hosts
            .hosts_on_device(device_id)
            .iter()
            .filter(|host| host.locations.len() == 2)
            .flat_map(|host| host.locations.iter())
            .filter(|location| location.device_id() == device_id)
            .map(ConnectPoint::port)
            .collect()
    }

    /// VLAN for a pair-link redirect of a host with `host_vlan` attached at
    /// `location`.
    pub fn vlan_for_pair_port(
        &self,
        host_vlan: Option<VlanId>,
        location: &ConnectPoint,
    ) -> Option<VlanId> {
        admission::vlan_for_pair_port(host_vlan, &self.interfaces.interfaces_at(location))
    }

    /// Pair-link connect point and VLAN the pair of `location`'s device
    /// uses to reach a host attached at `location`.
    fn pair_redirect(
        &self,
        host_vlan: Option<VlanId>,
        location: &ConnectPoint,
    ) -> Option<(ConnectPoint, VlanId)> {
        let pair = self.device_config.pair_device_id(location.device_id())?;
        let Some(pair_port) = self.device_config.pair_local_port(&pair) else {
            debug!("HostHandler: {} has no pair port", pair);
            return None;
        };
        let Some(vlan) = self.vlan_for_pair_port(host_vlan, location) else {
            debug!("HostHandler: no pair-link VLAN for {:?} at {}", host_vlan, location);
            return None;
        };
        Some((ConnectPoint::new(pair, pair_port), vlan))
    }

    /// Installs the redirect on the pair of `location`'s device unless the
    /// host is attached there too. Returns the redirect connect point.
    fn populate_pair_redirect(&self, host: &Host, location: &ConnectPoint) -> Option<ConnectPoint> {
        let (redirect, vlan) = self.pair_redirect(host.vlan, location)?;
        if host.has_location_on(redirect.device_id()) {
            return None;
        }
        self.install_redirect(host, &redirect, vlan, &host.ips);
        Some(redirect)
    }

    /// Revokes the redirect the pair of `location`'s device held for `host`.
    fn revoke_pair_redirect(&self, host: &Host, location: &ConnectPoint) {
        let Some((redirect, vlan)) = self.pair_redirect(host.vlan, location) else {
            return;
        };
        let pair = redirect.device_id();
        self.populator.revoke_bridging(&BridgingKey {
            device_id: pair.clone(),
            mac: host.mac,
            vlan,
        });
        for ip in &host.ips {
            self.populator
                .revoke_route(&RoutingKey::new(pair.clone(), ip.to_host_prefix()));
        }
    }

    /// Installs bridging and routing for `ips` at a real location. Returns
    /// the installed VLAN, or `None` when the location rejects the host.
    fn populate_location(
        &self,
        host: &Host,
        location: &ConnectPoint,
        ips: &BTreeSet<IpAddress>,
    ) -> Option<VlanId> {
        let Some(vlan) = self.location_vlan(host, location) else {
            debug!("HostHandler: {} not admitted at {}, skipping", host.id(), location);
            self.stats.locations_skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let pop_vlan = host.is_untagged();
        self.populator.populate_bridging(BridgingEntry {
            device_id: location.device_id().clone(),
            mac: host.mac,
            vlan,
            port: location.port(),
            pop_vlan,
        });
        for ip in ips {
            self.process_routing(location, host, vlan, pop_vlan, ip);
        }
        Some(vlan)
    }

    fn revoke_location(&self, host: &Host, location: &ConnectPoint, ips: &BTreeSet<IpAddress>) {
        let device = location.device_id();
        if let Some(vlan) = self.location_vlan(host, location) {
            self.populator.revoke_bridging(&BridgingKey {
                device_id: device.clone(),
                mac: host.mac,
                vlan,
            });
        }
        for ip in ips {
            self.populator
                .revoke_route(&RoutingKey::new(device.clone(), ip.to_host_prefix()));
        }
    }

    /// Redirect entries point at the pair link and keep the VLAN tag.
    fn install_redirect(
        &self,
        host: &Host,
        redirect: &ConnectPoint,
        vlan: VlanId,
        ips: &BTreeSet<IpAddress>,
    ) {
        self.populator.populate_bridging(BridgingEntry {
            device_id: redirect.device_id().clone(),
            mac: host.mac,
            vlan,
            port: redirect.port(),
            pop_vlan: false,
        });
        for ip in ips {
            self.process_routing(redirect, host, vlan, false, ip);
        }
    }

    /// Drops bridging entries for the host on `device_id` installed with a
    /// VLAN other than `keep`.
    fn revoke_stale_bridging(&self, host: &Host, device_id: &DeviceId, keep: VlanId) {
        for entry in self.populator.bridging_table().find(device_id, &host.mac) {
            if entry.vlan != keep {
                debug!("HostHandler: removing stale bridging {}", entry.key());
                self.populator.revoke_bridging(&entry.key());
            }
        }
    }

    fn update_location_ips(&self, host: &Host, prev: &Host, location: &ConnectPoint) {
        let device = location.device_id();
        for ip in prev.ips.difference(&host.ips) {
            self.populator
                .revoke_route(&RoutingKey::new(device.clone(), ip.to_host_prefix()));
        }
        let Some(vlan) = self.location_vlan(host, location) else {
            return;
        };
        for ip in host.ips.difference(&prev.ips) {
            self.process_routing(location, host, vlan, host.is_untagged(), ip);
        }
    }

    /// Installs a host route if `ip` belongs to a subnet of `connect_point`.
    fn process_routing(
        &self,
        connect_point: &ConnectPoint,
        host: &Host,
        vlan: VlanId,
        pop_vlan: bool,
        ip: &IpAddress,
    ) {
        if !self.device_config.in_same_subnet(connect_point, ip) {
            debug!("HostHandler: {} not in a subnet of {}, no route", ip, connect_point);
            return;
        }
        self.install_route(connect_point, host, vlan, pop_vlan, ip);
    }

    fn install_route(
        &self,
        connect_point: &ConnectPoint,
        host: &Host,
        vlan: VlanId,
        pop_vlan: bool,
        ip: &IpAddress,
    ) {
        self.populator.populate_route(RoutingEntry::direct(
            connect_point.device_id().clone(),
            ip.to_host_prefix(),
            host.mac,
            Some(vlan),
            connect_point.port(),
            pop_vlan,
        ));
    }

    fn location_vlan(&self, host: &Host, location: &ConnectPoint) -> Option<VlanId> {
        admission::admit(host.vlan, &self.interfaces.interfaces_at(location))
    }

    /// Deregisters subnets of routes via this host that no remaining next
    /// hop serves at `location`.
    fn revoke_orphaned_subnets(&self, host: &Host, location: &ConnectPoint) -> Result<()> {
        for route in self.routes.routes() {
            if !route.next_hops.iter().any(|nh| host.ips.contains(&nh.next_hop)) {
                continue;
            }
            let still_served = route
                .next_hops
                .iter()
                .filter(|nh| !host.ips.contains(&nh.next_hop) && nh.host_id() != host.id())
                .filter_map(|nh| self.hosts.host(&nh.host_id()))
                .any(|other| other.locations.contains(location));
            if still_served {
                continue;
            }
            self.populator.revoke_subnet(location, &route.prefix)?;
        }
        Ok(())
    }
}

impl EventHandler<HostEvent> for HostHandler {
    type Key = HostId;
    type Error = ControllerError;

    fn name(&self) -> &str {
        "HostHandler"
    }

    fn key(&self, event: &HostEvent) -> Self::Key {
        event.subject().id()
    }

    fn handle(&self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::Added { host } => self.process_host_added(&host),
            HostEvent::Removed { host } => self.process_host_removed(&host),
            HostEvent::Moved { host, prev } => self.process_host_moved(&host, &prev),
            HostEvent::Updated { host, prev } => self.process_host_updated(&host, &prev),
        }
    }
}
