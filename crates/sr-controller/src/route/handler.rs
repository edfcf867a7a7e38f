//! Route event processing.

use super::resolve::InstallPlan;
use super::types::{ResolvedRoute, RouteEvent};
use crate::arbiter::OwnershipArbiter;
use crate::error::{ControllerError, Result};
use crate::host::{Host, HostEvent, HostId};
use crate::populator::{RoutingEntry, RoutingKey, RulePopulator};
use crate::services::{
    DeviceConfiguration, FabricServices, HostDirectory, InterfaceService, RouteService,
};
use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;
use sr_orch_common::EventHandler;
use sr_types::{ConnectPoint, DeviceId, IpPrefix};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How entries that are no longer desired are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconcile {
    /// Keep them as stale until the next-hop set empties.
    Defer,
    /// Like `Defer`, but sweep all stale entries once a device that never
    /// had an entry for the prefix is programmed.
    Alternatives,
    /// Link failover: remove live entries now, leave stale ones alone and
    /// do not touch subnets.
    Failover,
}

#[derive(Debug, Clone)]
struct Installed {
    entry: RoutingEntry,
    stale: bool,
}

#[derive(Debug, Default)]
struct PrefixState {
    next_hops: Vec<ResolvedRoute>,
    installed: BTreeMap<DeviceId, Installed>,
}

#[derive(Debug, Default)]
pub struct RouteHandlerStats {
    added: AtomicU64,
    updated: AtomicU64,
    alternatives_changed: AtomicU64,
    removed: AtomicU64,
    host_refreshes: AtomicU64,
    deferred: AtomicU64,
    swept: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteHandlerStatsSnapshot {
    pub added: u64,
    pub updated: u64,
    pub alternatives_changed: u64,
    pub removed: u64,
    pub host_refreshes: u64,
    pub deferred: u64,
    pub swept: u64,
}

impl RouteHandlerStats {
    pub fn snapshot(&self) -> RouteHandlerStatsSnapshot {
        RouteHandlerStatsSnapshot {
            added: self.added.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            alternatives_changed: self.alternatives_changed.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            host_refreshes: self.host_refreshes.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
        }
    }
}

/// Keeps routing entries and subnet registrations in line with the RIB
/// and with the locations of next-hop hosts.
pub struct RouteHandler {
    pub(super) arbiter: Arc<OwnershipArbiter>,
    pub(super) populator: Arc<RulePopulator>,
    pub(super) device_config: Arc<dyn DeviceConfiguration>,
    pub(super) interfaces: Arc<dyn InterfaceService>,
    pub(super) hosts: Arc<dyn HostDirectory>,
    routes: Arc<dyn RouteService>,
    prefixes: DashMap<IpPrefix, PrefixState>,
    /// Devices that lost a next-hop host while its pair kept it.
    pub(super) redirects: DashMap<HostId, BTreeSet<DeviceId>>,
    stats: RouteHandlerStats,
}

impl RouteHandler {
    pub fn new(services: &FabricServices, populator: Arc<RulePopulator>) -> Self {
        Self {
            arbiter: Arc::clone(populator.arbiter()),
            populator,
            device_config: Arc::clone(&services.device_config),
            interfaces: Arc::clone(&services.interfaces),
            hosts: Arc::clone(&services.hosts),
            routes: Arc::clone(&services.routes),
            prefixes: DashMap::new(),
            redirects: DashMap::new(),
            stats: RouteHandlerStats::default(),
        }
    }

    pub fn stats(&self) -> RouteHandlerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Next hops currently tracked for `prefix`.
    pub fn next_hops(&self, prefix: &IpPrefix) -> Vec<ResolvedRoute> {
        self.prefixes
            .get(prefix)
            .map(|state| state.next_hops.clone())
            .unwrap_or_default()
    }

    /// Devices holding an entry for `prefix`, stale ones included.
    pub fn installed_devices(&self, prefix: &IpPrefix) -> BTreeSet<DeviceId> {
        self.prefixes
            .get(prefix)
            .map(|state| state.installed.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Devices whose entry for `prefix` is kept only until the next-hop set
    /// empties.
    pub fn stale_devices(&self, prefix: &IpPrefix) -> BTreeSet<DeviceId> {
        self.prefixes
            .get(prefix)
            .map(|state| {
                state
                    .installed
                    .iter()
                    .filter(|(_, installed)| installed.stale)
                    .map(|(device, _)| device.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Devices redirecting traffic for a next-hop host over the pair link.
    pub fn redirect_devices(&self, id: &HostId) -> BTreeSet<DeviceId> {
        self.redirects
            .get(id)
            .map(|devices| devices.clone())
            .unwrap_or_default()
    }

    /// Reinstalls every route with a next hop on `device_id` or its pair.
    pub fn init(&self, device_id: &DeviceId) -> Result<()> {
        info!("RouteHandler: initializing routes on {}", device_id);
        let pair = self.device_config.pair_device_id(device_id);
        for route in self.routes.routes() {
            let touches = route.next_hops.iter().any(|next_hop| {
                self.hosts.host(&next_hop.host_id()).is_some_and(|host| {
                    host.has_location_on(device_id)
                        || pair.as_ref().is_some_and(|pair| host.has_location_on(pair))
                })
            });
            if !touches {
                continue;
            }
            let mut state = self.prefixes.entry(route.prefix).or_default();
            state.next_hops = normalize(route.next_hops);
            let plan = self.plan(route.prefix, &state.next_hops, None, None);
            self.apply(route.prefix, state.value_mut(), plan, Reconcile::Defer, true)?;
        }
        Ok(())
    }

    /// Forgets the entries recorded for a device that went away. Subnet
    /// registrations are kept.
    pub fn purge_device(&self, device_id: &DeviceId) -> usize {
        let mut forgotten = 0;
        for mut state in self.prefixes.iter_mut() {
            if state.installed.remove(device_id).is_some() {
                forgotten += 1;
            }
        }
        debug!("RouteHandler: forgot {} routes on {}", forgotten, device_id);
        forgotten
    }

    pub fn process_route_added(
        &self,
        prefix: IpPrefix,
        next_hops: Vec<ResolvedRoute>,
    ) -> Result<()> {
        info!("RouteHandler: route {} added via {} next hops", prefix, next_hops.len());
        self.stats.added.fetch_add(1, Ordering::Relaxed);
        self.set_next_hops(prefix, next_hops, Reconcile::Defer)
    }

    /// The old best route's entries are kept as stale; its subnets are
    /// deregistered right away.
    pub fn process_route_updated(
        &self,
        prefix: IpPrefix,
        next_hops: Vec<ResolvedRoute>,
    ) -> Result<()> {
        info!("RouteHandler: route {} updated, {} next hops", prefix, next_hops.len());
        self.stats.updated.fetch_add(1, Ordering::Relaxed);
        self.set_next_hops(prefix, next_hops, Reconcile::Defer)
    }

    pub fn process_alternatives_changed(
        &self,
        prefix: IpPrefix,
        next_hops: Vec<ResolvedRoute>,
    ) -> Result<()> {
        info!("RouteHandler: alternatives of {} changed, {} next hops", prefix, next_hops.len());
        self.stats.alternatives_changed.fetch_add(1, Ordering::Relaxed);
        self.set_next_hops(prefix, next_hops, Reconcile::Alternatives)
    }

    /// Purges every entry and subnet registration of `prefix`.
    pub fn process_route_removed(
        &self,
        prefix: IpPrefix,
        next_hops: &[ResolvedRoute],
    ) -> Result<()> {
        info!("RouteHandler: route {} removed", prefix);
        self.stats.removed.fetch_add(1, Ordering::Relaxed);

        let planned = self.plan(prefix, next_hops, None, None);
        let mut state = self
            .prefixes
            .remove(&prefix)
            .map(|(_, state)| state)
            .unwrap_or_default();
        self.purge(prefix, &mut state)?;
        for device in planned.entries.into_keys() {
            self.populator.revoke_route(&RoutingKey::new(device, prefix));
        }
        Ok(())
    }

    /// Installs entries for prefixes whose next hop just appeared.
    pub fn process_host_added(&self, host: &Host) -> Result<()> {
        self.refresh_next_hop(host.id(), Reconcile::Defer, Some(host), None)
    }

    /// Follows a next-hop host to its new locations. Subnets stay as they
    /// are.
    pub fn process_host_moved(&self, host: &Host, prev: &Host) -> Result<()> {
        if host.locations == prev.locations {
            return Ok(());
        }
        if host.locations.is_empty() {
            return self.process_host_gone(&host.id());
        }
        self.update_redirects(host, prev);
        self.refresh_next_hop(host.id(), Reconcile::Failover, Some(host), None)
    }

    pub fn process_host_removed(&self, host: &Host) -> Result<()> {
        self.process_host_gone(&host.id())
    }

    fn process_host_gone(&self, id: &HostId) -> Result<()> {
        self.redirects.remove(id);
        self.refresh_next_hop(*id, Reconcile::Failover, None, Some(id))
    }

    fn set_next_hops(
        &self,
        prefix: IpPrefix,
        next_hops: Vec<ResolvedRoute>,
        mode: Reconcile,
    ) -> Result<()> {
        let next_hops = normalize(next_hops);
        if next_hops.is_empty() {
            debug!("RouteHandler: {} has no next hop left", prefix);
            let mut state = self
                .prefixes
                .remove(&prefix)
                .map(|(_, state)| state)
                .unwrap_or_default();
            return self.purge(prefix, &mut state);
        }

        let mut state = self.prefixes.entry(prefix).or_default();
        state.next_hops = next_hops;
        let plan = self.plan(prefix, &state.next_hops, None, None);
        self.apply(prefix, state.value_mut(), plan, mode, false)
    }

    /// Re-resolves every prefix using `id` as a next hop.
    fn refresh_next_hop(
        &self,
        id: HostId,
        mode: Reconcile,
        moved: Option<&Host>,
        gone: Option<&HostId>,
    ) -> Result<()> {
        let affected: Vec<IpPrefix> = self
            .prefixes
            .iter()
            .filter(|state| state.next_hops.iter().any(|nh| nh.host_id() == id))
            .map(|state| *state.key())
            .collect();
        if affected.is_empty() {
            return Ok(());
        }
        self.stats.host_refreshes.fetch_add(1, Ordering::Relaxed);

        for prefix in affected {
            let Some(mut state) = self.prefixes.get_mut(&prefix) else {
                continue;
            };
            let sole_next_hop = state.next_hops.iter().all(|nh| nh.host_id() == id);
            if gone.is_some() && sole_next_hop {
                info!("RouteHandler: sole next hop {} of {} unreachable, purging", id, prefix);
                self.purge(prefix, state.value_mut())?;
                continue;
            }
            let plan = self.plan(prefix, &state.next_hops, moved, gone);
            self.apply(prefix, state.value_mut(), plan, mode, false)?;
        }
        Ok(())
    }

    /// Tracks which devices lost `host` while their pair still has it.
    fn update_redirects(&self, host: &Host, prev: &Host) {
        let id = host.id();
        let new_devices = host.devices();
        let mut devices = self.redirect_devices(&id);

        for prev_location in prev.locations.difference(&host.locations) {
            let device = prev_location.device_id();
            let Some(pair) = self.device_config.pair_device_id(device) else {
                continue;
            };
            if self.device_config.pair_local_port(device).is_none() {
                continue;
            }
            if new_devices.contains(&pair) && !new_devices.contains(device) {
                debug!("RouteHandler: {} lost {}, redirecting via {}", device, id, pair);
                devices.insert(device.clone());
            }
        }
        devices.retain(|device| {
            !new_devices.contains(device)
                && self
                    .device_config
                    .pair_device_id(device)
                    .is_some_and(|pair| new_devices.contains(&pair))
        });

        if devices.is_empty() {
            self.redirects.remove(&id);
        } else {
            self.redirects.insert(id, devices);
        }
    }

    fn apply(
        &self,
        prefix: IpPrefix,
        state: &mut PrefixState,
        plan: InstallPlan,
        mode: Reconcile,
        force: bool,
    ) -> Result<()> {
        let mut fresh = false;
        for (device, entry) in &plan.entries {
            let unchanged = state
                .installed
                .get(device)
                .is_some_and(|installed| !installed.stale && installed.entry == *entry);
            if unchanged && !force {
                continue;
            }
            if !state.installed.contains_key(device) {
                fresh = true;
            }
            if self.populator.populate_route(entry.clone()) {
                state.installed.insert(
                    device.clone(),
                    Installed {
                        entry: entry.clone(),
                        stale: false,
                    },
                );
            }
        }

        let undesired: Vec<DeviceId> = state
            .installed
            .keys()
            .filter(|device| !plan.entries.contains_key(*device))
            .cloned()
            .collect();
        for device in undesired {
            let Some(installed) = state.installed.get_mut(&device) else {
                continue;
            };
            let remove = match mode {
                Reconcile::Defer => false,
                Reconcile::Alternatives => fresh,
                Reconcile::Failover => !installed.stale,
            };
            if remove {
                let key = installed.entry.key();
                state.installed.remove(&device);
                self.populator.revoke_route(&key);
                self.stats.swept.fetch_add(1, Ordering::Relaxed);
            } else if !installed.stale {
                debug!("RouteHandler: deferring removal of {} on {}", prefix, device);
                installed.stale = true;
                self.stats.deferred.fetch_add(1, Ordering::Relaxed);
            }
        }

        if mode != Reconcile::Failover {
            self.sync_subnets(prefix, &plan.subnets)?;
        }
        Ok(())
    }

    /// Brings the subnet registrations of `prefix` to `desired`, touching
    /// only the connect points that differ.
    fn sync_subnets(&self, prefix: IpPrefix, desired: &BTreeSet<ConnectPoint>) -> Result<()> {
        let current = self.populator.subnet_table().connect_points_for(&prefix);
        for connect_point in current.difference(desired) {
            self.populator.revoke_subnet(connect_point, &prefix)?;
        }
        for connect_point in desired.difference(&current) {
            self.populator.populate_subnet(connect_point, &prefix)?;
        }
        Ok(())
    }

    fn purge(&self, prefix: IpPrefix, state: &mut PrefixState) -> Result<()> {
        for (_, installed) in std::mem::take(&mut state.installed) {
            self.populator.revoke_route(&installed.entry.key());
        }
        for connect_point in self.populator.subnet_table().connect_points_for(&prefix) {
            self.populator.revoke_subnet(&connect_point, &prefix)?;
        }
        Ok(())
    }
}

fn normalize(mut next_hops: Vec<ResolvedRoute>) -> Vec<ResolvedRoute> {
    next_hops.sort();
    next_hops.dedup();
    next_hops
}

impl EventHandler<RouteEvent> for RouteHandler {
    type Key = IpPrefix;
    type Error = ControllerError;

    fn name(&self) -> &str {
        "RouteHandler"
    }

    fn key(&self, event: &RouteEvent) -> IpPrefix {
        event.prefix()
    }

    fn handle(&self, event: RouteEvent) -> Result<()> {
        match event {
            RouteEvent::Added { prefix, next_hops } => self.process_route_added(prefix, next_hops),
            RouteEvent::Updated {
                prefix, next_hops, ..
            } => self.process_route_updated(prefix, next_hops),
            RouteEvent::AlternativesChanged {
                prefix, next_hops, ..
            } => self.process_alternatives_changed(prefix, next_hops),
            RouteEvent::Removed { prefix, next_hops } => {
                self.process_route_removed(prefix, &next_hops)
            }
        }
    }
}

impl EventHandler<HostEvent> for RouteHandler {
    type Key = HostId;
    type Error = ControllerError;

    fn name(&self) -> &str {
        "RouteHandler"
    }

    fn key(&self, event: &HostEvent) -> HostId {
        event.subject().id()
    }

    fn handle(&self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::Added { host } => self.process_host_added(&host),
            HostEvent::Moved { host, prev } => self.process_host_moved(&host, &prev),
            HostEvent::Removed { host } => self.process_host_removed(&host),
            HostEvent::Updated { .. } => Ok(()),
        }
    }
}
