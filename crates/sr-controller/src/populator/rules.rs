//! Ownership-gated entry installation.

use super::tables::{BridgingTable, RoutingTable, SubnetTable, TableSnapshot};
use super::types::{BridgingEntry, BridgingKey, RoutingEntry, RoutingKey};
use crate::arbiter::OwnershipArbiter;
use crate::error::ConfigError;
use crate::services::{DeviceConfiguration, FlowProgrammer};
use log::{debug, info, warn};
use serde::Serialize;
use sr_types::{ConnectPoint, DeviceId, IpPrefix};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PopulatorStats {
    installs: AtomicU64,
    removals: AtomicU64,
    skipped_not_owned: AtomicU64,
    subnet_adds: AtomicU64,
    subnet_removals: AtomicU64,
    subnet_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PopulatorStatsSnapshot {
    pub installs: u64,
    pub removals: u64,
    pub skipped_not_owned: u64,
    pub subnet_adds: u64,
    pub subnet_removals: u64,
    pub subnet_failures: u64,
}

impl PopulatorStats {
    pub fn snapshot(&self) -> PopulatorStatsSnapshot {
        PopulatorStatsSnapshot {
            installs: self.installs.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            skipped_not_owned: self.skipped_not_owned.load(Ordering::Relaxed),
            subnet_adds: self.subnet_adds.load(Ordering::Relaxed),
            subnet_removals: self.subnet_removals.load(Ordering::Relaxed),
            subnet_failures: self.subnet_failures.load(Ordering::Relaxed),
        }
    }
}

/// Records forwarding entries and pushes them southbound.
///
/// Installs are dropped for devices the local node does not program.
/// Revocations always clear the local record but only reach the switch when
/// the local node programs it. Southbound calls are fire-and-forget.
pub struct RulePopulator {
    arbiter: Arc<OwnershipArbiter>,
    device_config: Arc<dyn DeviceConfiguration>,
    programmer: Option<Arc<dyn FlowProgrammer>>,
    routing: RoutingTable,
    bridging: BridgingTable,
    subnets: SubnetTable,
    stats: PopulatorStats,
}

impl RulePopulator {
    pub fn new(
        arbiter: Arc<OwnershipArbiter>,
        device_config: Arc<dyn DeviceConfiguration>,
    ) -> Self {
        Self {
            arbiter,
            device_config,
            programmer: None,
            routing: RoutingTable::new(),
            bridging: BridgingTable::new(),
            subnets: SubnetTable::new(),
            stats: PopulatorStats::default(),
        }
    }

    pub fn with_programmer(mut self, programmer: Arc<dyn FlowProgrammer>) -> Self {
        self.programmer = Some(programmer);
        self
    }

    pub fn arbiter(&self) -> &Arc<OwnershipArbiter> {
        &self.arbiter
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn bridging_table(&self) -> &BridgingTable {
        &self.bridging
    }

    pub fn subnet_table(&self) -> &SubnetTable {
        &self.subnets
    }

    /// Installs a bridging entry. Returns false if the device is not
    /// programmed by the local node.
    pub fn populate_bridging(&self, entry: BridgingEntry) -> bool {
        if !self.arbiter.should_program(&entry.device_id) {
            debug!(
                "RulePopulator: not programming {}, skip bridging {}",
                entry.device_id,
                entry.key()
            );
            self.stats.skipped_not_owned.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if let Some(programmer) = &self.programmer {
            programmer.install_bridging(&entry);
        }
        debug!(
            "RulePopulator: bridging {} -> port {} pop {}",
            entry.key(),
            entry.port,
            entry.pop_vlan
        );
        self.bridging.insert(entry);
        self.stats.installs.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Removes a bridging entry. Returns true if one was recorded.
    pub fn revoke_bridging(&self, key: &BridgingKey) -> bool {
        let Some(entry) = self.bridging.remove(key) else {
            return false;
        };
        if self.arbiter.should_program(&key.device_id) {
            if let Some(programmer) = &self.programmer {
                programmer.remove_bridging(&entry);
            }
        }
        debug!("RulePopulator: revoked bridging {}", key);
        self.stats.removals.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Installs a routing entry. Returns false if the device is not
    /// programmed by the local node.
    pub fn populate_route(&self, entry: RoutingEntry) -> bool {
        if !self.arbiter.should_program(&entry.device_id) {
            debug!(
                "RulePopulator: not programming {}, skip route {}",
                entry.device_id,
                entry.key()
            );
            self.stats.skipped_not_owned.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if let Some(programmer) = &self.programmer {
            programmer.install_routing(&entry);
        }
        debug!("RulePopulator: route {} -> {:?}", entry.key(), entry.egress);
        self.routing.insert(entry);
        self.stats.installs.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Removes a routing entry. Returns true if one was recorded.
    pub fn revoke_route(&self, key: &RoutingKey) -> bool {
        let Some(entry) = self.routing.remove(key) else {
            return false;
        };
        if self.arbiter.should_program(&key.device_id) {
            if let Some(programmer) = &self.programmer {
                programmer.remove_routing(&entry);
            }
        }
        debug!("RulePopulator: revoked route {}", key);
        self.stats.removals.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Registers `prefix` as locally routed at `connect_point`.
    ///
    /// The configuration store is written only if the registration is new.
    /// Returns whether it was.
    pub fn populate_subnet(
        &self,
        connect_point: &ConnectPoint,
        prefix: &IpPrefix,
    ) -> Result<bool, ConfigError> {
        let added = self
            .subnets
            .add_with(connect_point, prefix, || {
                self.device_config.add_subnet(connect_point, prefix)
            })
            .map_err(|e| {
                warn!("RulePopulator: {}", e);
                self.stats.subnet_failures.fetch_add(1, Ordering::Relaxed);
                e
            })?;
        if added {
            info!("RulePopulator: subnet {} registered at {}", prefix, connect_point);
            self.stats.subnet_adds.fetch_add(1, Ordering::Relaxed);
        }
        Ok(added)
    }

    /// Deregisters `prefix` at `connect_point` if registered.
    pub fn revoke_subnet(
        &self,
        connect_point: &ConnectPoint,
        prefix: &IpPrefix,
    ) -> Result<bool, ConfigError> {
        let removed = self
            .subnets
            .remove_with(connect_point, prefix, || {
                self.device_config.remove_subnet(connect_point, prefix)
            })
            .map_err(|e| {
                warn!("RulePopulator: {}", e);
                self.stats.subnet_failures.fetch_add(1, Ordering::Relaxed);
                e
            })?;
        if removed {
            info!("RulePopulator: subnet {} deregistered at {}", prefix, connect_point);
            self.stats.subnet_removals.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    /// Forgets everything recorded for a device that went away. No
    /// southbound or configuration calls are made.
    /// Forgets the forwarding entries of a device that went away.
    ///
    /// Subnet registrations stay: the device configuration still holds them,
    /// and a later reinstall diffs against them instead of adding twice.
    pub fn purge_device(&self, device_id: &DeviceId) -> usize {
        let routes = self.routing.remove_device(device_id).len();
        let bridges = self.bridging.remove_device(device_id).len();
        info!(
            "RulePopulator: purged {} routes, {} bridging entries of {}",
            routes, bridges, device_id
        );
        routes + bridges
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            routing: self.routing.snapshot().into_values().collect(),
            bridging: self.bridging.snapshot().into_values().collect(),
            subnets: self.subnets.snapshot(),
        }
    }

    pub fn stats(&self) -> PopulatorStatsSnapshot {
        self.stats.snapshot()
    }
}
