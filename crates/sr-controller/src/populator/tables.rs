//! Core-owned forwarding state.
//!
//! Routing and bridging tables are concurrent maps with last-writer-wins
//! semantics per key. The subnet table serialises every change so that the
//! external add/remove call for a (connect point, prefix) pair is issued
//! exactly once per membership change.

use super::types::{BridgingEntry, BridgingKey, RoutingEntry, RoutingKey};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use sr_types::{ConnectPoint, DeviceId, IpPrefix, MacAddress};
use std::collections::{BTreeMap, BTreeSet};

/// Routing entries keyed by (device, prefix).
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: DashMap<RoutingKey, RoutingEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RoutingKey) -> Option<RoutingEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &RoutingKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores `entry`, returning the entry it replaced.
    pub fn insert(&self, entry: RoutingEntry) -> Option<RoutingEntry> {
        self.entries.insert(entry.key(), entry)
    }

    pub fn remove(&self, key: &RoutingKey) -> Option<RoutingEntry> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for `prefix` on any device, ordered by device.
    pub fn entries_for_prefix(&self, prefix: &IpPrefix) -> Vec<RoutingEntry> {
        let mut found: Vec<RoutingEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.key().prefix == *prefix)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        found
    }

    /// Drops every entry on `device_id`, returning what was dropped.
    pub fn remove_device(&self, device_id: &DeviceId) -> Vec<RoutingEntry> {
        let keys: Vec<RoutingKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().device_id == *device_id)
            .map(|entry| entry.key().clone())
            .collect();
        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    /// All entries ordered by key.
    pub fn snapshot(&self) -> BTreeMap<RoutingKey, RoutingEntry> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

/// Bridging entries keyed by (device, MAC, installed VLAN).
#[derive(Debug, Default)]
pub struct BridgingTable {
    entries: DashMap<BridgingKey, BridgingEntry>,
}

impl BridgingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &BridgingKey) -> Option<BridgingEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &BridgingKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&self, entry: BridgingEntry) -> Option<BridgingEntry> {
        self.entries.insert(entry.key(), entry)
    }

    pub fn remove(&self, key: &BridgingKey) -> Option<BridgingEntry> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for `mac` on `device_id`, whatever their VLAN.
    pub fn find(&self, device_id: &DeviceId, mac: &MacAddress) -> Vec<BridgingEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.key().device_id == *device_id && entry.key().mac == *mac)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn remove_device(&self, device_id: &DeviceId) -> Vec<BridgingEntry> {
        let keys: Vec<BridgingKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().device_id == *device_id)
            .map(|entry| entry.key().clone())
            .collect();
        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    pub fn snapshot(&self) -> BTreeMap<BridgingKey, BridgingEntry> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

/// Prefixes registered as locally routed, per connect point.
#[derive(Debug, Default)]
pub struct SubnetTable {
    by_connect_point: Mutex<BTreeMap<ConnectPoint, BTreeSet<IpPrefix>>>,
}

impl SubnetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, connect_point: &ConnectPoint, prefix: &IpPrefix) -> bool {
        self.by_connect_point
            .lock()
            .get(connect_point)
            .is_some_and(|prefixes| prefixes.contains(prefix))
    }

    /// Connect points where `prefix` is registered.
    pub fn connect_points_for(&self, prefix: &IpPrefix) -> BTreeSet<ConnectPoint> {
        self.by_connect_point
            .lock()
            .iter()
            .filter(|(_, prefixes)| prefixes.contains(prefix))
            .map(|(cp, _)| cp.clone())
            .collect()
    }

    pub fn prefixes_at(&self, connect_point: &ConnectPoint) -> BTreeSet<IpPrefix> {
        self.by_connect_point
            .lock()
            .get(connect_point)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of (connect point, prefix) registrations.
    pub fn len(&self) -> usize {
        self.by_connect_point.lock().values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers `prefix` at `connect_point`.
    ///
    /// `register` runs under the table lock and only when the pair is not yet
    /// registered; the pair is recorded only if it succeeds. Returns whether
    /// the membership changed.
    pub fn add_with<E>(
        &self,
        connect_point: &ConnectPoint,
        prefix: &IpPrefix,
        register: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut table = self.by_connect_point.lock();
        if table
            .get(connect_point)
            .is_some_and(|prefixes| prefixes.contains(prefix))
        {
            return Ok(false);
        }
        register()?;
        table
            .entry(connect_point.clone())
            .or_default()
            .insert(*prefix);
        Ok(true)
    }

    /// Deregisters `prefix` at `connect_point`, running `deregister` under
    /// the table lock only when the pair is registered.
    pub fn remove_with<E>(
        &self,
        connect_point: &ConnectPoint,
        prefix: &IpPrefix,
        deregister: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut table = self.by_connect_point.lock();
        let Some(prefixes) = table.get_mut(connect_point) else {
            return Ok(false);
        };
        if !prefixes.contains(prefix) {
            return Ok(false);
        }
        deregister()?;
        prefixes.remove(prefix);
        if prefixes.is_empty() {
            table.remove(connect_point);
        }
        Ok(true)
    }

    pub fn snapshot(&self) -> BTreeMap<ConnectPoint, BTreeSet<IpPrefix>> {
        self.by_connect_point.lock().clone()
    }
}

/// Serialisable copy of all three tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    pub routing: Vec<RoutingEntry>,
    pub bridging: Vec<BridgingEntry>,
    pub subnets: BTreeMap<ConnectPoint, BTreeSet<IpPrefix>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cp(s: &str) -> ConnectPoint {
        s.parse().unwrap()
    }

    fn prefix(s: &str) -> IpPrefix {
        s.parse().unwrap()
    }

    #[test]
    fn test_subnet_add_is_exactly_once() {
        let table = SubnetTable::new();
        let mut calls = 0;
        for _ in 0..3 {
            table
                .add_with(&cp("of:1/1"), &prefix("10.0.0.0/24"), || {
                    calls += 1;
                    Ok::<(), ()>(())
                })
                .unwrap();
        }
        assert_eq!(calls, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_subnet_failed_register_not_recorded() {
        let table = SubnetTable::new();
        let result = table.add_with(&cp("of:1/1"), &prefix("10.0.0.0/24"), || Err("down"));
        assert_eq!(result, Err("down"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_subnet_remove_only_when_present() {
        let table = SubnetTable::new();
        let p = prefix("10.0.0.0/24");
        table.add_with(&cp("of:1/1"), &p, || Ok::<(), ()>(())).unwrap();
        table.add_with(&cp("of:2/2"), &p, || Ok::<(), ()>(())).unwrap();
        assert_eq!(
            table.connect_points_for(&p),
            [cp("of:1/1"), cp("of:2/2")].into_iter().collect()
        );

        let mut calls = 0;
        for _ in 0..2 {
            table
                .remove_with(&cp("of:1/1"), &p, || {
                    calls += 1;
                    Ok::<(), ()>(())
                })
                .unwrap();
        }
        assert_eq!(calls, 1);
        assert_eq!(table.connect_points_for(&p), [cp("of:2/2")].into_iter().collect());
        assert!(table.prefixes_at(&cp("of:1/1")).is_empty());
    }
}
