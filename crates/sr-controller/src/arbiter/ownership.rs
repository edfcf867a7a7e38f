//! Cached per-device ownership decision.

use super::order::{LexicographicOrder, NodeOrder};
use crate::services::{ClusterService, DeviceConfiguration, MastershipService};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;
use sr_types::{DeviceId, NodeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache counters.
#[derive(Debug, Default)]
pub struct ArbiterStats {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArbiterStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

impl ArbiterStats {
    pub fn snapshot(&self) -> ArbiterStatsSnapshot {
        ArbiterStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Decides whether the local node programs a device.
///
/// Decisions are cached per single device id. The cache is never keyed by
/// a pair; a mastership change must invalidate both devices of the pair via
/// [`OwnershipArbiter::on_mastership_changed`].
pub struct OwnershipArbiter {
    mastership: Arc<dyn MastershipService>,
    cluster: Arc<dyn ClusterService>,
    device_config: Arc<dyn DeviceConfiguration>,
    order: Arc<dyn NodeOrder>,
    cache: DashMap<DeviceId, bool>,
    stats: ArbiterStats,
}

impl OwnershipArbiter {
    pub fn new(
        mastership: Arc<dyn MastershipService>,
        cluster: Arc<dyn ClusterService>,
        device_config: Arc<dyn DeviceConfiguration>,
    ) -> Self {
        Self {
            mastership,
            cluster,
            device_config,
            order: Arc::new(LexicographicOrder),
            cache: DashMap::new(),
            stats: ArbiterStats::default(),
        }
    }

    /// Replaces the node order. Must match on every cluster member.
    pub fn with_order(mut self, order: Arc<dyn NodeOrder>) -> Self {
        self.order = order;
        self
    }

    /// Returns true if the local node should program `device_id`.
    ///
    /// An indeterminate decision (no master for the device or its pair) is
    /// `false` and is not cached.
    pub fn should_program(&self, device_id: &DeviceId) -> bool {
        if let Some(cached) = self.cache.get(device_id) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return *cached;
        }

        // Computed under the entry lock so a concurrent invalidate cannot be
        // overtaken by a decision made from the old mastership.
        match self.cache.entry(device_id.clone()) {
            Entry::Occupied(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                *entry.get()
            }
            Entry::Vacant(entry) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                let Some(winner) = self.elect(device_id) else {
                    debug!("OwnershipArbiter: no master for {} or its pair", device_id);
                    return false;
                };
                let local = self.cluster.local_node_id();
                let decision = winner == local;
                debug!(
                    "OwnershipArbiter: {} elected for {}, local node {} programs: {}",
                    winner, device_id, local, decision
                );
                entry.insert(decision);
                decision
            }
        }
    }

    /// Node that programs `device_id` and its pair, uncached.
    pub fn elect(&self, device_id: &DeviceId) -> Option<NodeId> {
        let own = self.mastership.master_of(device_id);
        let pair = self
            .device_config
            .pair_device_id(device_id)
            .and_then(|pair| self.mastership.master_of(&pair));

        own.into_iter()
            .chain(pair)
            .min_by(|a, b| self.order.compare(a, b))
    }

    /// Returns true if the local node is the master of `device_id` itself,
    /// regardless of the pair.
    pub fn is_local_master(&self, device_id: &DeviceId) -> bool {
        self.mastership.master_of(device_id) == Some(self.cluster.local_node_id())
    }

    /// Cached decision for `device_id`, if any.
    pub fn cached(&self, device_id: &DeviceId) -> Option<bool> {
        self.cache.get(device_id).map(|decision| *decision)
    }

    /// Drops the cached decision for one device.
    pub fn invalidate(&self, device_id: &DeviceId) {
        if self.cache.remove(device_id).is_some() {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drops the cached decisions for `device_id` and its pair.
    ///
    /// Must run synchronously on every mastership change, before any event
    /// that could consult the cache.
    pub fn on_mastership_changed(&self, device_id: &DeviceId) {
        info!("OwnershipArbiter: mastership changed for {}", device_id);
        self.invalidate(device_id);
        if let Some(pair) = self.device_config.pair_device_id(device_id) {
            self.invalidate(&pair);
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> ArbiterStatsSnapshot {
        self.stats.snapshot()
    }
}
