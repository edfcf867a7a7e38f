//! Static cluster membership and mastership.

use crate::services::{ClusterService, MastershipService};
use parking_lot::RwLock;
use sr_types::{DeviceId, NodeId};
use std::collections::BTreeMap;

/// Mastership map that can be changed at runtime.
#[derive(Debug, Default)]
pub struct StaticMastership {
    masters: RwLock<BTreeMap<DeviceId, NodeId>>,
}

impl StaticMastership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(masters: BTreeMap<DeviceId, NodeId>) -> Self {
        Self {
            masters: RwLock::new(masters),
        }
    }

    /// Sets or clears the master of `device_id`.
    pub fn set_master(&self, device_id: &DeviceId, master: Option<NodeId>) {
        let mut masters = self.masters.write();
        match master {
            Some(node) => {
                masters.insert(device_id.clone(), node);
            }
            None => {
                masters.remove(device_id);
            }
        }
    }
}

impl MastershipService for StaticMastership {
    fn master_of(&self, device_id: &DeviceId) -> Option<NodeId> {
        self.masters.read().get(device_id).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct StaticCluster {
    local: NodeId,
}

impl StaticCluster {
    pub fn new(local: NodeId) -> Self {
        Self { local }
    }
}

impl ClusterService for StaticCluster {
    fn local_node_id(&self) -> NodeId {
        self.local.clone()
    }
}
