//! In-memory collaborators.
//!
//! Used by `srcontrollerd` when replaying an event feed and by tests. All
//! types are cheap to share behind an `Arc` and safe to mutate while the
//! handlers read them.

mod cluster;
mod network;
mod stores;

pub use cluster::{StaticCluster, StaticMastership};
pub use network::{DevicePairing, NetworkConfig, SubnetCall};
pub use stores::{
    LoggingProber, LoggingProgrammer, MemoryHostDirectory, MemoryRouteStore, StaticDeviceService,
};
