//! Port interfaces and host VLAN admission.
//!
//! An [`Interface`] attaches a VLAN policy and a set of subnets to a
//! connect point. [`admission`] decides which VLAN tag a host's entries are
//! installed with on such a port, or whether the host is rejected there.

pub mod admission;
mod types;

pub use admission::{admit, install_vlan, internal_vlan, tagged_vlans, vlan_for_pair_port};
pub use types::{Interface, VlanPolicy};
