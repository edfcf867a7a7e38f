//! Host VLAN admission.
//!
//! | port policy            | host VLAN      | installed VLAN |
//! |------------------------|----------------|----------------|
//! | untagged X             | none           | X              |
//! | tagged S, native N     | none           | N if set       |
//! | tagged S               | v in S         | v              |
//! | anything else          |                | rejected       |

use super::types::{Interface, VlanPolicy};
use sr_types::VlanId;
use std::collections::BTreeSet;

/// VLAN a host with `host_vlan` is installed with on a port with `policy`,
/// or `None` if the port rejects it.
pub fn install_vlan(host_vlan: Option<VlanId>, policy: &VlanPolicy) -> Option<VlanId> {
    match (policy, host_vlan) {
        (VlanPolicy::Untagged(vlan), None) => Some(*vlan),
        (VlanPolicy::Tagged { native, .. }, None) => *native,
        (VlanPolicy::Tagged { tagged, .. }, Some(vlan)) if tagged.contains(&vlan) => Some(vlan),
        _ => None,
    }
}

/// Applies [`install_vlan`] to every interface at one connect point; the
/// first interface that admits the host decides.
pub fn admit(host_vlan: Option<VlanId>, interfaces: &[Interface]) -> Option<VlanId> {
    interfaces
        .iter()
        .find_map(|intf| install_vlan(host_vlan, &intf.vlan))
}

/// Untagged or native VLAN configured at a connect point.
pub fn internal_vlan(interfaces: &[Interface]) -> Option<VlanId> {
    interfaces.iter().find_map(|intf| intf.vlan.internal_vlan())
}

/// Union of the tagged VLANs configured at a connect point.
pub fn tagged_vlans(interfaces: &[Interface]) -> BTreeSet<VlanId> {
    interfaces
        .iter()
        .filter_map(|intf| intf.vlan.tagged_vlans())
        .flatten()
        .copied()
        .collect()
}

/// VLAN used for a pair-link redirect of a host located on `interfaces`.
///
/// The pair link is a trunk carrying every VLAN of the pair, so the redirect
/// keeps a tagged host's own VLAN when the location carries it tagged, and
/// uses the location's internal VLAN for an untagged host.
pub fn vlan_for_pair_port(host_vlan: Option<VlanId>, interfaces: &[Interface]) -> Option<VlanId> {
    match host_vlan {
        Some(vlan) if tagged_vlans(interfaces).contains(&vlan) => Some(vlan),
        Some(_) => None,
        None => internal_vlan(interfaces),
    }
}
