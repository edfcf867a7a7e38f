//! Desired state of one prefix.

use super::handler::RouteHandler;
use super::types::ResolvedRoute;
use crate::host::{Host, HostId};
use crate::interface::admission;
use crate::populator::{NextHopAction, RoutingEntry};
use log::debug;
use sr_types::{ConnectPoint, DeviceId, IpPrefix};
use std::collections::{BTreeMap, BTreeSet};

/// Entries and subnet registrations a prefix should have.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct InstallPlan {
    pub entries: BTreeMap<DeviceId, RoutingEntry>,
    pub subnets: BTreeSet<ConnectPoint>,
}

impl RouteHandler {
    /// Resolves `next_hops` into per-device entries on devices the local
    /// node programs.
    ///
    /// `moved` overrides the host directory for one host whose event is
    /// being processed; `gone` marks a host with no locations.
    pub(super) fn plan(
        &self,
        prefix: IpPrefix,
        next_hops: &[ResolvedRoute],
        moved: Option<&Host>,
        gone: Option<&HostId>,
    ) -> InstallPlan {
        let mut direct: BTreeMap<DeviceId, BTreeSet<NextHopAction>> = BTreeMap::new();
        let mut redirect: BTreeMap<DeviceId, BTreeSet<NextHopAction>> = BTreeMap::new();
        let mut subnets = BTreeSet::new();

        for next_hop in next_hops {
            let id = next_hop.host_id();
            let locations = if gone == Some(&id) {
                BTreeSet::new()
            } else {
                match moved {
                    Some(host) if host.id() == id => host.locations.clone(),
                    _ => self
                        .hosts
                        .host(&id)
                        .map(|host| host.locations)
                        .unwrap_or_default(),
                }
            };
            if locations.is_empty() {
                debug!(
                    "RouteHandler: next hop {} of {} has no location",
                    next_hop.next_hop, prefix
                );
                continue;
            }

            for location in &locations {
                let device = location.device_id();
                if !self.arbiter.should_program(device) {
                    continue;
                }
                direct.entry(device.clone()).or_default().insert(NextHopAction {
                    port: location.port(),
                    mac: next_hop.next_hop_mac,
                    vlan: next_hop.next_hop_vlan,
                });
                subnets.insert(location.clone());
            }

            if locations.len() == 1 {
                if let Some((pair, action)) = self.redirect_for(next_hop, &id, &locations) {
                    redirect.entry(pair).or_default().insert(action);
                }
            }
        }

        let mut entries = BTreeMap::new();
        for (device, actions) in direct {
            if let Some(entry) = RoutingEntry::from_actions(device.clone(), prefix, actions) {
                entries.insert(device, entry);
            }
        }
        for (device, actions) in redirect {
            if entries.contains_key(&device) {
                continue;
            }
            if let Some(entry) = RoutingEntry::from_actions(device.clone(), prefix, actions) {
                entries.insert(device, entry);
            }
        }
        InstallPlan { entries, subnets }
    }

    /// Pair-link redirect for a next hop attached to a single leaf.
    fn redirect_for(
        &self,
        next_hop: &ResolvedRoute,
        id: &HostId,
        locations: &BTreeSet<ConnectPoint>,
    ) -> Option<(DeviceId, NextHopAction)> {
        let location = locations.iter().next()?;
        let pair = self.device_config.pair_device_id(location.device_id())?;
        let learnt = self
            .redirects
            .get(id)
            .is_some_and(|devices| devices.contains(&pair));
        let admitted = admission::vlan_for_pair_port(
            next_hop.next_hop_vlan,
            &self.interfaces.interfaces_at(location),
        )
        .is_some();
        if !learnt && !admitted {
            return None;
        }
        let port = self.device_config.pair_local_port(&pair)?;
        if !self.arbiter.should_program(&pair) {
            return None;
        }
        Some((
            pair,
            NextHopAction {
                port,
                mac: next_hop.next_hop_mac,
                vlan: next_hop.next_hop_vlan,
            },
        ))
    }
}
