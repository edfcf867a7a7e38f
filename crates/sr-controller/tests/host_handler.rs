//! Host location handling against the in-memory fabric.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use sr_controller::host::{HostHandlerConfig, ProbeMode};
use sr_controller::interface::{Interface, VlanPolicy};
use sr_controller::populator::Egress;
use sr_controller::ControllerError;
use sr_types::PortNumber;

fn port(n: u64) -> PortNumber {
    PortNumber::new(n)
}

#[test]
fn test_single_homed_host_gets_pair_redirect() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();

    assert_eq!(f.bridging_port(1, mac(1), vlan(10)), Some((port(1), true)));
    let direct = f.route(1, host_prefix("10.0.1.1")).unwrap();
    assert_eq!(direct.egress, Egress::Port(port(1)));
    assert_eq!(direct.next_hop_vlan, Some(vlan(10)));
    assert!(direct.pop_vlan);

    // Redirect on the pair keeps the tag and points at the pair link.
    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), Some((port(PAIR_PORT), false)));
    let redirect = f.route(2, host_prefix("10.0.1.1")).unwrap();
    assert_eq!(redirect.egress, Egress::Port(port(PAIR_PORT)));
    assert!(!redirect.pop_vlan);

    // The pair is probed on its host ports carrying VLAN 10, never on the
    // pair link.
    assert_eq!(f.prober.probes(), vec![(mac(1), cp(2, 1), ProbeMode::Discover)]);
}

#[test]
fn test_host_added_twice_is_idempotent() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();
    let once = f.populator.snapshot();

    f.hosts.process_host_added(&h1).unwrap();
    assert_eq!(f.populator.snapshot(), once);
    assert_eq!(f.populator.bridging_table().len(), 2);
    assert_eq!(f.populator.routing_table().len(), 2);
}

#[test]
fn test_dual_homed_host_has_no_redirect() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1), cp(2, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();

    assert_eq!(f.bridging_port(1, mac(1), vlan(10)), Some((port(1), true)));
    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), Some((port(1), true)));
    assert_eq!(f.route(2, host_prefix("10.0.1.1")).unwrap().port(), Some(port(1)));
    assert!(f.prober.probes().is_empty());
    assert_eq!(f.hosts.dual_homed_host_ports(&dev(1)), [port(1)].into_iter().collect());
}

#[test]
fn test_tagged_host() {
    let f = Fixture::new();
    let h2 = host(2, Some(vlan(20)), &[cp(1, 2)], &["10.0.2.1"]);
    f.fabric.hosts.upsert(h2.clone());
    f.hosts.process_host_added(&h2).unwrap();

    assert_eq!(f.bridging_port(1, mac(2), vlan(20)), Some((port(2), false)));
    let route = f.route(1, host_prefix("10.0.2.1")).unwrap();
    assert_eq!(route.next_hop_vlan, Some(vlan(20)));
    assert!(!route.pop_vlan);
    assert_eq!(f.bridging_port(2, mac(2), vlan(20)), Some((port(PAIR_PORT), false)));
}

#[test]
fn test_rejected_locations_are_skipped() {
    let f = Fixture::new();
    // Tagged host on an access port, and a host on a port with no interface.
    let wrong_vlan = host(3, Some(vlan(30)), &[cp(1, 1)], &["10.0.1.3"]);
    let no_intf = host(4, None, &[cp(1, 5)], &["10.0.1.4"]);
    for h in [&wrong_vlan, &no_intf] {
        f.fabric.hosts.upsert(h.clone());
        f.hosts.process_host_added(h).unwrap();
    }

    assert!(f.populator.bridging_table().find(&dev(1), &mac(3)).is_empty());
    assert!(f.populator.bridging_table().find(&dev(1), &mac(4)).is_empty());
    assert!(f.populator.bridging_table().find(&dev(2), &mac(3)).is_empty());
    assert_eq!(f.hosts.stats().locations_skipped, 2);
}

#[test]
fn test_host_route_requires_subnet() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.9.1"]);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();

    assert!(f.bridging_port(1, mac(1), vlan(10)).is_some());
    assert!(f.route(1, host_prefix("10.0.9.1")).is_none());
}

#[test]
fn test_added_at_foreign_location_is_an_error() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &[]);
    let err = f.hosts.process_host_added_at_location(&h1, &cp(2, 1)).unwrap_err();
    assert!(matches!(err, ControllerError::InvalidLocation { .. }));
}

#[test]
fn test_not_programmed_when_not_owner() {
    let f = Fixture::with_local("n2", HostHandlerConfig::default());
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();

    assert!(f.populator.bridging_table().is_empty());
    assert!(f.populator.routing_table().is_empty());
    assert!(f.populator.stats().skipped_not_owned > 0);
}

#[test]
fn test_host_removed_revokes_redirect() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();
    assert_eq!(f.populator.bridging_table().len(), 2);

    f.fabric.hosts.remove(&h1.id());
    f.hosts.process_host_removed(&h1).unwrap();
    assert!(f.populator.bridging_table().is_empty());
    assert!(f.populator.routing_table().is_empty());
}

#[test]
fn test_move_dual_to_single_redirects_lost_leaf() {
    let f = Fixture::new();
    let prev = host(1, None, &[cp(1, 1), cp(2, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(prev.clone());
    f.hosts.process_host_added(&prev).unwrap();
    f.prober.clear();

    let moved = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(moved.clone());
    f.hosts.process_host_moved(&moved, &prev).unwrap();

    assert_eq!(f.bridging_port(1, mac(1), vlan(10)), Some((port(1), true)));
    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), Some((port(PAIR_PORT), false)));
    assert_eq!(
        f.route(2, host_prefix("10.0.1.1")).unwrap().egress,
        Egress::Port(port(PAIR_PORT))
    );
    assert_eq!(f.prober.probes(), vec![(mac(1), cp(1, 1), ProbeMode::Verify)]);
    assert_eq!(f.hosts.stats().moved, 1);
}

#[test]
fn test_move_single_to_dual_replaces_redirect() {
    let f = Fixture::new();
    let prev = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(prev.clone());
    f.hosts.process_host_added(&prev).unwrap();
    f.prober.clear();

    let moved = host(1, None, &[cp(1, 1), cp(2, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(moved.clone());
    f.hosts.process_host_moved(&moved, &prev).unwrap();

    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), Some((port(1), true)));
    assert_eq!(f.route(2, host_prefix("10.0.1.1")).unwrap().port(), Some(port(1)));
    assert_eq!(
        f.prober.probes(),
        vec![
            (mac(1), cp(1, 1), ProbeMode::Discover),
            (mac(1), cp(1, 1), ProbeMode::Verify),
        ]
    );
}

#[test]
fn test_move_to_other_device_revokes_old_location() {
    let f = Fixture::new();
    let prev = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(prev.clone());
    f.hosts.process_host_added(&prev).unwrap();

    let moved = host(1, None, &[cp(3, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(moved.clone());
    f.hosts.process_host_moved(&moved, &prev).unwrap();

    assert_eq!(f.bridging_port(1, mac(1), vlan(10)), None);
    assert!(f.route(1, host_prefix("10.0.1.1")).is_none());
    assert_eq!(f.bridging_port(3, mac(1), vlan(30)), Some((port(1), true)));
    // 10.0.1.1 is outside the subnets of of:3/1.
    assert!(f.route(3, host_prefix("10.0.1.1")).is_none());
    // Nothing on of:2 points at the pair link any more.
    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), None);
    assert!(f.route(2, host_prefix("10.0.1.1")).is_none());
}

#[test]
fn test_move_away_then_removed_leaves_no_entries() {
    let f = Fixture::new();
    let prev = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(prev.clone());
    f.hosts.process_host_added(&prev).unwrap();

    let moved = host(1, None, &[cp(3, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(moved.clone());
    f.hosts.process_host_moved(&moved, &prev).unwrap();

    f.fabric.hosts.remove(&moved.id());
    f.hosts.process_host_removed(&moved).unwrap();
    assert!(f.populator.bridging_table().is_empty());
    assert!(f.populator.routing_table().is_empty());
}

#[test]
fn test_move_onto_paired_leaf_installs_redirect() {
    let f = Fixture::new();
    let prev = host(1, None, &[cp(3, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(prev.clone());
    f.hosts.process_host_added(&prev).unwrap();

    let moved = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(moved.clone());
    f.hosts.process_host_moved(&moved, &prev).unwrap();

    assert_eq!(f.bridging_port(3, mac(1), vlan(30)), None);
    assert_eq!(f.bridging_port(1, mac(1), vlan(10)), Some((port(1), true)));
    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), Some((port(PAIR_PORT), false)));
    assert_eq!(
        f.route(2, host_prefix("10.0.1.1")).unwrap().egress,
        Egress::Port(port(PAIR_PORT))
    );
    assert_eq!(f.prober.probes(), vec![(mac(1), cp(2, 1), ProbeMode::Discover)]);

    // Same tables as a host that was discovered there directly.
    let direct = Fixture::new();
    direct.fabric.hosts.upsert(moved.clone());
    direct.hosts.process_host_added(&moved).unwrap();
    assert_eq!(f.populator.snapshot(), direct.populator.snapshot());
}

#[test]
fn test_dual_homed_host_loses_and_regains_leaf() {
    let f = Fixture::new();
    let dual = host(1, None, &[cp(1, 1), cp(2, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(dual.clone());
    f.hosts.process_host_added(&dual).unwrap();
    let before = f.populator.snapshot();

    let single = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(single.clone());
    f.hosts.process_host_moved(&single, &dual).unwrap();
    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), Some((port(PAIR_PORT), false)));

    f.fabric.hosts.upsert(dual.clone());
    f.hosts.process_host_moved(&dual, &single).unwrap();
    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), Some((port(1), true)));
    let route = f.route(2, host_prefix("10.0.1.1")).unwrap();
    assert_eq!(route.egress, Egress::Port(port(1)));
    assert!(route.pop_vlan);
    assert_eq!(f.populator.snapshot(), before);
}

#[test]
fn test_lost_leaf_redirect_uses_remaining_leaf_vlan() {
    let f = Fixture::new();
    f.fabric.network.add_interface(
        Interface::new(cp(2, 3), VlanPolicy::untagged(vlan(11)))
            .with_subnet(prefix("10.0.1.254/24")),
    );
    let dual = host(1, None, &[cp(1, 1), cp(2, 3)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(dual.clone());
    f.hosts.process_host_added(&dual).unwrap();
    assert_eq!(f.bridging_port(2, mac(1), vlan(11)), Some((port(3), true)));

    let single = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(single.clone());
    f.hosts.process_host_moved(&single, &dual).unwrap();
    assert_eq!(f.bridging_port(2, mac(1), vlan(11)), None);
    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), Some((port(PAIR_PORT), false)));

    f.fabric.hosts.remove(&single.id());
    f.hosts.process_host_removed(&single).unwrap();
    assert!(f.populator.bridging_table().is_empty());
    assert!(f.populator.routing_table().is_empty());
}

#[test]
fn test_move_without_location_change_is_ignored() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.hosts.process_host_moved(&h1, &h1).unwrap();
    assert_eq!(f.hosts.stats().moved, 0);
    assert!(f.populator.bridging_table().is_empty());
}

#[test]
fn test_updated_ips_follow_location_and_redirect() {
    let f = Fixture::new();
    let prev = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(prev.clone());
    f.hosts.process_host_added(&prev).unwrap();

    let updated = host(1, None, &[cp(1, 1)], &["10.0.1.2"]);
    f.fabric.hosts.upsert(updated.clone());
    f.hosts.process_host_updated(&updated, &prev).unwrap();

    for device in [1, 2] {
        assert!(f.route(device, host_prefix("10.0.1.1")).is_none());
        assert!(f.route(device, host_prefix("10.0.1.2")).is_some());
    }
    assert_eq!(f.hosts.stats().updated, 1);
}

#[test]
fn test_init_reinstalls_pair_redirect() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(h1);

    f.hosts.init(&dev(2)).unwrap();
    assert_eq!(f.bridging_port(1, mac(1), vlan(10)), Some((port(1), true)));
    assert_eq!(f.bridging_port(2, mac(1), vlan(10)), Some((port(PAIR_PORT), false)));
}

#[test]
fn test_port_up_probes_pair_hosts() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    let h2 = host(2, Some(vlan(20)), &[cp(1, 2)], &["10.0.2.1"]);
    f.fabric.hosts.upsert(h1);
    f.fabric.hosts.upsert(h2);

    f.hosts.process_port_up(&cp(2, 1)).unwrap();
    assert_eq!(f.prober.probes(), vec![(mac(1), cp(2, 1), ProbeMode::Discover)]);

    f.prober.clear();
    f.hosts.process_port_up(&cp(2, PAIR_PORT)).unwrap();
    assert!(f.prober.probes().is_empty());
}

#[test]
fn test_probing_modes() {
    let extra = |f: &Fixture| {
        f.fabric
            .network
            .add_interface(Interface::new(cp(2, 3), VlanPolicy::untagged(vlan(10))));
    };
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);

    let f = Fixture::new();
    extra(&f);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();
    assert_eq!(
        f.prober.probes(),
        vec![
            (mac(1), cp(2, 1), ProbeMode::Discover),
            (mac(1), cp(2, 3), ProbeMode::Discover),
        ]
    );

    let f = Fixture::with_local(
        "n1",
        HostHandlerConfig {
            active_probing: true,
            symmetric_probing: true,
        },
    );
    extra(&f);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();
    assert_eq!(f.prober.probes(), vec![(mac(1), cp(2, 1), ProbeMode::Discover)]);

    let f = Fixture::new();
    extra(&f);
    f.fabric.devices.set_port_enabled(&cp(2, 3), false);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();
    assert_eq!(f.prober.probes(), vec![(mac(1), cp(2, 1), ProbeMode::Discover)]);

    let f = Fixture::with_local(
        "n1",
        HostHandlerConfig {
            active_probing: false,
            symmetric_probing: false,
        },
    );
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();
    assert!(f.prober.probes().is_empty());
}

#[test]
fn test_interface_vlan_removed_and_restored() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();

    f.hosts
        .process_intf_vlan_updated(&cp(1, 1), vlan(10), true, false)
        .unwrap();
    assert_eq!(f.bridging_port(1, mac(1), vlan(10)), None);
    assert!(f.route(1, host_prefix("10.0.1.1")).is_none());

    f.hosts
        .process_intf_vlan_updated(&cp(1, 1), vlan(10), true, true)
        .unwrap();
    assert_eq!(f.bridging_port(1, mac(1), vlan(10)), Some((port(1), true)));
    assert!(f.route(1, host_prefix("10.0.1.1")).is_some());

    // A tagged VLAN does not apply to an untagged host.
    f.hosts
        .process_intf_vlan_updated(&cp(1, 1), vlan(50), false, true)
        .unwrap();
    assert_eq!(f.bridging_port(1, mac(1), vlan(50)), None);
}

#[test]
fn test_interface_ip_removed() {
    let f = Fixture::new();
    let h1 = host(1, None, &[cp(1, 1)], &["10.0.1.1"]);
    f.fabric.hosts.upsert(h1.clone());
    f.hosts.process_host_added(&h1).unwrap();

    f.hosts
        .process_intf_ip_updated(&cp(1, 1), &[prefix("10.0.1.0/24")], false)
        .unwrap();
    assert!(f.route(1, host_prefix("10.0.1.1")).is_none());
    assert!(f.bridging_port(1, mac(1), vlan(10)).is_some());

    f.hosts
        .process_intf_ip_updated(&cp(1, 1), &[prefix("10.0.1.0/24")], true)
        .unwrap();
    assert_eq!(f.route(1, host_prefix("10.0.1.1")).unwrap().port(), Some(port(1)));
}

#[test]
fn test_vlan_for_pair_port() {
    let f = Fixture::new();
    assert_eq!(f.hosts.vlan_for_pair_port(None, &cp(1, 1)), Some(vlan(10)));
    assert_eq!(f.hosts.vlan_for_pair_port(Some(vlan(20)), &cp(1, 2)), Some(vlan(20)));
    assert_eq!(f.hosts.vlan_for_pair_port(Some(vlan(20)), &cp(1, 1)), None);
    assert_eq!(f.hosts.vlan_for_pair_port(None, &cp(1, 2)), None);
}
