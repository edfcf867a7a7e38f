//! End-to-end event processing through the controller.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use sr_controller::config::ControllerConfig;
use sr_controller::daemon::{
    replay, DeviceEvent, FabricEvent, InterfaceEvent, MastershipEvent, MemoryFabric, SrController,
    SrControllerConfig,
};
use sr_controller::host::{Host, HostEvent};
use sr_controller::memory::SubnetCall;
use sr_controller::route::RouteEvent;
use sr_types::{IpPrefix, NodeId};
use std::collections::BTreeSet;

const CONFIG: &str = r#"
[controller]
local_node = "n1"
workers = 2
active_probing = false

[[devices]]
id = "of:1"
pair_device = "of:2"
pair_local_port = 9

[[devices]]
id = "of:2"
pair_device = "of:1"
pair_local_port = 9

[[interfaces]]
connect_point = "of:1/1"
vlan_untagged = 10
ips = ["10.0.1.254/24"]

[[interfaces]]
connect_point = "of:2/1"
vlan_untagged = 10
ips = ["10.0.1.254/24"]

[[interfaces]]
connect_point = "of:1/9"
vlan_tagged = [20]
vlan_native = 10
ips = ["10.0.1.254/24"]

[[interfaces]]
connect_point = "of:2/9"
vlan_tagged = [20]
vlan_native = 10
ips = ["10.0.1.254/24"]

[mastership]
"of:1" = "n1"
"of:2" = "n1"
"#;

struct Running {
    fabric: MemoryFabric,
    controller: SrController,
}

impl Running {
    fn start(toml: &str) -> Self {
        let config = ControllerConfig::from_toml_str(toml).unwrap();
        config.validate().unwrap();
        let fabric = MemoryFabric::from_config(&config).unwrap();
        let controller = SrController::new(
            SrControllerConfig {
                workers: config.controller.workers,
                host: config.host_handler_config(),
            },
            fabric.services(),
            None,
        );
        Self { fabric, controller }
    }

    async fn send(&self, event: FabricEvent) {
        self.fabric.apply(&event);
        self.controller.submit(event).unwrap();
        self.controller.flush().await;
    }

    fn bridging_devices(&self) -> Vec<String> {
        self.controller
            .snapshot()
            .bridging
            .iter()
            .map(|entry| format!("{}/{}", entry.device_id, entry.port))
            .collect()
    }
}

fn h1() -> Host {
    host(1, None, &[cp(1, 1)], &["10.0.1.1"])
}

#[tokio::test]
async fn test_host_and_route_events() {
    let running = Running::start(CONFIG);
    running
        .send(FabricEvent::Host(HostEvent::Added { host: h1() }))
        .await;
    assert_eq!(running.bridging_devices(), vec!["of:1/1", "of:2/9"]);

    running
        .send(FabricEvent::Route(RouteEvent::Added {
            prefix: prefix("192.168.0.0/24"),
            next_hops: vec![next_hop("192.168.0.0/24", &h1(), "10.0.1.1")],
        }))
        .await;
    let snapshot = running.controller.snapshot();
    assert_eq!(snapshot.routing.len(), 4);
    let expected: BTreeSet<IpPrefix> = [prefix("192.168.0.0/24")].into_iter().collect();
    assert_eq!(snapshot.subnets.get(&cp(1, 1)), Some(&expected));

    let stats = running.controller.stats();
    // One host event runs through both handlers.
    assert_eq!(stats.host_events.success, 2);
    assert_eq!(stats.route_events.success, 1);
    assert_eq!(stats.hosts.added, 1);
    assert_eq!(stats.routes.added, 1);

    running
        .send(FabricEvent::Host(HostEvent::Removed { host: h1() }))
        .await;
    let snapshot = running.controller.snapshot();
    assert!(snapshot.bridging.is_empty());
    assert!(snapshot.routing.is_empty());
    assert!(snapshot.subnets.is_empty());
}

#[tokio::test]
async fn test_mastership_change_reinstalls_pair() {
    let toml = CONFIG
        .replace("\"of:1\" = \"n1\"", "\"of:1\" = \"n2\"")
        .replace("\"of:2\" = \"n1\"", "\"of:2\" = \"n2\"");
    let running = Running::start(&toml);
    running
        .send(FabricEvent::Host(HostEvent::Added { host: h1() }))
        .await;
    assert!(running.bridging_devices().is_empty());

    running
        .send(FabricEvent::Mastership(MastershipEvent::MasterChanged {
            device_id: dev(1),
            master: Some(NodeId::from("n1")),
        }))
        .await;

    assert_eq!(running.controller.arbiter().cached(&dev(1)), Some(true));
    assert_eq!(running.controller.arbiter().cached(&dev(2)), Some(true));
    assert_eq!(running.bridging_devices(), vec!["of:1/1", "of:2/9"]);
}

#[tokio::test]
async fn test_device_unavailable_drops_entries() {
    let running = Running::start(CONFIG);
    running
        .send(FabricEvent::Host(HostEvent::Added { host: h1() }))
        .await;

    running
        .send(FabricEvent::Device(DeviceEvent::Unavailable { device_id: dev(2) }))
        .await;
    assert_eq!(running.bridging_devices(), vec!["of:1/1"]);
    assert_eq!(running.controller.arbiter().cached(&dev(2)), None);

    // Reconnecting reinstalls the redirect.
    running
        .send(FabricEvent::Device(DeviceEvent::Available { device_id: dev(2) }))
        .await;
    assert_eq!(running.bridging_devices(), vec!["of:1/1", "of:2/9"]);
}

#[tokio::test]
async fn test_device_flap_keeps_routes_and_subnets() {
    let running = Running::start(CONFIG);
    running
        .send(FabricEvent::Host(HostEvent::Added { host: h1() }))
        .await;
    running
        .send(FabricEvent::Route(RouteEvent::Added {
            prefix: prefix("192.168.0.0/24"),
            next_hops: vec![next_hop("192.168.0.0/24", &h1(), "10.0.1.1")],
        }))
        .await;
    let before = running.controller.snapshot();

    running
        .send(FabricEvent::Device(DeviceEvent::Unavailable { device_id: dev(1) }))
        .await;
    let down = running.controller.snapshot();
    assert!(down.routing.iter().all(|entry| entry.device_id != dev(1)));
    assert_eq!(down.subnets, before.subnets);

    running
        .send(FabricEvent::Device(DeviceEvent::Available { device_id: dev(1) }))
        .await;
    assert_eq!(running.controller.snapshot(), before);
    assert_eq!(
        running.fabric.network.subnet_calls(),
        vec![SubnetCall::Add(cp(1, 1), prefix("192.168.0.0/24"))]
    );
}

#[tokio::test]
async fn test_interface_event() {
    let running = Running::start(CONFIG);
    running
        .send(FabricEvent::Host(HostEvent::Added { host: h1() }))
        .await;

    running
        .send(FabricEvent::Interface(InterfaceEvent::IpUpdated {
            connect_point: cp(1, 1),
            prefixes: vec![prefix("10.0.1.0/24")],
            install: false,
        }))
        .await;
    let on_of1 = running
        .controller
        .snapshot()
        .routing
        .iter()
        .filter(|entry| entry.device_id == dev(1))
        .count();
    assert_eq!(on_of1, 0);
    assert_eq!(running.controller.stats().interface_events.success, 1);
}

#[tokio::test]
async fn test_many_hosts_in_parallel() {
    let running = Running::start(CONFIG);
    for n in 1..=50u8 {
        let h = host(n, None, &[cp(1, 1), cp(2, 1)], &[]);
        running.fabric.hosts.upsert(h.clone());
        running
            .controller
            .submit(FabricEvent::Host(HostEvent::Added { host: h }))
            .unwrap();
    }
    running.controller.flush().await;

    assert_eq!(running.controller.snapshot().bridging.len(), 100);
    assert_eq!(running.controller.stats().host_events.success, 100);
}

#[tokio::test]
async fn test_submit_after_shutdown_fails() {
    let running = Running::start(CONFIG);
    running.controller.shutdown().await;
    let result = running
        .controller
        .submit(FabricEvent::Device(DeviceEvent::PortUp {
            connect_point: cp(1, 1),
        }));
    assert!(result.is_err());
    assert_eq!(running.controller.stats().device_events.rejected, 1);
}

#[tokio::test]
async fn test_replay_feed() {
    let running = Running::start(CONFIG);
    let feed = r#"
# host on one leaf of the pair
{"kind":"host","type":"added","host":{"mac":"00:00:00:00:00:01","locations":["of:1/1"],"ips":["10.0.1.1"]}}
{"kind":"route","type":"added","prefix":"192.168.0.0/24","next_hops":[{"prefix":"192.168.0.0/24","next_hop":"10.0.1.1","next_hop_mac":"00:00:00:00:00:01"}]}
not json
{"kind":"device","type":"port_down","connect_point":"of:2/1"}
"#;
    let summary = replay(&running.controller, &running.fabric, feed.as_bytes())
        .await
        .unwrap();

    assert_eq!(summary.events, 3);
    assert_eq!(summary.malformed, 1);
    assert_eq!(running.controller.snapshot().routing.len(), 4);
    assert_eq!(
        running
            .controller
            .route_handler()
            .installed_devices(&prefix("192.168.0.0/24")),
        [dev(1), dev(2)].into_iter().collect::<BTreeSet<_>>()
    );
}
