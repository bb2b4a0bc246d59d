//! Zone-aware and zone-avoidance selection across a two-zone pool.

use std::collections::HashSet;

use client_balancer::ClientError;

mod common;

const SERVERS: &[(&str, &str)] = &[
    ("10.0.1.1:8080", "us-east-1a"),
    ("10.0.1.2:8080", "us-east-1a"),
    ("10.0.2.1:8080", "us-east-1b"),
    ("10.0.2.2:8080", "us-east-1b"),
];

fn zone_of(id: &str) -> &'static str {
    SERVERS.iter().find(|(addr, _)| *addr == id).map(|(_, z)| *z).unwrap()
}

#[tokio::test]
async fn test_blacked_out_zone_is_avoided() {
    for rule in ["zone_aware", "zone_avoidance"] {
        let registry = common::registry(vec![common::client_config("orders", rule, SERVERS)]);
        let lb = registry.get("orders").unwrap().load_balancer().clone();
        common::trip(&lb, "10.0.1.1:8080", 3);
        common::trip(&lb, "10.0.1.2:8080", 3);

        let zones = lb.zone_snapshots();
        let a = &zones["us-east-1a"];
        assert_eq!(a.circuit_tripped_count, 2);
        assert_eq!(a.load_per_server, -1.0);

        let log = common::CallLog::default();
        for _ in 0..40 {
            let cmd = registry.command("orders").unwrap().build().unwrap();
            let log = log.clone();
            cmd.submit(move |server| {
                log.record(&server);
                async { Ok::<_, ClientError>(()) }
            })
            .await
            .unwrap();
        }

        let zones_hit: HashSet<_> = log.calls().iter().map(|id| zone_of(id)).collect();
        assert_eq!(zones_hit, HashSet::from(["us-east-1b"]), "rule {}", rule);
    }
}

#[tokio::test]
async fn test_overloaded_zone_is_avoided_while_others_are_idle() {
    let registry = common::registry(vec![common::client_config("orders", "zone_aware", SERVERS)]);
    let lb = registry.get("orders").unwrap().load_balancer().clone();

    // One in-flight request on a two-server zone: load 0.5 >= 0.2.
    let busy = lb.find("10.0.1.1:8080").unwrap();
    let _in_flight = lb.stats().single_server_stat(&busy).begin_request();
    assert_eq!(lb.zone_snapshots()["us-east-1a"].load_per_server, 0.5);

    for _ in 0..40 {
        let server = lb.choose(None).unwrap();
        assert_eq!(server.zone(), "us-east-1b");
    }
}

#[tokio::test]
async fn test_every_zone_overloaded_keeps_all_zones() {
    let registry = common::registry(vec![common::client_config("orders", "zone_aware", SERVERS)]);
    let lb = registry.get("orders").unwrap().load_balancer().clone();

    let guards: Vec<_> = ["10.0.1.1:8080", "10.0.2.1:8080"]
        .iter()
        .map(|id| {
            let server = lb.find(id).unwrap();
            lb.stats().single_server_stat(&server).begin_request()
        })
        .collect();

    let zones: HashSet<String> = (0..200).map(|_| lb.choose(None).unwrap().zone().to_string()).collect();
    assert_eq!(zones.len(), 2);
    drop(guards);
}

#[tokio::test]
async fn test_zone_awareness_disabled_uses_whole_pool() {
    let mut config = common::client_config("orders", "zone_aware", SERVERS);
    config.zone.enabled = false;
    let registry = common::registry(vec![config]);
    let lb = registry.get("orders").unwrap().load_balancer().clone();
    common::trip(&lb, "10.0.1.1:8080", 3);
    common::trip(&lb, "10.0.1.2:8080", 3);

    // Plain round robin over four servers visits each once per cycle.
    let picked: HashSet<String> = (0..4).map(|_| lb.choose(None).unwrap().id().to_string()).collect();
    assert_eq!(picked.len(), 4);
}

#[tokio::test]
async fn test_down_zone_does_not_route_into_blacked_out_zone() {
    let servers = [
        ("10.0.1.1:8080", "us-east-1a"),
        ("10.0.1.2:8080", "us-east-1a"),
        ("10.0.2.1:8080", "us-east-1b"),
        ("10.0.2.2:8080", "us-east-1b"),
        ("10.0.3.1:8080", "us-east-1c"),
        ("10.0.3.2:8080", "us-east-1c"),
    ];
    let registry = common::registry(vec![common::client_config("orders", "zone_aware", &servers)]);
    let lb = registry.get("orders").unwrap().load_balancer().clone();
    lb.mark_down("10.0.1.1:8080");
    lb.mark_down("10.0.1.2:8080");
    common::trip(&lb, "10.0.3.1:8080", 3);
    common::trip(&lb, "10.0.3.2:8080", 3);

    let log = common::CallLog::default();
    for _ in 0..200 {
        let cmd = registry.command("orders").unwrap().build().unwrap();
        let log = log.clone();
        cmd.submit(move |server| {
            log.record(&server);
            async { Ok::<_, ClientError>(()) }
        })
        .await
        .unwrap();
    }

    let hit: HashSet<_> = log.calls().into_iter().collect();
    assert_eq!(hit, HashSet::from(["10.0.2.1:8080".to_string(), "10.0.2.2:8080".to_string()]));
}
