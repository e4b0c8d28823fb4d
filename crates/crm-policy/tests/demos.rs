//! The sample documents under `demos/` load and schedule.

use std::path::PathBuf;

use crm_core::{EngineConfig, tasks};
use crm_policy::{ClusterConfig, ClusterStatus, Role, compute_transition, load_document};

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos").join(name)
}

#[test]
fn web_cluster_schedules() {
    let config: ClusterConfig = load_document(&demo("web-cluster.toml")).unwrap();
    let status: ClusterStatus = load_document(&demo("web-cluster-status.toml")).unwrap();
    let engine = EngineConfig::from_file(&demo("engine.toml")).unwrap();

    let transition = compute_transition(Some(&config), &status, &engine).unwrap();
    transition.graph.validate().unwrap();
    assert_eq!(transition.graph.id, 12);

    let vip = transition.node_of("vip");
    assert!(vip.is_some());
    assert_eq!(transition.node_of("httpd"), vip);
    assert_ne!(transition.node_of("backup"), vip);

    let masters = transition.roles.values().filter(|&&role| role == Role::Master).count();
    assert_eq!(masters, 1);
}

#[test]
fn failover_fences_the_lost_node() {
    let config: ClusterConfig = load_document(&demo("failover.json")).unwrap();
    let status: ClusterStatus = load_document(&demo("failover-status.json")).unwrap();

    let transition = compute_transition(Some(&config), &status, &EngineConfig::default()).unwrap();
    let graph = &transition.graph;

    assert_eq!(transition.node_of("ip"), Some("node2"));
    assert_eq!(transition.node_of("app"), Some("node2"));

    let fence = graph.find_by_key("stonith-node1").unwrap();
    assert_eq!(fence.task, tasks::FENCE);
    assert!(graph.find_by_key("ip_stop_0").unwrap().is_pseudo());
    assert!(graph.find_by_key("app_start_0").is_some());
}
