//! Whole-grid scenarios: membership, topology-gated deployment and job
//! dispatch working together on one assembled node stack.

use assert_matches::assert_matches;
use cluster::{ClusterError, LoadBalancer};
use deploy::{ClassMeta, DeploymentRequest, ResourceLoader};
use lattice_e2e_tests::fixtures::{grid_node, GridFixture, MemoryLoader};
use std::sync::Arc;
use std::time::Duration;
use types::{CacheName, EventKind, NodeMetrics};

#[test_log::test]
fn membership_deployment_and_dispatch_work_together() {
    let grid = GridFixture::start(1, &["orders"]);

    // Two more nodes join the cache.
    let b = grid_node(2, &["orders"]);
    let c = grid_node(3, &["orders"]);
    grid.transport.join(Arc::clone(&b));
    grid.transport.join(Arc::clone(&c));

    assert_eq!(grid.manager.topology_version(), 3);

    let orders = CacheName::named("orders");
    assert_eq!(grid.manager.cache_nodes(&orders, None).unwrap().len(), 3);

    // Deploy a task and resolve it through the store.
    let task = ClassMeta::new("acme::PriceJob", true);
    let loader: Arc<dyn ResourceLoader> = Arc::new(MemoryLoader::new([task.clone()]));
    let request =
        DeploymentRequest::local("acme::PriceJob", "acme::PriceJob").with_loader(loader.clone());

    let deployment = grid.store.get_deployment(&request).expect("deployed");
    assert_eq!(deployment.primary_class(), "acme::PriceJob");

    // Dispatch lands on the least-loaded member.
    b.update_metrics(NodeMetrics {
        active_jobs: 5,
        ..NodeMetrics::default()
    });
    c.update_metrics(NodeMetrics {
        active_jobs: 9,
        ..NodeMetrics::default()
    });
    let balancer = LoadBalancer::new();
    let target = balancer
        .balanced_node(&grid.manager.current_snapshot().unwrap())
        .unwrap();
    assert_eq!(target.id(), grid.manager.local_node().unwrap().id());

    // A member fails: alive views shrink, history keeps the membership.
    grid.transport.fail(&c, 4);
    let alive = grid.manager.alive_cache_nodes(&orders, None).unwrap();
    assert_eq!(alive.len(), 2);
    assert!(alive.iter().all(|n| n.id() != c.id()));
    assert_eq!(grid.manager.cache_nodes(&orders, Some(3)).unwrap().len(), 3);

    // Peer deployment requests from the failed node are refused; from a
    // live one they resolve.
    let from_dead = DeploymentRequest::local("acme::PriceJob", "acme::PriceJob")
        .from_sender(c.id());
    assert!(grid.store.get_deployment(&from_dead).is_none());

    let from_live = DeploymentRequest::local("acme::PriceJob", "acme::PriceJob")
        .from_sender(b.id());
    assert!(grid.store.get_deployment(&from_live).is_some());

    // Undeploy retires the alias and lands in the same event log the
    // discovery events use.
    grid.store.undeploy(&loader);
    assert!(grid.store.find_alias("acme::PriceJob").is_none());

    let log = grid.manager.event_log();
    assert_eq!(log.by_kind(EventKind::TaskDeployed).len(), 1);
    assert_eq!(log.by_kind(EventKind::TaskUndeployed).len(), 1);

    // Discovery events drain through the worker asynchronously.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline
        && (log.by_kind(EventKind::NodeJoined).len() < 2
            || log.by_kind(EventKind::NodeFailed).is_empty())
    {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(log.by_kind(EventKind::NodeJoined).len(), 2);
    assert_eq!(log.by_kind(EventKind::NodeFailed).len(), 1);

    grid.stop();
}

#[test_log::test]
fn topology_future_gates_operations_on_membership() {
    let grid = GridFixture::start(1, &[]);

    let fut = grid.manager.topology_future(2);
    assert_matches!(
        fut.get_timeout(Duration::from_millis(50)),
        Err(ClusterError::FutureTimeout { .. })
    );

    grid.transport.join(grid_node(2, &[]));

    let reached = fut.get_timeout(Duration::from_secs(5)).unwrap();
    assert!(reached >= 2);

    grid.stop();
}

#[test_log::test]
fn heartbeats_update_metrics_without_topology_churn() {
    let grid = GridFixture::start(1, &["orders"]);

    let b = grid_node(2, &["orders"]);
    grid.transport.join(Arc::clone(&b));
    let version_before = grid.manager.topology_version();

    b.update_metrics(NodeMetrics {
        active_jobs: 3,
        waiting_jobs: 2,
        ..NodeMetrics::default()
    });
    grid.transport.heartbeat(&b);

    assert_eq!(grid.manager.topology_version(), version_before);
    let observed = grid.manager.node(b.id()).unwrap().metrics();
    assert_eq!(observed.current_load(), 5);

    grid.stop();
}

#[test_log::test]
fn graceful_leave_and_failure_are_distinct_events() {
    let grid = GridFixture::start(1, &[]);

    let b = grid_node(2, &[]);
    let c = grid_node(3, &[]);
    grid.transport.join(Arc::clone(&b));
    grid.transport.join(Arc::clone(&c));

    grid.transport.leave(&b, 4);
    grid.transport.fail(&c, 5);

    // The discovery worker drains asynchronously.
    let log = grid.manager.event_log();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline
        && (log.by_kind(EventKind::NodeLeft).is_empty()
            || log.by_kind(EventKind::NodeFailed).is_empty())
    {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(log.by_kind(EventKind::NodeLeft).len(), 1);
    assert_eq!(log.by_kind(EventKind::NodeFailed).len(), 1);
    assert_eq!(grid.manager.topology_version(), 5);

    grid.stop();
}
