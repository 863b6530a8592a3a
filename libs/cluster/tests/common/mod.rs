//! Test fixtures: an in-process discovery transport and event-capture
//! listeners driving the manager the way a real wire transport would.

// Each integration binary uses its own slice of these fixtures.
#![allow(dead_code)]

use cluster::{
    DataExchange, DiscoveryCallback, DiscoveryTransport, EventListener, RawDiscoveryEvent,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use types::{
    attr_keys, CacheAttributes, CacheName, DiscoveryEvent, EventKind, GridNode, NodeAttributes,
    ProductVersion,
};
use uuid::Uuid;

/// Build a non-daemon node advertising `caches` as affinity caches.
pub fn node(order: u64, caches: &[&str]) -> Arc<GridNode> {
    node_with_mode(order, caches, "SHARED")
}

pub fn node_with_mode(order: u64, caches: &[&str], mode: &str) -> Arc<GridNode> {
    let cache_attrs = caches
        .iter()
        .map(|name| CacheAttributes::new(CacheName::named(*name), true, false))
        .collect();
    Arc::new(
        GridNode::new(Uuid::new_v4(), order, ProductVersion::new(1, 0, 0))
            .with_attributes(
                NodeAttributes::new()
                    .with(attr_keys::DEPLOYMENT_MODE, mode)
                    .with(attr_keys::PEER_CLASS_LOADING, true),
            )
            .with_cache_attributes(cache_attrs),
    )
}

/// In-process transport: tests push membership changes, the transport
/// fires the installed callback inline like a wire transport would.
pub struct MockTransport {
    local: RwLock<Arc<GridNode>>,
    remotes: RwLock<Vec<Arc<GridNode>>>,
    dead: RwLock<HashSet<Uuid>>,
    listener: RwLock<Option<DiscoveryCallback>>,
    exchange: RwLock<Option<Arc<dyn DataExchange>>>,
    pub disconnects: AtomicUsize,
    pub reconnects: AtomicUsize,
    fail_reconnect: AtomicBool,
    start_time: u64,
}

impl MockTransport {
    pub fn new(local: Arc<GridNode>) -> Arc<Self> {
        Arc::new(Self {
            local: RwLock::new(local),
            remotes: RwLock::new(Vec::new()),
            dead: RwLock::new(HashSet::new()),
            listener: RwLock::new(None),
            exchange: RwLock::new(None),
            disconnects: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
            fail_reconnect: AtomicBool::new(false),
            start_time: types::now_millis(),
        })
    }

    pub fn fail_next_reconnect(&self) {
        self.fail_reconnect.store(true, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Vec<Arc<GridNode>> {
        let mut nodes = vec![Arc::clone(&*self.local.read())];
        nodes.extend(self.remotes.read().iter().cloned());
        nodes
    }

    fn fire(&self, kind: EventKind, top_ver: u64, about: Arc<GridNode>) {
        let callback = self.listener.read().clone();
        if let Some(callback) = callback {
            callback(RawDiscoveryEvent {
                kind,
                topology_version: top_ver,
                node: about,
                snapshot: self.snapshot(),
                history: None,
            });
        }
    }

    /// Seed a remote without firing an event (node present before the
    /// local node starts).
    pub fn add_remote(&self, node: Arc<GridNode>) {
        self.remotes.write().push(node);
    }

    /// A node joins; the event version is the node's order.
    pub fn join(&self, node: Arc<GridNode>) {
        self.remotes.write().push(Arc::clone(&node));
        let order = node.order();
        self.fire(EventKind::NodeJoined, order, node);
    }

    /// A node leaves gracefully at `top_ver`.
    pub fn leave(&self, node: &Arc<GridNode>, top_ver: u64) {
        self.remotes.write().retain(|n| n.id() != node.id());
        self.dead.write().insert(node.id());
        self.fire(EventKind::NodeLeft, top_ver, Arc::clone(node));
    }

    /// A node drops out at `top_ver`.
    pub fn fail(&self, node: &Arc<GridNode>, top_ver: u64) {
        self.remotes.write().retain(|n| n.id() != node.id());
        self.dead.write().insert(node.id());
        self.fire(EventKind::NodeFailed, top_ver, Arc::clone(node));
    }

    /// A heartbeat from `node`; never a topology change.
    pub fn heartbeat(&self, node: &Arc<GridNode>) {
        self.fire(EventKind::NodeMetricsUpdated, 0, Arc::clone(node));
    }

    pub fn announce_reconnected(&self) {
        let local = Arc::clone(&*self.local.read());
        let order = local.order();
        self.fire(EventKind::NodeReconnected, order, local);
    }

    pub fn mark_dead(&self, id: Uuid) {
        self.dead.write().insert(id);
    }
}

impl DiscoveryTransport for MockTransport {
    fn local_node(&self) -> Arc<GridNode> {
        Arc::clone(&*self.local.read())
    }

    fn remote_nodes(&self) -> Vec<Arc<GridNode>> {
        self.remotes.read().clone()
    }

    fn node(&self, id: Uuid) -> Option<Arc<GridNode>> {
        self.snapshot().into_iter().find(|n| n.id() == id)
    }

    fn ping_node(&self, id: Uuid) -> bool {
        if self.dead.read().contains(&id) {
            return false;
        }
        self.snapshot().iter().any(|n| n.id() == id)
    }

    fn grid_start_time(&self) -> u64 {
        self.start_time
    }

    fn set_listener(&self, callback: Option<DiscoveryCallback>) {
        *self.listener.write() = callback;
    }

    fn set_data_exchange(&self, exchange: Option<Arc<dyn DataExchange>>) {
        *self.exchange.write() = exchange;
    }

    fn disconnect(&self) -> cluster::Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reconnect(&self) -> cluster::Result<()> {
        if self.fail_reconnect.swap(false, Ordering::SeqCst) {
            return Err(cluster::ClusterError::Transport {
                message: "reconnect refused by test".to_string(),
            });
        }
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        // A wire transport announces its re-join right after.
        self.announce_reconnected();
        Ok(())
    }

    fn supports_node_order(&self) -> bool {
        true
    }
}

/// Listener forwarding every event into a channel for assertions.
pub struct CollectingListener {
    tx: Sender<DiscoveryEvent>,
    pub seen: Mutex<Vec<DiscoveryEvent>>,
}

impl CollectingListener {
    pub fn new() -> (Arc<Self>, Receiver<DiscoveryEvent>) {
        let (tx, rx) = unbounded();
        (
            Arc::new(Self {
                tx,
                seen: Mutex::new(Vec::new()),
            }),
            rx,
        )
    }
}

impl EventListener for CollectingListener {
    fn on_event(&self, event: &DiscoveryEvent) {
        self.seen.lock().push(event.clone());
        let _ = self.tx.send(event.clone());
    }
}

/// Wait for the next event of `kind`, skipping others.
pub fn await_kind(rx: &Receiver<DiscoveryEvent>, kind: EventKind) -> DiscoveryEvent {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while std::time::Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) if event.kind == kind => return event,
            Ok(_) => continue,
            Err(_) => continue,
        }
    }
    panic!("timed out waiting for {:?}", kind);
}

/// Spin until `cond` holds or the deadline passes.
pub fn await_condition(what: &str, cond: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while std::time::Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {}", what);
}
