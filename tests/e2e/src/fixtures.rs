//! Whole-grid test fixtures.
//!
//! [`SimTransport`] plays the wire: tests mutate its membership and it
//! fires discovery callbacks inline, exactly like a transport thread.
//! [`GridFixture`] assembles one node's stack (discovery manager,
//! deployment store, shared event log) with the same context-handle
//! wiring a production node uses: the store sees topology through
//! [`TopologyAdapter`], and both sides record into one event log.

use cluster::{
    ClusterConfig, DataExchange, DiscoveryCallback, DiscoveryManager, DiscoveryTransport,
    RawDiscoveryEvent,
};
use deploy::{ClassMeta, DeploymentSpi, LocalDeploymentStore, ResourceLoader, ResourceMeta,
    TopologyView};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use types::{
    attr_keys, CacheAttributes, CacheName, EventKind, GridNode, NodeAttributes, ProductVersion,
};
use uuid::Uuid;

/// Build a grid node advertising affinity caches.
pub fn grid_node(order: u64, caches: &[&str]) -> Arc<GridNode> {
    let cache_attrs = caches
        .iter()
        .map(|name| CacheAttributes::new(CacheName::named(*name), true, false))
        .collect();
    Arc::new(
        GridNode::new(Uuid::new_v4(), order, ProductVersion::new(1, 0, 0))
            .with_attributes(
                NodeAttributes::new()
                    .with(attr_keys::DEPLOYMENT_MODE, "SHARED")
                    .with(attr_keys::PEER_CLASS_LOADING, true),
            )
            .with_cache_attributes(cache_attrs),
    )
}

/// Simulated wire transport for one local node.
pub struct SimTransport {
    local: RwLock<Arc<GridNode>>,
    remotes: RwLock<Vec<Arc<GridNode>>>,
    dead: RwLock<HashSet<Uuid>>,
    listener: RwLock<Option<DiscoveryCallback>>,
    exchange: RwLock<Option<Arc<dyn DataExchange>>>,
    pub disconnects: AtomicUsize,
    pub reconnects: AtomicUsize,
    start_time: u64,
}

impl SimTransport {
    pub fn new(local: Arc<GridNode>) -> Arc<Self> {
        Arc::new(Self {
            local: RwLock::new(local),
            remotes: RwLock::new(Vec::new()),
            dead: RwLock::new(HashSet::new()),
            listener: RwLock::new(None),
            exchange: RwLock::new(None),
            disconnects: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
            start_time: types::now_millis(),
        })
    }

    fn topology(&self) -> Vec<Arc<GridNode>> {
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
                snapshot: self.topology(),
                history: None,
            });
        }
    }

    pub fn join(&self, node: Arc<GridNode>) {
        self.remotes.write().push(Arc::clone(&node));

        // The wire exchanges per-component payloads once per join.
        let exchange = self.exchange.read().clone();
        if let Some(exchange) = exchange {
            let payloads = exchange.collect(node.id());
            exchange.on_exchange(payloads);
        }

        let order = node.order();
        self.fire(EventKind::NodeJoined, order, node);
    }

    pub fn fail(&self, node: &Arc<GridNode>, top_ver: u64) {
        self.remotes.write().retain(|n| n.id() != node.id());
        self.dead.write().insert(node.id());
        self.fire(EventKind::NodeFailed, top_ver, Arc::clone(node));
    }

    pub fn leave(&self, node: &Arc<GridNode>, top_ver: u64) {
        self.remotes.write().retain(|n| n.id() != node.id());
        self.dead.write().insert(node.id());
        self.fire(EventKind::NodeLeft, top_ver, Arc::clone(node));
    }

    pub fn heartbeat(&self, node: &Arc<GridNode>) {
        self.fire(EventKind::NodeMetricsUpdated, 0, Arc::clone(node));
    }
}

impl DiscoveryTransport for SimTransport {
    fn local_node(&self) -> Arc<GridNode> {
        Arc::clone(&*self.local.read())
    }

    fn remote_nodes(&self) -> Vec<Arc<GridNode>> {
        self.remotes.read().clone()
    }

    fn node(&self, id: Uuid) -> Option<Arc<GridNode>> {
        self.topology().into_iter().find(|n| n.id() == id)
    }

    fn ping_node(&self, id: Uuid) -> bool {
        if self.dead.read().contains(&id) {
            return false;
        }
        self.topology().iter().any(|n| n.id() == id)
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
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        let local = Arc::clone(&*self.local.read());
        let order = local.order();
        self.fire(EventKind::NodeReconnected, order, local);
        Ok(())
    }

    fn supports_node_order(&self) -> bool {
        true
    }
}

/// Loader serving a fixed class set, as a node's own code base would.
pub struct MemoryLoader {
    classes: HashMap<String, ClassMeta>,
}

impl MemoryLoader {
    pub fn new(classes: impl IntoIterator<Item = ClassMeta>) -> Self {
        Self {
            classes: classes
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        }
    }
}

impl ResourceLoader for MemoryLoader {
    fn load_class(&self, name: &str) -> Option<ClassMeta> {
        self.classes.get(name).cloned()
    }
}

/// Memory-backed deployment SPI.
#[derive(Default)]
pub struct MemorySpi {
    registry: Mutex<HashMap<String, ResourceMeta>>,
    pub released: AtomicUsize,
}

impl DeploymentSpi for MemorySpi {
    fn register(
        &self,
        loader: &Arc<dyn ResourceLoader>,
        class: &ClassMeta,
    ) -> deploy::Result<bool> {
        let mut registry = self.registry.lock();
        let fresh = !registry.contains_key(&class.name);
        registry.insert(
            class.name.clone(),
            ResourceMeta {
                class_name: class.name.clone(),
                alias: class.name.clone(),
                task: class.task,
                loader: Arc::clone(loader),
            },
        );
        Ok(fresh)
    }

    fn find_resource(&self, alias: &str) -> Option<ResourceMeta> {
        self.registry.lock().get(alias).cloned()
    }

    fn on_released(&self, _loader: &Arc<dyn ResourceLoader>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Context handle giving the deployment store its topology view through
/// the discovery manager, without either component owning the other.
pub struct TopologyAdapter {
    manager: Arc<DiscoveryManager>,
}

impl TopologyAdapter {
    pub fn new(manager: Arc<DiscoveryManager>) -> Self {
        Self { manager }
    }
}

impl TopologyView for TopologyAdapter {
    fn alive(&self, id: Uuid) -> bool {
        self.manager.alive(id)
    }

    fn node(&self, id: Uuid) -> Option<Arc<GridNode>> {
        self.manager.node(id)
    }
}

/// One node's assembled stack.
pub struct GridFixture {
    pub transport: Arc<SimTransport>,
    pub manager: Arc<DiscoveryManager>,
    pub store: Arc<LocalDeploymentStore>,
    pub spi: Arc<MemorySpi>,
}

impl GridFixture {
    /// Start a local node with the given join order and caches.
    pub fn start(order: u64, caches: &[&str]) -> Self {
        Self::start_with_config(
            order,
            caches,
            ClusterConfig {
                segment_check_frequency_ms: 0,
                ..ClusterConfig::default()
            },
        )
    }

    pub fn start_with_config(order: u64, caches: &[&str], config: ClusterConfig) -> Self {
        let local = grid_node(order, caches);
        let transport = SimTransport::new(local);

        let transport_handle: Arc<dyn DiscoveryTransport> = Arc::clone(&transport) as Arc<dyn DiscoveryTransport>;
        let manager = Arc::new(DiscoveryManager::new(config, transport_handle));
        manager.start().expect("grid node starts");

        let spi = Arc::new(MemorySpi::default());
        let spi_handle: Arc<dyn DeploymentSpi> = Arc::clone(&spi) as Arc<dyn DeploymentSpi>;
        let store = Arc::new(
            LocalDeploymentStore::new(
                spi_handle,
                Arc::new(TopologyAdapter::new(Arc::clone(&manager))),
                manager.event_log(),
            )
            .with_user_version("e2e"),
        );

        Self {
            transport,
            manager,
            store,
            spi,
        }
    }

    pub fn stop(&self) {
        self.manager.stop(false);
    }
}
