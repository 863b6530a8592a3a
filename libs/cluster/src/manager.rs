//! Discovery Manager
//!
//! Owns the discovery transport and everything derived from it: the
//! current topology version, the snapshot cache and its bounded history,
//! topology-await futures and listener fan-out.
//!
//! The raw transport callback runs inline on the transport thread and
//! only updates versioned state: it rewinds alive sets on leave/fail,
//! installs the new snapshot, advances the version with a
//! set-if-greater, and enqueues the event. Everything that may block
//! (attribute validation, listener dispatch, event recording, policy
//! hand-off) happens on the single discovery worker, which preserves the
//! per-listener event order.

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::events::{EventLog, EventSink};
use crate::future::GridFuture;
use crate::hash::topology_hash;
use crate::history::TopologyHistory;
use crate::metrics::{DefaultVmMetrics, MetricsProvider, VmMetricsSource};
use crate::policy::{GridLifecycle, LoggingLifecycle, PolicyEngine, ReconnectHooks};
use crate::segmentation::{SegmentState, SegmentationWatchdog, SEGMENT_RETRY_PAUSE};
use crate::snapshot::TopologySnapshot;
use crate::transport::{
    ComponentData, DataExchange, DiscoveryTransport, MetricsSource, RawDiscoveryEvent,
};
use crate::worker::WorkerHandle;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use types::{attr_keys, CacheName, DiscoveryEvent, Event, EventKind, GridNode};
use uuid::Uuid;

/// Receives discovery events on the discovery worker thread. Callbacks
/// must not block; a panicking listener is isolated and logged.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &DiscoveryEvent);
}

struct ListenerEntry {
    id: u64,
    /// `None` subscribes to every discovery event.
    interested: Option<HashSet<EventKind>>,
    listener: Arc<dyn EventListener>,
}

/// Builder for a [`DiscoveryManager`].
pub struct DiscoveryManagerBuilder {
    config: ClusterConfig,
    transport: Arc<dyn DiscoveryTransport>,
    lifecycle: Arc<dyn GridLifecycle>,
    vm_metrics: Arc<dyn VmMetricsSource>,
}

impl DiscoveryManagerBuilder {
    pub fn lifecycle(mut self, lifecycle: Arc<dyn GridLifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn vm_metrics(mut self, vm_metrics: Arc<dyn VmMetricsSource>) -> Self {
        self.vm_metrics = vm_metrics;
        self
    }

    pub fn build(self) -> DiscoveryManager {
        let seg_state = Arc::new(SegmentState::new(
            self.config.segmentation_resolvers.clone(),
        ));
        let metrics = Arc::new(MetricsProvider::new(
            self.config.jobs_metrics_concurrency_level,
            self.config.metrics_history_size,
            self.config.metrics_expire_time(),
            Arc::clone(&self.vm_metrics),
        ));

        DiscoveryManager {
            inner: Arc::new(ManagerInner {
                history: TopologyHistory::new(self.config.discovery_history_size),
                events: Arc::new(EventLog::new(self.config.event_log_capacity)),
                config: self.config,
                transport: self.transport,
                lifecycle: self.lifecycle,
                top_ver: AtomicU64::new(0),
                snapshot: RwLock::new(None),
                local_node: RwLock::new(None),
                listeners: RwLock::new(Arc::new(Vec::new())),
                next_listener_id: AtomicU64::new(1),
                top_futures: Mutex::new(Vec::new()),
                local_join: Mutex::new(None),
                event_tx: Mutex::new(None),
                metrics,
                seg_state,
                seg_fired: AtomicBool::new(false),
                exchanges: RwLock::new(Vec::new()),
                policy: Mutex::new(None),
                watchdog: Mutex::new(None),
                worker: Mutex::new(None),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }
}

/// The cluster membership front-end.
pub struct DiscoveryManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ClusterConfig,
    transport: Arc<dyn DiscoveryTransport>,
    lifecycle: Arc<dyn GridLifecycle>,

    /// Current topology version; advanced only with set-if-greater.
    top_ver: AtomicU64,
    /// Current snapshot; `None` after invalidation by a dead liveness
    /// probe, rebuilt on the next read.
    snapshot: RwLock<Option<Arc<TopologySnapshot>>>,
    history: TopologyHistory,
    local_node: RwLock<Option<Arc<GridNode>>>,

    /// Copy-on-write listener slice.
    listeners: RwLock<Arc<Vec<ListenerEntry>>>,
    next_listener_id: AtomicU64,

    top_futures: Mutex<Vec<(u64, GridFuture<u64>)>>,
    local_join: Mutex<Option<DiscoveryEvent>>,

    event_tx: Mutex<Option<Sender<DiscoveryEvent>>>,

    events: Arc<EventLog>,
    metrics: Arc<MetricsProvider>,
    seg_state: Arc<SegmentState>,
    /// Set on the first segmentation escalation, cleared by reconnect.
    seg_fired: AtomicBool,

    exchanges: RwLock<Vec<Arc<dyn DataExchange>>>,

    policy: Mutex<Option<Arc<PolicyEngine>>>,
    watchdog: Mutex<Option<SegmentationWatchdog>>,
    worker: Mutex<Option<WorkerHandle>>,

    started: AtomicBool,
    stopped: AtomicBool,
}

impl DiscoveryManager {
    pub fn builder(
        config: ClusterConfig,
        transport: Arc<dyn DiscoveryTransport>,
    ) -> DiscoveryManagerBuilder {
        DiscoveryManagerBuilder {
            config,
            transport,
            lifecycle: Arc::new(LoggingLifecycle),
            vm_metrics: Arc::new(DefaultVmMetrics),
        }
    }

    pub fn new(config: ClusterConfig, transport: Arc<dyn DiscoveryTransport>) -> Self {
        Self::builder(config, transport).build()
    }

    /// Start the manager: validate the segment, install transport hooks,
    /// spawn workers and cache the initial topology.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;

        if inner.started.swap(true, Ordering::SeqCst) {
            return Err(ClusterError::Config {
                message: "discovery manager already started".to_string(),
            });
        }

        inner.config.validate()?;

        // Pre-join segment check.
        if inner.config.segmentation_enabled() && !inner.seg_state.check_segment() {
            if inner.config.wait_for_segment_on_start {
                info!("segment invalid at start, waiting");
                loop {
                    std::thread::sleep(SEGMENT_RETRY_PAUSE);
                    if inner.stopped.load(Ordering::SeqCst) {
                        return Err(ClusterError::ManagerStopped);
                    }
                    if inner.seg_state.check_segment() {
                        break;
                    }
                }
            } else {
                return Err(ClusterError::InvalidSegment);
            }
        }

        let local = inner.transport.local_node();
        *inner.local_node.write() = Some(Arc::clone(&local));

        // Attribute consistency against nodes already in the topology;
        // a fatal mismatch aborts start before any snapshot is retained.
        let remotes = inner.transport.remote_nodes();
        for remote in &remotes {
            if let Err(err) = inner.check_attribute_compatibility(&local, remote) {
                error!(error = %err, "node attributes incompatible with cluster");
                inner.started.store(false, Ordering::SeqCst);
                return Err(err);
            }
            inner.warn_attribute_drift(&local, remote);
        }

        // Discovery worker.
        let (tx, rx) = unbounded::<DiscoveryEvent>();
        *inner.event_tx.lock() = Some(tx);
        let worker_inner = Arc::downgrade(inner);
        *inner.worker.lock() = Some(WorkerHandle::spawn("disco-event-worker", move |cancelled| {
            ManagerInner::run_worker(worker_inner, rx, cancelled);
        }));

        // Policy engine with its reconnect worker.
        let hooks = ReconnectHooks {
            before_reconnect: {
                let weak = Arc::downgrade(inner);
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.reset_for_reconnect();
                    }
                })
            },
            after_reconnect: {
                let weak = Arc::downgrade(inner);
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.refresh_local_node();
                    }
                })
            },
        };
        *inner.policy.lock() = Some(Arc::new(PolicyEngine::new(
            inner.config.segmentation_policy,
            Arc::clone(&inner.transport),
            Arc::clone(&inner.lifecycle),
            Arc::clone(&inner.seg_state),
            hooks,
        )));

        // Segmentation watchdog.
        if inner.config.segmentation_enabled() && inner.config.segment_check_frequency_ms > 0 {
            let weak = Arc::downgrade(inner);
            *inner.watchdog.lock() = Some(SegmentationWatchdog::start(
                Arc::clone(&inner.seg_state),
                inner.config.segment_check_frequency(),
                move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.emit_local_segmented();
                    }
                },
            ));
        }

        // Initial topology: version is the local join order.
        inner.top_ver.fetch_max(local.order(), Ordering::SeqCst);
        let snapshot = inner.build_snapshot(local.order(), Arc::clone(&local));
        inner.history.insert(local.order(), Arc::clone(&snapshot));
        *inner.snapshot.write() = Some(Arc::clone(&snapshot));

        // The local join is observed but never forwarded to listeners.
        let join = DiscoveryEvent::new(
            EventKind::NodeJoined,
            local.order(),
            Arc::clone(&local),
            snapshot.all_nodes(None),
        );
        *inner.local_join.lock() = Some(join);

        inner.complete_topology_futures();

        // Transport hooks go in last, with the initial state in place;
        // events may start flowing the moment the listener lands.
        let metrics_source: Arc<dyn MetricsSource> = Arc::clone(&inner.metrics) as Arc<dyn MetricsSource>;
        inner.transport.set_metrics_source(Some(metrics_source));

        let exchange: Arc<dyn DataExchange> = Arc::new(ExchangeFan {
            inner: Arc::downgrade(inner),
        });
        inner.transport.set_data_exchange(Some(exchange));

        let callback_inner = Arc::downgrade(inner);
        inner
            .transport
            .set_listener(Some(Arc::new(move |raw: RawDiscoveryEvent| {
                if let Some(inner) = callback_inner.upgrade() {
                    inner.on_raw_event(raw);
                }
            })));

        info!(
            node = %local.id(),
            order = local.order(),
            topology_version = inner.top_ver.load(Ordering::SeqCst),
            "discovery manager started"
        );

        Ok(())
    }

    /// Stop the manager: detach transport hooks, cancel workers, shut
    /// the transport down. Idempotent, and safe to call from a
    /// segmentation-induced shutdown.
    pub fn stop(&self, cancel: bool) {
        let inner = &self.inner;

        if inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(cancel, "stopping discovery manager");

        inner.transport.set_listener(None);
        inner.transport.set_data_exchange(None);
        inner.transport.set_metrics_source(None);

        if let Some(watchdog) = inner.watchdog.lock().take() {
            watchdog.stop();
        }

        if let Some(worker) = inner.worker.lock().take() {
            worker.join();
        }
        inner.event_tx.lock().take();

        if let Some(policy) = inner.policy.lock().take() {
            policy.shutdown();
        }

        if let Err(err) = inner.transport.disconnect() {
            warn!(error = %err, "transport disconnect failed during stop");
        }

        // Fail outstanding awaits so callers do not hang.
        let pending: Vec<(u64, GridFuture<u64>)> = inner.top_futures.lock().drain(..).collect();
        for (_, fut) in pending {
            fut.on_done(Err(ClusterError::ManagerStopped));
        }

        info!("discovery manager stopped");
    }

    /// Current topology version.
    pub fn topology_version(&self) -> u64 {
        self.inner.top_ver.load(Ordering::SeqCst)
    }

    /// The local node; stable after a successful start.
    pub fn local_node(&self) -> Option<Arc<GridNode>> {
        self.inner.local_node.read().clone()
    }

    /// Node by id from the current topology.
    pub fn node(&self, id: Uuid) -> Option<Arc<GridNode>> {
        self.current_snapshot().ok()?.node(id)
    }

    /// Liveness check against the transport. A dead answer invalidates
    /// the cached snapshot so stale reads cannot resurrect the node.
    pub fn alive(&self, id: Uuid) -> bool {
        if self.inner.transport.ping_node(id) {
            return true;
        }
        *self.inner.snapshot.write() = None;
        false
    }

    /// Current snapshot, rebuilt from the transport when invalidated.
    pub fn current_snapshot(&self) -> Result<Arc<TopologySnapshot>> {
        self.inner.current_snapshot()
    }

    /// Snapshot serving `top_ver`: the current one for `None` or a
    /// matching version, a history entry otherwise.
    pub fn snapshot_at(&self, top_ver: Option<u64>) -> Result<Arc<TopologySnapshot>> {
        self.inner.resolve_snapshot(top_ver)
    }

    pub fn cache_nodes(
        &self,
        name: &CacheName,
        top_ver: Option<u64>,
    ) -> Result<Vec<Arc<GridNode>>> {
        Ok(self.inner.resolve_snapshot(top_ver)?.cache_nodes(name, top_ver))
    }

    pub fn remote_cache_nodes(
        &self,
        name: &CacheName,
        top_ver: Option<u64>,
    ) -> Result<Vec<Arc<GridNode>>> {
        Ok(self
            .inner
            .resolve_snapshot(top_ver)?
            .remote_cache_nodes(name, top_ver))
    }

    pub fn alive_cache_nodes(
        &self,
        name: &CacheName,
        top_ver: Option<u64>,
    ) -> Result<Vec<Arc<GridNode>>> {
        Ok(self
            .inner
            .resolve_snapshot(top_ver)?
            .alive_cache_nodes(name, top_ver))
    }

    pub fn cache_affinity_nodes(
        &self,
        name: &CacheName,
        top_ver: Option<u64>,
    ) -> Result<Vec<Arc<GridNode>>> {
        Ok(self
            .inner
            .resolve_snapshot(top_ver)?
            .affinity_cache_nodes(name, top_ver))
    }

    pub fn has_near_cache(&self, name: &CacheName, top_ver: Option<u64>) -> Result<bool> {
        Ok(self.inner.resolve_snapshot(top_ver)?.has_near_cache(name))
    }

    /// Future completing once the topology reaches `await_ver`. Resolves
    /// immediately when already there, closing the startup race.
    pub fn topology_future(&self, await_ver: u64) -> GridFuture<u64> {
        let fut: GridFuture<u64> = GridFuture::new();

        if self.inner.stopped.load(Ordering::SeqCst) {
            fut.on_done(Err(ClusterError::ManagerStopped));
            return fut;
        }

        self.inner.top_futures.lock().push((await_ver, fut.clone()));

        // Probe after registering; the worker may have advanced the
        // version between our check and the registration otherwise.
        if self.topology_version() >= await_ver {
            self.inner.complete_topology_futures();
        }

        fut
    }

    /// The captured local-join event; never delivered to listeners.
    pub fn local_join_event(&self) -> Option<DiscoveryEvent> {
        self.inner.local_join.lock().clone()
    }

    /// Subscribe a listener for `interested` kinds (`None` = all
    /// discovery events). Returns the subscription id.
    pub fn subscribe(
        &self,
        interested: Option<HashSet<EventKind>>,
        listener: Arc<dyn EventListener>,
    ) -> u64 {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.inner.listeners.write();
        let mut next: Vec<ListenerEntry> = guard.iter().map(ListenerEntry::shallow_copy).collect();
        next.push(ListenerEntry {
            id,
            interested,
            listener,
        });
        *guard = Arc::new(next);
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut guard = self.inner.listeners.write();
        let before = guard.len();
        let next: Vec<ListenerEntry> = guard
            .iter()
            .filter(|entry| entry.id != id)
            .map(ListenerEntry::shallow_copy)
            .collect();
        let removed = next.len() != before;
        *guard = Arc::new(next);
        removed
    }

    /// Register a component participating in join data exchange.
    pub fn register_data_exchange(&self, exchange: Arc<dyn DataExchange>) {
        self.inner.exchanges.write().push(exchange);
    }

    pub fn event_log(&self) -> Arc<EventLog> {
        Arc::clone(&self.inner.events)
    }

    pub fn metrics_provider(&self) -> Arc<MetricsProvider> {
        Arc::clone(&self.inner.metrics)
    }

    /// Interoperable hash of the current topology.
    pub fn topology_hash(&self) -> Result<u64> {
        let snapshot = self.inner.current_snapshot()?;
        let nodes = snapshot.all_nodes(None);
        Ok(topology_hash(nodes.iter()))
    }

    pub fn grid_start_time(&self) -> u64 {
        self.inner.transport.grid_start_time()
    }
}

impl ListenerEntry {
    fn shallow_copy(&self) -> ListenerEntry {
        ListenerEntry {
            id: self.id,
            interested: self.interested.clone(),
            listener: Arc::clone(&self.listener),
        }
    }
}

/// Fans transport data-exchange calls out to registered components.
struct ExchangeFan {
    inner: Weak<ManagerInner>,
}

impl DataExchange for ExchangeFan {
    fn collect(&self, node_id: Uuid) -> Vec<ComponentData> {
        let Some(inner) = self.inner.upgrade() else {
            return Vec::new();
        };
        let exchanges = inner.exchanges.read().clone();
        exchanges
            .iter()
            .flat_map(|ex| ex.collect(node_id))
            .collect()
    }

    fn on_exchange(&self, data: Vec<ComponentData>) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let exchanges = inner.exchanges.read().clone();
        for ex in exchanges.iter() {
            ex.on_exchange(data.clone());
        }
    }
}

impl ManagerInner {
    /// Raw transport callback; inline on the transport thread.
    fn on_raw_event(self: &Arc<Self>, raw: RawDiscoveryEvent) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let kind = raw.kind;

        if kind == EventKind::NodeSegmented {
            // Escalate once; re-armed by reconnect.
            if self.seg_fired.swap(true, Ordering::SeqCst) {
                debug!("suppressing repeated segmentation event");
                return;
            }
        }

        if kind == EventKind::NodeMetricsUpdated {
            // Heartbeats refresh node metrics in place and never touch
            // versions or snapshots.
            let event = DiscoveryEvent::new(
                kind,
                self.top_ver.load(Ordering::SeqCst),
                raw.node,
                raw.snapshot,
            );
            self.enqueue(event);
            return;
        }

        if kind == EventKind::NodeLeft || kind == EventKind::NodeFailed {
            // Rewind alive sets in every retained snapshot, replayed
            // versions included.
            let departed = Arc::clone(&raw.node);
            self.history.for_each(|snap| snap.prune_alive(&departed));
            if let Some(current) = self.snapshot.read().clone() {
                current.prune_alive(&departed);
            }
        }

        if kind.is_membership() {
            let local = self.local_node_or_transport();

            // Transport-supplied history (reconnect catch-up).
            if let Some(history) = &raw.history {
                for (ver, nodes) in history {
                    let snap = self.build_snapshot_from(*ver, Arc::clone(&local), nodes);
                    self.history.insert(*ver, snap);
                }
            }

            let snapshot =
                self.build_snapshot_from(raw.topology_version, Arc::clone(&local), &raw.snapshot);
            self.history.insert(raw.topology_version, Arc::clone(&snapshot));

            // A replayed older version updates history (and had its alive
            // rewind above) but never regresses the current view.
            if raw.topology_version >= self.top_ver.load(Ordering::SeqCst) {
                *self.snapshot.write() = Some(Arc::clone(&snapshot));
            }

            self.top_ver
                .fetch_max(raw.topology_version, Ordering::SeqCst);

            if kind == EventKind::NodeReconnected {
                self.seg_fired.store(false, Ordering::SeqCst);
                self.seg_state.re_arm();
            }

            // The local join is captured, not forwarded.
            if kind == EventKind::NodeJoined && raw.node.id() == local.id() {
                let event = DiscoveryEvent::new(
                    kind,
                    raw.topology_version,
                    raw.node,
                    snapshot.all_nodes(None),
                );
                *self.local_join.lock() = Some(event);
                self.complete_topology_futures();
                return;
            }
        }

        let event = DiscoveryEvent::new(
            kind,
            if kind.is_membership() {
                raw.topology_version
            } else {
                self.top_ver.load(Ordering::SeqCst)
            },
            raw.node,
            raw.snapshot,
        );
        self.enqueue(event);
    }

    fn enqueue(&self, event: DiscoveryEvent) {
        let guard = self.event_tx.lock();
        if let Some(tx) = guard.as_ref() {
            if tx.send(event).is_err() {
                debug!("discovery worker gone, dropping event");
            }
        }
    }

    fn run_worker(
        weak: Weak<ManagerInner>,
        rx: Receiver<DiscoveryEvent>,
        cancelled: Arc<AtomicBool>,
    ) {
        while !cancelled.load(Ordering::SeqCst) {
            let event = match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let Some(inner) = weak.upgrade() else {
                break;
            };

            // Keep the pipeline alive whatever one event does.
            if let Err(err) = inner.process_event(&event) {
                error!(kind = ?event.kind, error = %err, "discovery event processing failed");
            }
        }
    }

    fn process_event(self: &Arc<Self>, event: &DiscoveryEvent) -> Result<()> {
        match event.kind {
            EventKind::NodeJoined => {
                let local = self.local_node_or_transport();
                if let Err(err) = self.check_attribute_compatibility(&local, &event.node) {
                    // The joiner validates on its own side and is
                    // expected to abort its start; locally this is drift
                    // to surface, not a failure.
                    warn!(
                        joining = %event.node.id(),
                        error = %err,
                        "joining node has incompatible attributes"
                    );
                }
                self.warn_attribute_drift(&local, &event.node);
            }
            EventKind::NodeLeft | EventKind::NodeFailed => {
                if let Some(watchdog) = self.watchdog.lock().as_ref() {
                    watchdog.request_check();
                }
            }
            EventKind::NodeSegmented => {
                let policy = self.policy.lock().clone();
                if let Some(policy) = policy {
                    policy.on_segmented();
                }
            }
            EventKind::NodeReconnected | EventKind::NodeMetricsUpdated => {}
            _ => {}
        }

        self.record_and_notify(event);

        if event.kind.is_membership() {
            self.complete_topology_futures();
        }

        Ok(())
    }

    fn record_and_notify(&self, event: &DiscoveryEvent) {
        self.events.record(Event::Discovery(event.clone()));

        let listeners = self.listeners.read().clone();
        for entry in listeners.iter() {
            let wants = entry
                .interested
                .as_ref()
                .map(|set| set.contains(&event.kind))
                .unwrap_or(true);
            if !wants {
                continue;
            }

            // A listener failure must never take the worker down.
            let listener = Arc::clone(&entry.listener);
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event)
            }))
            .is_err()
            {
                error!(listener = entry.id, "discovery listener panicked");
            }
        }
    }

    fn complete_topology_futures(&self) {
        let current = self.top_ver.load(Ordering::SeqCst);
        let mut futures = self.top_futures.lock();
        futures.retain(|(await_ver, fut)| {
            if current >= *await_ver {
                fut.on_done(Ok(current));
                false
            } else {
                true
            }
        });
    }

    fn local_node_or_transport(&self) -> Arc<GridNode> {
        if let Some(local) = self.local_node.read().clone() {
            return local;
        }
        self.transport.local_node()
    }

    fn build_snapshot(&self, version: u64, local: Arc<GridNode>) -> Arc<TopologySnapshot> {
        let remotes = self.transport.remote_nodes();
        self.build_snapshot_from(version, local, &remotes)
    }

    fn build_snapshot_from(
        &self,
        version: u64,
        local: Arc<GridNode>,
        nodes: &[Arc<GridNode>],
    ) -> Arc<TopologySnapshot> {
        let remotes: Vec<Arc<GridNode>> = nodes
            .iter()
            .filter(|n| n.id() != local.id())
            .cloned()
            .collect();
        let transport = Arc::clone(&self.transport);
        Arc::new(TopologySnapshot::build(
            version,
            local,
            &remotes,
            &move |n: &GridNode| transport.ping_node(n.id()),
        ))
    }

    fn current_snapshot(&self) -> Result<Arc<TopologySnapshot>> {
        if let Some(snapshot) = self.snapshot.read().clone() {
            return Ok(snapshot);
        }

        // Rebuild-if-null after an invalidation; the write lock makes
        // competing readers agree on one rebuilt snapshot.
        let mut guard = self.snapshot.write();
        if let Some(snapshot) = guard.clone() {
            return Ok(snapshot);
        }

        let local = self
            .local_node
            .read()
            .clone()
            .ok_or(ClusterError::ManagerStopped)?;
        let version = self.top_ver.load(Ordering::SeqCst);
        let snapshot = self.build_snapshot(version, local);
        *guard = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn resolve_snapshot(&self, top_ver: Option<u64>) -> Result<Arc<TopologySnapshot>> {
        let current = self.current_snapshot()?;
        match top_ver {
            None => Ok(current),
            Some(ver) if ver == current.version() => Ok(current),
            Some(ver) => self
                .history
                .resolve(ver)
                .ok_or(ClusterError::TopologyHistoryMiss { requested: ver }),
        }
    }

    /// Reconnect preparation: the next incarnation starts from scratch.
    fn reset_for_reconnect(&self) {
        self.top_ver.store(0, Ordering::SeqCst);
        self.history.clear();
        *self.snapshot.write() = None;
        debug!("discovery state reset for reconnect");
    }

    fn refresh_local_node(&self) {
        let local = self.transport.local_node();
        *self.local_node.write() = Some(local);
    }

    /// Watchdog escalation: a segmentation event about the local node.
    fn emit_local_segmented(self: &Arc<Self>) {
        let local = self.local_node_or_transport();
        let snapshot = self
            .snapshot
            .read()
            .clone()
            .map(|s| s.all_nodes(None))
            .unwrap_or_default();

        self.on_raw_event(RawDiscoveryEvent {
            kind: EventKind::NodeSegmented,
            topology_version: self.top_ver.load(Ordering::SeqCst),
            node: local,
            snapshot,
            history: None,
        });
    }

    /// Fatal attribute checks: deployment mode and peer class loading
    /// always, data center only between two non-daemon nodes.
    fn check_attribute_compatibility(
        &self,
        local: &GridNode,
        remote: &GridNode,
    ) -> Result<()> {
        let local_mode = local.attributes().str_attr(attr_keys::DEPLOYMENT_MODE);
        let remote_mode = remote.attributes().str_attr(attr_keys::DEPLOYMENT_MODE);
        if local_mode != remote_mode {
            return Err(ClusterError::AttributeMismatch {
                attribute: "deployment mode".to_string(),
                remote_id: remote.id().to_string(),
                local: format!("{:?}", local_mode),
                remote: format!("{:?}", remote_mode),
            });
        }

        let local_p2p = local.attributes().bool_attr(attr_keys::PEER_CLASS_LOADING);
        let remote_p2p = remote.attributes().bool_attr(attr_keys::PEER_CLASS_LOADING);
        if local_p2p != remote_p2p {
            return Err(ClusterError::AttributeMismatch {
                attribute: "peer class loading".to_string(),
                remote_id: remote.id().to_string(),
                local: format!("{:?}", local_p2p),
                remote: format!("{:?}", remote_p2p),
            });
        }

        if !local.is_daemon() && !remote.is_daemon() {
            let local_dc = local.attributes().int_attr(attr_keys::DATA_CENTER_ID);
            let remote_dc = remote.attributes().int_attr(attr_keys::DATA_CENTER_ID);
            if local_dc != remote_dc {
                return Err(ClusterError::AttributeMismatch {
                    attribute: "data center id".to_string(),
                    remote_id: remote.id().to_string(),
                    local: format!("{:?}", local_dc),
                    remote: format!("{:?}", remote_dc),
                });
            }
        }

        Ok(())
    }

    /// Minor drift is logged, never fatal.
    fn warn_attribute_drift(&self, local: &GridNode, remote: &GridNode) {
        let local_ipv4 = local.attributes().bool_attr(attr_keys::PREFER_IPV4);
        let remote_ipv4 = remote.attributes().bool_attr(attr_keys::PREFER_IPV4);
        if local_ipv4 != remote_ipv4 {
            warn!(
                remote = %remote.id(),
                local = ?local_ipv4,
                remote_value = ?remote_ipv4,
                "nodes disagree on IPv4 preference, mixed-stack clusters may misroute"
            );
        }

        let local_libs = local.attributes().str_list_attr(attr_keys::LIBRARIES);
        let remote_libs = remote.attributes().str_list_attr(attr_keys::LIBRARIES);
        if local_libs != remote_libs {
            warn!(
                remote = %remote.id(),
                "nodes run different library sets"
            );
        }
    }
}

impl Drop for DiscoveryManager {
    fn drop(&mut self) {
        if self.inner.started.load(Ordering::SeqCst) && !self.inner.stopped.load(Ordering::SeqCst)
        {
            self.stop(true);
        }
    }
}
