//! Test fixtures: map-backed loaders, an in-memory SPI and capture
//! sinks for deployment events.

#![allow(dead_code)]

use deploy::{ClassMeta, DeployError, DeploymentSpi, ResourceLoader, ResourceMeta, TopologyView};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use types::{DeploymentEvent, Event, EventKind, EventSink, GridNode};
use uuid::Uuid;

/// Loader resolving classes from a fixed map.
#[derive(Default)]
pub struct MapLoader {
    classes: HashMap<String, ClassMeta>,
}

impl MapLoader {
    pub fn with_class(class: ClassMeta) -> Self {
        let mut classes = HashMap::new();
        classes.insert(class.name.clone(), class);
        Self { classes }
    }
}

impl ResourceLoader for MapLoader {
    fn load_class(&self, name: &str) -> Option<ClassMeta> {
        self.classes.get(name).cloned()
    }
}

/// Loader standing in for peer-fetched code, delegating to its origin.
pub struct PeerLoader {
    origin: Arc<dyn ResourceLoader>,
}

impl PeerLoader {
    pub fn new(origin: Arc<dyn ResourceLoader>) -> Self {
        Self { origin }
    }
}

impl ResourceLoader for PeerLoader {
    fn load_class(&self, name: &str) -> Option<ClassMeta> {
        self.origin.load_class(name)
    }

    fn is_peer_loader(&self) -> bool {
        true
    }

    fn parent(&self) -> Option<Arc<dyn ResourceLoader>> {
        Some(Arc::clone(&self.origin))
    }
}

struct SpiEntry {
    meta: ResourceMeta,
}

/// In-memory SPI registry with failure injection.
#[derive(Default)]
pub struct TestSpi {
    registry: Mutex<HashMap<String, SpiEntry>>,
    registrations: AtomicUsize,
    releases: AtomicUsize,
    fail: AtomicBool,
}

impl TestSpi {
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn fail_registrations(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl DeploymentSpi for TestSpi {
    fn register(
        &self,
        loader: &Arc<dyn ResourceLoader>,
        class: &ClassMeta,
    ) -> deploy::Result<bool> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeployError::Registration {
                class_name: class.name.clone(),
                message: "registry unavailable".to_string(),
            });
        }

        let mut registry = self.registry.lock();
        let fresh = !registry.contains_key(&class.name);
        registry.insert(
            class.name.clone(),
            SpiEntry {
                meta: ResourceMeta {
                    class_name: class.name.clone(),
                    alias: class.name.clone(),
                    task: class.task,
                    loader: Arc::clone(loader),
                },
            },
        );
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(fresh)
    }

    fn find_resource(&self, alias: &str) -> Option<ResourceMeta> {
        self.registry.lock().get(alias).map(|e| e.meta.clone())
    }

    fn on_released(&self, _loader: &Arc<dyn ResourceLoader>) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Topology view with an explicit alive set.
#[derive(Default)]
pub struct StaticTopology {
    alive: Mutex<HashSet<Uuid>>,
}

impl StaticTopology {
    pub fn set_alive(&self, id: Uuid) {
        self.alive.lock().insert(id);
    }
}

impl TopologyView for StaticTopology {
    fn alive(&self, id: Uuid) -> bool {
        self.alive.lock().contains(&id)
    }

    fn node(&self, _id: Uuid) -> Option<Arc<GridNode>> {
        None
    }
}

/// Sink capturing deployment events for assertions.
#[derive(Default)]
pub struct CapturingSink {
    events: Mutex<Vec<Event>>,
}

impl CapturingSink {
    pub fn by_kind(&self, kind: EventKind) -> Vec<DeploymentEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Deployment(d) if d.kind == kind => Some(d.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for CapturingSink {
    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}
