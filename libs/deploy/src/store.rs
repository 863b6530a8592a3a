//! Local Deployment Store
//!
//! Concurrent multimap from alias to a stack of deployments. Mutations
//! run under one lock; read paths walk the concurrent index lock-free
//! and tolerate in-progress inserts because every deployment carries its
//! own undeployed flag.
//!
//! A deployment reachable through several aliases is one shared
//! instance, indexed under each alias and under its class name.
//! Undeploying a loader sweeps every alias, marks matching deployments
//! undeployed under the lock, and releases their resources after the
//! lock is dropped, exactly once per deployment.

use crate::deployment::Deployment;
use crate::error::{DeployError, Result};
use crate::loader::{
    is_system_class, ClassMeta, DeploymentMode, DeploymentRequest, ResourceLoader,
};
use crate::spi::{DeploymentSpi, TopologyView};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{DeploymentEvent, Event, EventKind, EventSink};

type ReleaseHook = Box<dyn Fn(&Deployment) + Send + Sync>;

pub struct LocalDeploymentStore {
    spi: Arc<dyn DeploymentSpi>,
    topology: Arc<dyn TopologyView>,
    events: Arc<dyn EventSink>,

    default_mode: DeploymentMode,
    /// Code revision active on this node; stamped into new deployments.
    user_version: String,
    /// Fallback loader for auto-deployment without a caller loader.
    system_loader: Option<Arc<dyn ResourceLoader>>,

    /// alias (or class name) -> stack of deployments, newest first.
    aliases: DashMap<String, VecDeque<Arc<Deployment>>>,
    /// Single mutation lock; reads stay lock-free.
    mutate: Mutex<()>,
    /// Marshaller/annotation cache releases and similar cleanups.
    release_hooks: RwLock<Vec<ReleaseHook>>,
}

impl LocalDeploymentStore {
    pub fn new(
        spi: Arc<dyn DeploymentSpi>,
        topology: Arc<dyn TopologyView>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            spi,
            topology,
            events,
            default_mode: DeploymentMode::default(),
            user_version: String::new(),
            system_loader: None,
            aliases: DashMap::new(),
            mutate: Mutex::new(()),
            release_hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn with_mode(mut self, mode: DeploymentMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_user_version(mut self, user_version: impl Into<String>) -> Self {
        self.user_version = user_version.into();
        self
    }

    pub fn with_system_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.system_loader = Some(loader);
        self
    }

    /// Register a cleanup invoked once per deployment that becomes
    /// obsolete.
    pub fn add_release_hook(&self, hook: impl Fn(&Deployment) + Send + Sync + 'static) {
        self.release_hooks.write().push(Box::new(hook));
    }

    /// Resolve a deployment for a request: local index first, then the
    /// SPI, then auto-deployment with the caller's (or system) loader.
    /// Peer requests from dead senders and alias conflicts resolve to
    /// `None`.
    pub fn get_deployment(&self, req: &DeploymentRequest) -> Option<Arc<Deployment>> {
        if let Some(sender) = req.sender_id {
            if !self.topology.alive(sender) {
                warn!(sender = %sender, alias = %req.alias, "deployment request from a dead node refused");
                return None;
            }
        }

        if let Some(dep) = self.find_alias(&req.alias) {
            return Some(dep);
        }

        if let Some(meta) = self.spi.find_resource(&req.alias) {
            let class = ClassMeta::new(meta.class_name.clone(), meta.task);
            return self
                .deploy(self.default_mode, meta.loader, &class, &req.alias, true)
                .ok();
        }

        self.auto_deploy(req)
    }

    fn auto_deploy(&self, req: &DeploymentRequest) -> Option<Arc<Deployment>> {
        let loader = req
            .loader
            .clone()
            .or_else(|| self.system_loader.clone())?;

        // A peer loader means we are already running peer-deployed code;
        // registering it locally would shadow the real origin.
        if loader.is_peer_loader() {
            debug!(alias = %req.alias, "nested peer-deployment execution, auto-deploy skipped");
            return None;
        }

        let class = match loader.load_class(&req.class_name) {
            Some(class) => class,
            None => {
                debug!(class = %req.class_name, "class not found by loader, no auto-deploy");
                return None;
            }
        };

        if let Err(err) = self.spi.register(&loader, &class) {
            warn!(class = %class.name, error = %err, "auto-deploy registration failed");
            self.record_deploy_failed(&class, &req.alias);
            return None;
        }

        // Refetch through the SPI so the stored loader is the SPI's view.
        let meta = self.spi.find_resource(&req.alias)?;
        let class = ClassMeta::new(meta.class_name.clone(), meta.task);
        self.deploy(self.default_mode, meta.loader, &class, &req.alias, true)
            .ok()
    }

    /// Deploy a class under an alias. One loader owns one deployment:
    /// redeploying the same loader extends it with the new (class,
    /// alias) pair; a second live loader for an already owned alias is
    /// refused.
    pub fn deploy(
        &self,
        mode: DeploymentMode,
        loader: Arc<dyn ResourceLoader>,
        class: &ClassMeta,
        alias: &str,
        record_event: bool,
    ) -> Result<Arc<Deployment>> {
        let _guard = self.mutate.lock();

        if let Some(existing) = self.find_by_loader(&loader) {
            let added = existing.add_class(&class.name, alias, class.task);
            self.index(alias, &existing);
            if class.name != alias {
                self.index(&class.name, &existing);
            }
            if added && record_event {
                self.record_deploy(&existing, class, alias);
            }
            return Ok(existing);
        }

        if let Some(active) = self.find_alias(alias) {
            if !active.uses_loader(&loader) {
                warn!(
                    alias,
                    owner = %active.loader_id(),
                    "refusing duplicate alias with a different live loader"
                );
                return Err(DeployError::AliasConflict {
                    alias: alias.to_string(),
                });
            }
        }

        let dep = Arc::new(Deployment::new(
            Arc::clone(&loader),
            self.user_version.clone(),
            class.name.clone(),
            mode,
        ));
        dep.add_class(&class.name, alias, class.task);

        self.index(alias, &dep);
        if class.name != alias {
            self.index(&class.name, &dep);
        }

        if record_event {
            self.record_deploy(&dep, class, alias);
        }

        Ok(dep)
    }

    /// Explicitly deploy a class. A peer loader is substituted by its
    /// parent so the deployment binds to the real code origin.
    pub fn explicit_deploy(
        &self,
        class: &ClassMeta,
        loader: Arc<dyn ResourceLoader>,
    ) -> Result<Arc<Deployment>> {
        let loader = if loader.is_peer_loader() {
            loader.parent().unwrap_or(loader)
        } else {
            loader
        };

        if let Err(err) = self.spi.register(&loader, class) {
            self.record_deploy_failed(class, &class.name);
            return Err(err);
        }

        self.deploy(self.default_mode, loader, class, &class.name, true)
    }

    /// Undeploy everything resolved through `loader`.
    pub fn undeploy(&self, loader: &Arc<dyn ResourceLoader>) {
        let mut obsolete: Vec<Arc<Deployment>> = Vec::new();

        {
            let _guard = self.mutate.lock();

            let keys: Vec<String> = self.aliases.iter().map(|e| e.key().clone()).collect();
            for key in keys {
                let mut now_empty = false;
                if let Some(mut entry) = self.aliases.get_mut(&key) {
                    entry.retain(|dep| {
                        if dep.uses_loader(loader) {
                            if dep.undeploy() {
                                obsolete.push(Arc::clone(dep));
                            }
                            false
                        } else {
                            true
                        }
                    });
                    now_empty = entry.is_empty();
                }
                if now_empty {
                    self.aliases.remove_if(&key, |_, deque| deque.is_empty());
                }
            }
        }

        // Resource release runs outside the lock and once per
        // deployment, however many aliases pointed at it.
        for dep in obsolete {
            if !dep.claim_release() {
                continue;
            }

            self.spi.on_released(dep.loader());
            for hook in self.release_hooks.read().iter() {
                hook(&dep);
            }

            for class in dep.classes() {
                let kind = if class.task {
                    EventKind::TaskUndeployed
                } else {
                    EventKind::ClassUndeployed
                };
                self.events.record(Event::Deployment(DeploymentEvent::new(
                    kind,
                    class.alias.clone(),
                    class.class_name.clone(),
                )));
                info!(
                    class = %class.class_name,
                    alias = %class.alias,
                    "undeployed"
                );
            }
        }
    }

    /// Live deployment for an alias, newest first.
    pub fn find_alias(&self, alias: &str) -> Option<Arc<Deployment>> {
        let entry = self.aliases.get(alias)?;
        entry.iter().find(|d| !d.is_undeployed()).cloned()
    }

    /// Number of live deployments (distinct, across all index keys).
    pub fn live_deployments(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        for entry in self.aliases.iter() {
            for dep in entry.value() {
                if !dep.is_undeployed() {
                    seen.insert(dep.loader_id());
                }
            }
        }
        seen.len()
    }

    fn find_by_loader(&self, loader: &Arc<dyn ResourceLoader>) -> Option<Arc<Deployment>> {
        for entry in self.aliases.iter() {
            if let Some(dep) = entry
                .value()
                .iter()
                .find(|d| !d.is_undeployed() && d.uses_loader(loader))
            {
                return Some(Arc::clone(dep));
            }
        }
        None
    }

    fn index(&self, key: &str, dep: &Arc<Deployment>) {
        let mut entry = self.aliases.entry(key.to_string()).or_default();
        if !entry.iter().any(|d| d.loader_id() == dep.loader_id()) {
            entry.push_front(Arc::clone(dep));
        }
    }

    fn record_deploy(&self, dep: &Arc<Deployment>, class: &ClassMeta, alias: &str) {
        let kind = if class.task {
            EventKind::TaskDeployed
        } else {
            EventKind::ClassDeployed
        };
        self.events.record(Event::Deployment(DeploymentEvent::new(
            kind,
            alias,
            class.name.clone(),
        )));

        if is_system_class(&class.name) {
            debug!(class = %class.name, alias, id = %dep.loader_id(), "deployed system class");
        } else {
            info!(
                class = %class.name,
                alias,
                id = %dep.loader_id(),
                mode = %dep.mode(),
                "deployed"
            );
        }
    }

    fn record_deploy_failed(&self, class: &ClassMeta, alias: &str) {
        let kind = if class.task {
            EventKind::TaskDeployFailed
        } else {
            EventKind::ClassDeployFailed
        };
        self.events.record(Event::Deployment(DeploymentEvent::new(
            kind,
            alias,
            class.name.clone(),
        )));
    }
}
