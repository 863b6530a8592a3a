//! Deployment Record
//!
//! One unit of deployed code: the loader it came from, a fresh loader id
//! unique within the node's lifetime, the user version active at deploy
//! time, and the set of (class, alias) pairs resolved through it. A
//! deployment indexed under several aliases is one shared instance;
//! undeploying its loader retires every alias at once.

use crate::loader::{same_loader, DeploymentMode, ResourceLoader};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A (class, alias) pair resolved through a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedClass {
    pub class_name: String,
    pub alias: String,
    pub task: bool,
}

pub struct Deployment {
    loader: Arc<dyn ResourceLoader>,
    loader_id: Uuid,
    user_version: String,
    primary_class: String,
    mode: DeploymentMode,
    undeployed: AtomicBool,
    released: AtomicBool,
    classes: RwLock<Vec<DeployedClass>>,
}

impl Deployment {
    pub fn new(
        loader: Arc<dyn ResourceLoader>,
        user_version: impl Into<String>,
        primary_class: impl Into<String>,
        mode: DeploymentMode,
    ) -> Self {
        Self {
            loader,
            loader_id: Uuid::new_v4(),
            user_version: user_version.into(),
            primary_class: primary_class.into(),
            mode,
            undeployed: AtomicBool::new(false),
            released: AtomicBool::new(false),
            classes: RwLock::new(Vec::new()),
        }
    }

    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    /// Fresh id assigned at deploy time; unique within the node's
    /// lifetime even when a loader is redeployed.
    pub fn loader_id(&self) -> Uuid {
        self.loader_id
    }

    pub fn user_version(&self) -> &str {
        &self.user_version
    }

    pub fn primary_class(&self) -> &str {
        &self.primary_class
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn uses_loader(&self, loader: &Arc<dyn ResourceLoader>) -> bool {
        same_loader(&self.loader, loader)
    }

    pub fn is_undeployed(&self) -> bool {
        self.undeployed.load(Ordering::SeqCst)
    }

    /// Mark undeployed; `true` only for the first caller.
    pub fn undeploy(&self) -> bool {
        !self.undeployed.swap(true, Ordering::SeqCst)
    }

    /// Claim the resource-release step; `true` only for the first
    /// caller, so release callbacks run exactly once.
    pub fn claim_release(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }

    /// Record a (class, alias) pair; `false` when already present.
    pub fn add_class(&self, class_name: &str, alias: &str, task: bool) -> bool {
        let mut classes = self.classes.write();
        if classes
            .iter()
            .any(|c| c.class_name == class_name && c.alias == alias)
        {
            return false;
        }
        classes.push(DeployedClass {
            class_name: class_name.to_string(),
            alias: alias.to_string(),
            task,
        });
        true
    }

    pub fn classes(&self) -> Vec<DeployedClass> {
        self.classes.read().clone()
    }
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployment")
            .field("loader_id", &self.loader_id)
            .field("user_version", &self.user_version)
            .field("primary_class", &self.primary_class)
            .field("mode", &self.mode)
            .field("undeployed", &self.is_undeployed())
            .field("classes", &self.classes.read().len())
            .finish()
    }
}
