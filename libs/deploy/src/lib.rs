//! # Lattice Deployment Store
//!
//! Local class/task deployment for the Lattice data grid: maps aliases
//! to deployments keyed by the loader that owns the code, records
//! deploy/undeploy events, and serves lookups against the live topology
//! supplied by the cluster core.
//!
//! The store and the discovery side reference each other only through
//! injected handles ([`TopologyView`] here, an event sink there);
//! neither component owns the other.

pub mod deployment;
pub mod error;
pub mod loader;
pub mod spi;
pub mod store;

pub use deployment::{DeployedClass, Deployment};
pub use error::{DeployError, Result};
pub use loader::{
    is_system_class, same_loader, ClassMeta, DeploymentMode, DeploymentRequest, ResourceLoader,
};
pub use spi::{DeploymentSpi, LocalOnlyTopology, ResourceMeta, TopologyView};
pub use store::LocalDeploymentStore;
