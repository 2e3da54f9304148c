//! Controller module for AWSConfig reconciliation
//!
//! This module contains the controller loop, the resource contract and the
//! pipeline machinery every resource set is built from.

pub mod conditions;
mod context;
mod finalizers;
mod kube_client;
mod leader;
pub mod metrics;
mod pipeline;
mod reconciler;
mod resource;
mod router;
mod wrappers;

pub use context::{
    ContextStatus, ControlPlaneStatus, ControllerContext, Degradation, Signals, TccpStatus,
    TenantClusterStatus,
};
pub use finalizers::{add_finalizer, has_finalizer, remove_finalizer, AWS_CONFIG_FINALIZER};
pub use kube_client::{HostObjects, KubeClientImpl, StatusWriter, FIELD_MANAGER};
pub use leader::{decide, LeaderElector, LeaseConfig, LeaseDecision, LEASE_NAME};
#[cfg(test)]
pub use kube_client::{MockHostObjects, MockStatusWriter};
pub use pipeline::{PassOutcome, ResourceSet};
pub use reconciler::{next_action, run_controller, ControllerState, PassAction};
pub use resource::{Crud, CrudResource, Patch, Resource, ResourceState};
pub use router::ResourceRouter;
pub use wrappers::{wrap, MetricsResource, RetryConfig, RetryResource};
