//! Pipeline resources and the per-version resource sets
//!
//! Every resource receives its dependencies through [`ResourceConfig`] at
//! boot. The sets below are the only place the pipeline order is written
//! down; the same order is used for creation and deletion so that lookups
//! run before the resources consuming them in both directions.

use std::sync::Arc;

use tracing::debug;

use crate::cache::LookupCaches;
use crate::controller::{
    wrap, Crud, HostObjects, Resource, ResourceRouter, ResourceSet, RetryConfig, StatusWriter,
};
use crate::crd::AWSConfig;
use crate::error::{Error, Result};
use crate::stack::WaitConfig;
use crate::template::TemplateRenderer;

mod accountid;
mod encryptionkey;
mod endpoints;
mod ipam;
mod namespace;
mod s3bucket;
mod service;
mod stack;
mod stackoutput;
mod stacks;
mod vpccidr;

pub use accountid::{AccountIdResource, AccountScope};
pub use encryptionkey::{EncryptionKeyResource, KeyState};
pub use endpoints::EndpointsResource;
pub use ipam::{IpamResource, SubnetAllocator, SubnetPool};
pub use namespace::{NamespaceResource, NamespaceState};
pub use s3bucket::{BucketState, S3BucketResource};
pub use service::ServiceResource;
pub use stack::{StackDefinition, StackResource};
pub use stackoutput::StackOutputResource;
pub use stacks::{Cpf, Cpi, Tccp};
pub use vpccidr::VpcCidrResource;

/// Every version bundle this operator reconciles.
pub const VERSION_BUNDLES: &[&str] = &["4.0.0", "4.1.0"];

/// Dependencies shared by the resources of every set.
#[derive(Clone)]
pub struct ResourceConfig {
    pub caches: Arc<LookupCaches>,
    pub status: Arc<dyn StatusWriter>,
    pub host_objects: Arc<dyn HostObjects>,
    pub renderer: Arc<dyn TemplateRenderer>,
    /// Name of the installation, tagged onto every AWS object.
    pub installation: String,
    /// VPC of the host cluster that tenant VPCs are peered with.
    pub host_vpc_id: String,
    /// `Name` tags of the host route tables receiving tenant routes.
    pub host_route_tables: Vec<String>,
    /// Allocator of tenant subnets, shared by every resource set.
    pub subnets: Arc<SubnetAllocator>,
    pub stack_wait: WaitConfig,
    pub retry: RetryConfig,
}

impl ResourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.installation.is_empty() {
            return Err(Error::InvalidConfig("installation name must not be empty".into()));
        }
        if self.host_vpc_id.is_empty() {
            return Err(Error::InvalidConfig("host VPC ID must not be empty".into()));
        }
        if self.stack_wait.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("stack poll interval must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig("retry attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Build the resource set reconciling clusters pinned to `version`.
pub fn resource_set(version: &str, config: &ResourceConfig) -> Result<ResourceSet> {
    let mut resources: Vec<Arc<dyn Resource>> = vec![
        Arc::new(AccountIdResource::new(AccountScope::Tenant, config)),
        Arc::new(AccountIdResource::new(AccountScope::Host, config)),
        Arc::new(IpamResource::new(config)),
        Arc::new(VpcCidrResource::new(config)),
    ];

    match version {
        "4.0.0" => {}
        "4.1.0" => resources.push(Arc::new(Crud::new(EncryptionKeyResource::new(config)))),
        other => return Err(Error::InvalidVersionBundle(other.to_string())),
    }

    resources.extend([
        Arc::new(Crud::new(S3BucketResource::new(config))) as Arc<dyn Resource>,
        Arc::new(Crud::new(StackResource::new(Cpi::new(config), config))),
        Arc::new(Crud::new(StackResource::new(Tccp::new(config), config))),
        Arc::new(StackOutputResource::new(config)),
        Arc::new(Crud::new(StackResource::new(Cpf::new(config), config))),
        Arc::new(Crud::new(NamespaceResource::new(config))),
        Arc::new(ServiceResource::new(config)),
        Arc::new(EndpointsResource::new(config)),
    ]);

    Ok(ResourceSet::new(version, wrap(resources, &config.retry)))
}

/// Build and validate the router covering [`VERSION_BUNDLES`].
pub fn new_router(config: &ResourceConfig) -> Result<ResourceRouter> {
    config.validate()?;
    let mut router = ResourceRouter::new();
    for version in VERSION_BUNDLES {
        router.register(resource_set(version, config)?)?;
    }
    router.validate(VERSION_BUNDLES)?;
    Ok(router)
}

/// Merge `patch` into the status of `obj`.
pub(crate) async fn write_status(
    status: &dyn StatusWriter,
    obj: &AWSConfig,
    patch: serde_json::Value,
) -> Result<()> {
    debug!(cluster = %obj.cluster_id(), %patch, "Writing status");
    status
        .patch_status(&obj.namespace_or_default(), &kube::ResourceExt::name_any(obj), patch)
        .await
}
