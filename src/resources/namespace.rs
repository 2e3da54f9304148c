use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use tracing::info;

use super::ResourceConfig;
use crate::controller::{ControllerContext, CrudResource, HostObjects, ResourceState};
use crate::crd::AWSConfig;
use crate::error::Result;
use crate::key;

/// Labels owned by the operator; other labels on the namespace are ignored.
const LABEL_PREFIX: &str = "tenantcluster.io/";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NamespaceState {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl ResourceState for NamespaceState {
    fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    fn identity(&self) -> &str {
        &self.name
    }
}

impl NamespaceState {
    fn to_namespace(&self) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// The host-cluster namespace holding the tenant's API objects.
pub struct NamespaceResource {
    host_objects: Arc<dyn HostObjects>,
    installation: String,
}

impl NamespaceResource {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            host_objects: config.host_objects.clone(),
            installation: config.installation.clone(),
        }
    }
}

#[async_trait]
impl CrudResource for NamespaceResource {
    type State = NamespaceState;

    fn name(&self) -> &str {
        "namespace"
    }

    async fn current_state(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<NamespaceState> {
        let name = key::tenant_namespace(obj.cluster_id());
        let Some(namespace) = self.host_objects.get_namespace(&name).await? else {
            return Ok(NamespaceState::default());
        };

        let terminating = namespace
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            == Some("Terminating");
        if terminating {
            // A terminating namespace rejects new objects until it is gone.
            if !obj.is_being_deleted() {
                info!(cluster = %obj.cluster_id(), namespace = %name, "Namespace is terminating, cancelling remaining resources");
                ctx.cancel_remaining();
            }
            return Ok(NamespaceState::default());
        }

        let labels = namespace
            .metadata
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter(|(k, _)| k.starts_with(LABEL_PREFIX))
            .collect();
        Ok(NamespaceState { name, labels })
    }

    fn desired_state(
        &self,
        obj: &AWSConfig,
        _ctx: &mut ControllerContext,
    ) -> Result<NamespaceState> {
        Ok(NamespaceState {
            name: key::tenant_namespace(obj.cluster_id()),
            labels: key::cluster_tags(obj, &self.installation),
        })
    }

    async fn apply_create_change(
        &self,
        obj: &AWSConfig,
        _ctx: &mut ControllerContext,
        change: &NamespaceState,
    ) -> Result<()> {
        self.host_objects.apply_namespace(change.to_namespace()).await?;
        info!(cluster = %obj.cluster_id(), namespace = %change.name, "Created namespace");
        Ok(())
    }

    async fn apply_update_change(
        &self,
        _obj: &AWSConfig,
        _ctx: &mut ControllerContext,
        change: &NamespaceState,
    ) -> Result<()> {
        self.host_objects.apply_namespace(change.to_namespace()).await
    }

    async fn apply_delete_change(
        &self,
        obj: &AWSConfig,
        _ctx: &mut ControllerContext,
        change: &NamespaceState,
    ) -> Result<()> {
        self.host_objects.delete_namespace(&change.name).await?;
        info!(cluster = %obj.cluster_id(), namespace = %change.name, "Deleted namespace");
        Ok(())
    }
}
