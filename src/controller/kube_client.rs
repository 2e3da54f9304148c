//! Kubernetes API access used by resources
//!
//! Resources reach the API server only through these traits so that the
//! pipeline can be exercised without a cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::AWSConfig;
use crate::error::{Error, Result};

pub const FIELD_MANAGER: &str = "aws-operator";

/// Writes to the AWSConfig status subresource.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Merge-patch `patch` into the status of the named AWSConfig.
    async fn patch_status(&self, namespace: &str, name: &str, patch: serde_json::Value)
        -> Result<()>;

    /// Subnets already allocated to any AWSConfig.
    async fn allocated_subnets(&self) -> Result<Vec<String>>;
}

/// Objects the operator maintains in the host cluster for each tenant.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HostObjects: Send + Sync {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    async fn apply_namespace(&self, namespace: Namespace) -> Result<()>;

    async fn delete_namespace(&self, name: &str) -> Result<()>;

    async fn apply_service(&self, service: Service) -> Result<()>;

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    async fn apply_endpoints(&self, endpoints: Endpoints) -> Result<()>;

    async fn delete_endpoints(&self, namespace: &str, name: &str) -> Result<()>;
}

/// kube-rs backed implementation of both traits.
#[derive(Clone)]
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn ignore_not_found(result: std::result::Result<(), kube::Error>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(e) => Err(Error::KubeError(e)),
    }
}

fn object_name(meta: &kube::api::ObjectMeta) -> Result<String> {
    meta.name
        .clone()
        .ok_or_else(|| Error::InvalidConfig("object has no name".to_string()))
}

#[async_trait]
impl StatusWriter for KubeClientImpl {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<()> {
        let api: Api<AWSConfig> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": patch });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(Error::KubeError)?;
        debug!(%namespace, %name, "Patched AWSConfig status");
        Ok(())
    }

    async fn allocated_subnets(&self) -> Result<Vec<String>> {
        let api: Api<AWSConfig> = Api::all(self.client.clone());
        let configs = api
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?;
        Ok(configs
            .items
            .iter()
            .filter_map(|c| c.status_cidr().map(str::to_string))
            .collect())
    }
}

#[async_trait]
impl HostObjects for KubeClientImpl {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get_opt(name).await.map_err(Error::KubeError)
    }

    async fn apply_namespace(&self, namespace: Namespace) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let name = object_name(&namespace.metadata)?;
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&namespace),
        )
        .await
        .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        ignore_not_found(api.delete(name, &DeleteParams::default()).await.map(|_| ()))
    }

    async fn apply_service(&self, service: Service) -> Result<()> {
        let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let name = object_name(&service.metadata)?;
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&service),
        )
        .await
        .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        ignore_not_found(api.delete(name, &DeleteParams::default()).await.map(|_| ()))
    }

    async fn apply_endpoints(&self, endpoints: Endpoints) -> Result<()> {
        let namespace = endpoints
            .namespace()
            .unwrap_or_else(|| "default".to_string());
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), &namespace);
        let name = object_name(&endpoints.metadata)?;
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&endpoints),
        )
        .await
        .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn delete_endpoints(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        ignore_not_found(api.delete(name, &DeleteParams::default()).await.map(|_| ()))
    }
}
