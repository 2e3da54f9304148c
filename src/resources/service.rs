use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use super::ResourceConfig;
use crate::controller::{ControllerContext, HostObjects, Resource};
use crate::crd::AWSConfig;
use crate::error::Result;
use crate::key;

/// Selector-less Service fronting the tenant API; its Endpoints are
/// maintained by [`super::EndpointsResource`].
pub struct ServiceResource {
    host_objects: Arc<dyn HostObjects>,
    installation: String,
}

impl ServiceResource {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            host_objects: config.host_objects.clone(),
            installation: config.installation.clone(),
        }
    }
}

pub(crate) fn master_service(obj: &AWSConfig, installation: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(key::MASTER_SERVICE_NAME.to_string()),
            namespace: Some(key::tenant_namespace(obj.cluster_id())),
            labels: Some(key::cluster_tags(obj, installation)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![ServicePort {
                name: Some("https".to_string()),
                port: key::API_PORT,
                target_port: Some(IntOrString::Int(key::API_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl Resource for ServiceResource {
    fn name(&self) -> &str {
        "service"
    }

    async fn ensure_created(&self, obj: &AWSConfig, _ctx: &mut ControllerContext) -> Result<()> {
        self.host_objects
            .apply_service(master_service(obj, &self.installation))
            .await
    }

    async fn ensure_deleted(&self, obj: &AWSConfig, _ctx: &mut ControllerContext) -> Result<()> {
        self.host_objects
            .delete_service(&key::tenant_namespace(obj.cluster_id()), key::MASTER_SERVICE_NAME)
            .await
    }
}
