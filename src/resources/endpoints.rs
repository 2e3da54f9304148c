use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EndpointAddress, EndpointPort, EndpointSubset, Endpoints};
use kube::api::ObjectMeta;
use tracing::info;

use super::ResourceConfig;
use crate::controller::{ControllerContext, HostObjects, Resource};
use crate::crd::AWSConfig;
use crate::error::Result;
use crate::key;

/// Points the master Service at the private IPs of the running masters.
pub struct EndpointsResource {
    host_objects: Arc<dyn HostObjects>,
}

impl EndpointsResource {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            host_objects: config.host_objects.clone(),
        }
    }
}

pub(crate) fn master_endpoints(obj: &AWSConfig, ips: &[String]) -> Endpoints {
    Endpoints {
        metadata: ObjectMeta {
            name: Some(key::MASTER_SERVICE_NAME.to_string()),
            namespace: Some(key::tenant_namespace(obj.cluster_id())),
            ..Default::default()
        },
        subsets: Some(vec![EndpointSubset {
            addresses: Some(
                ips.iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.clone(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ports: Some(vec![EndpointPort {
                name: Some("https".to_string()),
                port: key::API_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
    }
}

#[async_trait]
impl Resource for EndpointsResource {
    fn name(&self) -> &str {
        "endpoints"
    }

    async fn ensure_created(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        let instances = ctx
            .tenant
            .ec2
            .describe_instances(key::master_instance_tags(obj.cluster_id()))
            .await?;
        let mut ips: Vec<String> = instances
            .into_iter()
            .filter(|i| i.is_running())
            .filter_map(|i| i.private_ip)
            .collect();
        if ips.is_empty() {
            info!(cluster = %obj.cluster_id(), "No running master yet, cancelling remaining resources");
            ctx.cancel_remaining();
            return Ok(());
        }
        ips.sort();

        self.host_objects
            .apply_endpoints(master_endpoints(obj, &ips))
            .await
    }

    async fn ensure_deleted(&self, obj: &AWSConfig, _ctx: &mut ControllerContext) -> Result<()> {
        self.host_objects
            .delete_endpoints(&key::tenant_namespace(obj.cluster_id()), key::MASTER_SERVICE_NAME)
            .await
    }
}
