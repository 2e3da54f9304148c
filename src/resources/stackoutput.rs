use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::{write_status, ResourceConfig};
use crate::controller::{ControllerContext, Resource, StatusWriter};
use crate::crd::AWSConfig;
use crate::error::Result;
use crate::key;
use crate::stack::{StackKind, StackLifecycle, StackStatus};

/// Gate between the tenant stack and everything consuming its outputs.
///
/// Until the TCCP stack is complete the rest of the pass is cancelled. Once
/// it is, the outputs are copied into the context and, when they changed,
/// into the status.
pub struct StackOutputResource {
    status: Arc<dyn StatusWriter>,
}

impl StackOutputResource {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            status: config.status.clone(),
        }
    }
}

#[async_trait]
impl Resource for StackOutputResource {
    fn name(&self) -> &str {
        "stackoutput"
    }

    async fn ensure_created(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        let kind = StackKind::Tccp;
        let name = obj
            .status_stack_name(kind.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| kind.stack_name(obj.cluster_id()));

        let cloudformation = ctx.tenant.cloudformation.clone();
        let stack = StackLifecycle::new(cloudformation.as_ref())
            .describe(&name)
            .await?;
        let Some(stack) = stack.filter(|s| StackStatus::parse(&s.status).is_complete()) else {
            info!(stack = %name, "Tenant stack not complete yet, cancelling remaining resources");
            ctx.cancel_remaining();
            return Ok(());
        };

        let tccp = &mut ctx.status.tenant_cluster.tccp;
        tccp.worker_asg_name = stack.outputs.get(key::WORKER_ASG_NAME_OUTPUT).cloned();
        tccp.worker_asg_desired_capacity =
            match stack.parsed_output(key::WORKER_ASG_DESIRED_CAPACITY_OUTPUT)? {
                Some(capacity) => Some(capacity),
                None => stack.parsed_parameter(key::WORKER_COUNT_PARAMETER)?,
            };
        tccp.vpc_peering_connection_id = stack
            .outputs
            .get(key::VPC_PEERING_CONNECTION_ID_OUTPUT)
            .cloned();
        tccp.hosted_zone_name_servers = stack
            .outputs
            .get(key::HOSTED_ZONE_NAME_SERVERS_OUTPUT)
            .cloned();
        tccp.outputs = stack.outputs.clone();
        tccp.is_complete = true;

        let recorded_asg = obj
            .status
            .as_ref()
            .and_then(|s| s.aws.autoscaling_group.name.clone());
        let recorded_capacity = obj.status_asg_desired_capacity();
        let recorded_outputs = obj
            .status
            .as_ref()
            .map(|s| s.aws.stack_outputs.clone())
            .unwrap_or_default();
        if recorded_asg == tccp.worker_asg_name
            && recorded_capacity == tccp.worker_asg_desired_capacity
            && recorded_outputs == stack.outputs
        {
            debug!(stack = %name, "Stack outputs already recorded");
            return Ok(());
        }

        let patch = json!({
            "aws": {
                "autoscalingGroup": {
                    "name": tccp.worker_asg_name,
                    "desiredCapacity": tccp.worker_asg_desired_capacity,
                },
                "stackOutputs": stack.outputs,
            }
        });
        write_status(self.status.as_ref(), obj, patch).await
    }

    async fn ensure_deleted(&self, _obj: &AWSConfig, _ctx: &mut ControllerContext) -> Result<()> {
        Ok(())
    }
}
