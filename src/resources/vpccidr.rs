use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::ResourceConfig;
use crate::cache::LookupCaches;
use crate::controller::{ControllerContext, Resource};
use crate::crd::AWSConfig;
use crate::error::Result;

/// Resolves the host VPC facts the peering stacks need: the VPC CIDR through
/// the process cache and the IDs of the configured route tables. A missing
/// route table degrades the cluster and holds back the finalizer stack
/// instead of failing the pass, so deletion is never blocked by it.
pub struct VpcCidrResource {
    caches: Arc<LookupCaches>,
    vpc_id: String,
    route_tables: Vec<String>,
}

impl VpcCidrResource {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            caches: config.caches.clone(),
            vpc_id: config.host_vpc_id.clone(),
            route_tables: config.host_route_tables.clone(),
        }
    }

    async fn resolve(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        let cidr = self
            .caches
            .vpc_cidr
            .vpc_cidr(ctx.host.ec2.as_ref(), &self.vpc_id)
            .await?;
        debug!(vpc_id = %self.vpc_id, %cidr, "Resolved host VPC CIDR");
        ctx.status.control_plane.vpc_cidr = Some(cidr);

        if self.route_tables.is_empty() {
            return Ok(());
        }
        let tables = ctx
            .host
            .ec2
            .describe_route_tables(self.route_tables.clone())
            .await?;
        let missing: Vec<&str> = self
            .route_tables
            .iter()
            .filter(|name| !tables.iter().any(|t| &t.name == *name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            warn!(cluster = %obj.cluster_id(), missing = ?missing, "Host route tables not found");
            ctx.status.control_plane.route_tables_missing = true;
            ctx.report_degraded(
                "HostRouteTableMissing",
                format!("host route tables not found: {}", missing.join(", ")),
            );
            return Ok(());
        }
        ctx.status.control_plane.route_table_ids = tables.into_iter().map(|t| t.id).collect();
        Ok(())
    }
}

#[async_trait]
impl Resource for VpcCidrResource {
    fn name(&self) -> &str {
        "vpccidr"
    }

    async fn ensure_created(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        self.resolve(obj, ctx).await
    }

    /// Stack deletion needs neither the CIDR nor the route tables.
    async fn ensure_deleted(&self, _obj: &AWSConfig, _ctx: &mut ControllerContext) -> Result<()> {
        Ok(())
    }
}
