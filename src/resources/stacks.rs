//! The three stacks of a tenant cluster
//!
//! - CPI (`<id>-host-setup`) prepares the host account, e.g. the peering
//!   role, and must be complete before the tenant stack is created.
//! - TCCP (`<id>-guest-main`) is the tenant control plane in the tenant
//!   account: VPC, masters, worker autoscaling group.
//! - CPF (`<id>-host-main`) finalizes the host side from TCCP outputs:
//!   peering routes and DNS delegation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use super::stack::StackDefinition;
use super::ResourceConfig;
use crate::aws::AwsClients;
use crate::controller::ControllerContext;
use crate::crd::AWSConfig;
use crate::error::{Error, Result};
use crate::key;
use crate::stack::StackKind;

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str> {
    value.ok_or_else(|| Error::InvalidConfig(format!("{} must be resolved before the stacks", what)))
}

fn tenant_cidr(obj: &AWSConfig, ctx: &ControllerContext) -> Option<String> {
    ctx.status
        .tenant_cluster
        .cidr
        .clone()
        .or_else(|| obj.status_cidr().map(str::to_string))
}

pub struct Cpi {
    host_vpc_id: String,
}

impl Cpi {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            host_vpc_id: config.host_vpc_id.clone(),
        }
    }
}

#[async_trait]
impl StackDefinition for Cpi {
    fn kind(&self) -> StackKind {
        StackKind::Cpi
    }

    fn clients<'a>(&self, ctx: &'a ControllerContext) -> &'a AwsClients {
        &ctx.host
    }

    fn parameters(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let tenant_account_id = required(
            ctx.status.tenant_cluster.account_id.as_deref(),
            "tenant account ID",
        )?;
        Ok(Some(BTreeMap::from([
            ("ClusterID".to_string(), obj.cluster_id().to_string()),
            ("VersionBundleVersion".to_string(), obj.version_bundle().to_string()),
            ("TenantAccountID".to_string(), tenant_account_id.to_string()),
            ("PeerVPCID".to_string(), self.host_vpc_id.clone()),
        ])))
    }

    fn waits_for_creation(&self) -> bool {
        true
    }

    fn record_ready(&self, ctx: &mut ControllerContext) {
        ctx.status.control_plane.cpi_ready = true;
    }
}

pub struct Tccp;

impl Tccp {
    pub fn new(_config: &ResourceConfig) -> Self {
        Self
    }
}

#[async_trait]
impl StackDefinition for Tccp {
    fn kind(&self) -> StackKind {
        StackKind::Tccp
    }

    fn clients<'a>(&self, ctx: &'a ControllerContext) -> &'a AwsClients {
        &ctx.tenant
    }

    fn parameters(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<Option<BTreeMap<String, String>>> {
        if !ctx.status.control_plane.cpi_ready {
            info!(cluster = %obj.cluster_id(), "Host setup stack not ready yet, cancelling remaining resources");
            ctx.cancel_remaining();
            return Ok(None);
        }
        let Some(cidr) = tenant_cidr(obj, ctx) else {
            info!(cluster = %obj.cluster_id(), "No subnet allocated yet, cancelling remaining resources");
            ctx.cancel_remaining();
            return Ok(None);
        };

        let aws = &obj.spec.aws;
        let master = aws
            .masters
            .first()
            .ok_or_else(|| Error::InvalidConfig("cluster has no masters".into()))?;
        let worker = aws
            .workers
            .first()
            .ok_or_else(|| Error::InvalidConfig("cluster has no workers".into()))?;

        let worker_count = obj
            .status_asg_desired_capacity()
            .unwrap_or_else(|| obj.worker_count());
        let bound = |value: i32| if value > 0 { value } else { obj.worker_count() };

        let mut parameters = BTreeMap::from([
            ("ClusterID".to_string(), obj.cluster_id().to_string()),
            ("VersionBundleVersion".to_string(), obj.version_bundle().to_string()),
            ("AvailabilityZone".to_string(), aws.availability_zone.clone()),
            ("MasterImageID".to_string(), master.image_id.clone()),
            ("MasterInstanceType".to_string(), master.instance_type.clone()),
            ("WorkerImageID".to_string(), worker.image_id.clone()),
            ("WorkerInstanceType".to_string(), worker.instance_type.clone()),
            (key::WORKER_COUNT_PARAMETER.to_string(), worker_count.to_string()),
            ("WorkerMin".to_string(), bound(obj.spec.scaling.min).to_string()),
            ("WorkerMax".to_string(), bound(obj.spec.scaling.max).to_string()),
            ("TenantCIDR".to_string(), cidr),
            ("DockerVolumeSizeGB".to_string(), aws.docker_volume_size_gb.to_string()),
        ]);
        if let Some(arn) = &ctx.status.tenant_cluster.encryption_key {
            parameters.insert("EncryptionKeyARN".to_string(), arn.clone());
        }
        if let Some(host_account_id) = &ctx.status.control_plane.account_id {
            parameters.insert("HostAccountID".to_string(), host_account_id.clone());
        }
        Ok(Some(parameters))
    }

    fn termination_protection(&self) -> bool {
        true
    }

    /// Masters carry instance-level termination protection that would make
    /// the stack deletion fail.
    async fn before_delete(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        let masters = ctx
            .tenant
            .ec2
            .describe_instances(key::master_instance_tags(obj.cluster_id()))
            .await?;
        for instance in &masters {
            debug!(instance = %instance.id, "Disabling master termination protection");
            ctx.tenant.ec2.disable_api_termination(&instance.id).await?;
        }
        Ok(())
    }
}

pub struct Cpf;

impl Cpf {
    pub fn new(_config: &ResourceConfig) -> Self {
        Self
    }
}

#[async_trait]
impl StackDefinition for Cpf {
    fn kind(&self) -> StackKind {
        StackKind::Cpf
    }

    fn clients<'a>(&self, ctx: &'a ControllerContext) -> &'a AwsClients {
        &ctx.host
    }

    fn parameters(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let tccp = &ctx.status.tenant_cluster.tccp;
        let (Some(peering), Some(name_servers)) = (
            tccp.vpc_peering_connection_id.clone(),
            tccp.hosted_zone_name_servers.clone(),
        ) else {
            info!(cluster = %obj.cluster_id(), "Tenant stack outputs missing, cancelling remaining resources");
            ctx.cancel_remaining();
            return Ok(None);
        };
        if ctx.status.control_plane.route_tables_missing {
            info!(cluster = %obj.cluster_id(), "Host route tables unresolved, cancelling remaining resources");
            ctx.cancel_remaining();
            return Ok(None);
        }
        let cidr = required(tenant_cidr(obj, ctx).as_deref(), "tenant subnet")?.to_string();

        Ok(Some(BTreeMap::from([
            ("ClusterID".to_string(), obj.cluster_id().to_string()),
            ("VersionBundleVersion".to_string(), obj.version_bundle().to_string()),
            ("VPCPeeringConnectionID".to_string(), peering),
            ("HostedZoneNameServers".to_string(), name_servers),
            (
                "PrivateRouteTableIDs".to_string(),
                ctx.status.control_plane.route_table_ids.join(","),
            ),
            ("TenantCIDR".to_string(), cidr),
        ])))
    }
}
