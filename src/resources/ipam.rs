use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{write_status, ResourceConfig};
use crate::controller::{ControllerContext, Resource, StatusWriter};
use crate::crd::AWSConfig;
use crate::error::{Error, Result};

/// The network tenant subnets are carved out of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubnetPool {
    network: Ipv4Addr,
    prefix: u8,
    subnet_prefix: u8,
}

fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u8)> {
    let invalid = || Error::InvalidConfig(format!("invalid IPv4 CIDR {:?}", cidr));
    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr = Ipv4Addr::from_str(addr).map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }
    Ok((addr, prefix))
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

impl SubnetPool {
    pub fn new(network: &str, subnet_prefix: u8) -> Result<Self> {
        let (addr, prefix) = parse_cidr(network)?;
        if subnet_prefix < prefix || subnet_prefix > 32 {
            return Err(Error::InvalidConfig(format!(
                "subnet prefix /{} does not fit into {}",
                subnet_prefix, network
            )));
        }
        if u32::from(addr) & !mask(prefix) != 0 {
            return Err(Error::InvalidConfig(format!(
                "{} has host bits set",
                network
            )));
        }
        Ok(Self {
            network: addr,
            prefix,
            subnet_prefix,
        })
    }

    /// The first subnet of the pool not in `allocated`.
    pub fn next_free(&self, allocated: &[String]) -> Option<String> {
        let taken: HashSet<&str> = allocated.iter().map(String::as_str).collect();
        let base = u32::from(self.network);
        let step = 1u64 << (32 - self.subnet_prefix);
        let count = 1u64 << (self.subnet_prefix - self.prefix);

        (0..count)
            .map(|i| Ipv4Addr::from((base as u64 + i * step) as u32))
            .map(|addr| format!("{}/{}", addr, self.subnet_prefix))
            .find(|cidr| !taken.contains(cidr.as_str()))
    }
}

/// Hands out subnets of a [`SubnetPool`] one cluster at a time.
///
/// Shared by every resource set of the process. The lock is held from
/// listing the recorded subnets until the pick is written back, so two
/// clusters reconciled at the same time never see the same free subnet.
pub struct SubnetAllocator {
    pool: SubnetPool,
    lock: Mutex<()>,
}

impl SubnetAllocator {
    pub fn new(pool: SubnetPool) -> Self {
        Self {
            pool,
            lock: Mutex::new(()),
        }
    }

    /// Allocate the next free subnet for `obj` and record it in its status.
    pub async fn allocate(&self, status: &dyn StatusWriter, obj: &AWSConfig) -> Result<String> {
        let _guard = self.lock.lock().await;

        let allocated = status.allocated_subnets().await?;
        let cidr = self
            .pool
            .next_free(&allocated)
            .ok_or_else(|| Error::ExecutionFailed("tenant subnet pool is exhausted".into()))?;

        write_status(
            status,
            obj,
            json!({ "cluster": { "network": { "cidr": cidr } } }),
        )
        .await?;
        Ok(cidr)
    }
}

/// Ensures the tenant cluster has a subnet.
///
/// A subnet recorded in the status is authoritative. Otherwise the next free
/// subnet of the pool is allocated and recorded before anything consumes it.
pub struct IpamResource {
    status: Arc<dyn StatusWriter>,
    subnets: Arc<SubnetAllocator>,
}

impl IpamResource {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            status: config.status.clone(),
            subnets: config.subnets.clone(),
        }
    }
}

#[async_trait]
impl Resource for IpamResource {
    fn name(&self) -> &str {
        "ipam"
    }

    async fn ensure_created(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        if let Some(cidr) = obj.status_cidr() {
            debug!(cluster = %obj.cluster_id(), %cidr, "Subnet already allocated");
            ctx.status.tenant_cluster.cidr = Some(cidr.to_string());
            return Ok(());
        }

        let cidr = self.subnets.allocate(self.status.as_ref(), obj).await?;
        info!(cluster = %obj.cluster_id(), %cidr, "Allocated subnet");
        ctx.status.tenant_cluster.cidr = Some(cidr);
        Ok(())
    }

    async fn ensure_deleted(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        ctx.status.tenant_cluster.cidr = obj.status_cidr().map(str::to_string);
        Ok(())
    }
}
