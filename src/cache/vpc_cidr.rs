//! VPC CIDR lookup, keyed by VPC ID.

use std::time::Duration;

use tracing::debug;

use moka::future::Cache;

use super::lookup_cache;
use crate::aws::Ec2;
use crate::error::{Error, Result};

pub struct VpcCidrCache {
    cache: Cache<String, String>,
}

impl VpcCidrCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: lookup_cache(ttl),
        }
    }

    pub async fn vpc_cidr(&self, ec2: &dyn Ec2, vpc_id: &str) -> Result<String> {
        if vpc_id.is_empty() {
            return Err(Error::InvalidConfig("VPC ID must not be empty".to_string()));
        }

        self.cache
            .try_get_with(vpc_id.to_string(), async {
                let cidr = ec2.describe_vpc_cidr(vpc_id).await?;
                debug!(vpc = %vpc_id, %cidr, "Resolved VPC CIDR");
                Ok(cidr)
            })
            .await
            .map_err(Error::from)
    }
}
