//! Operator configuration
//!
//! All settings are command line flags with environment fallbacks. They are
//! turned into the dependencies of the resource sets once at boot.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::cache::LookupCaches;
use crate::controller::{HostObjects, LeaseConfig, RetryConfig, StatusWriter};
use crate::error::{Error, Result};
use crate::resources::{ResourceConfig, SubnetAllocator, SubnetPool};
use crate::stack::WaitConfig;
use crate::template::FileTemplateRenderer;

#[derive(Args, Clone, Debug)]
pub struct OperatorConfig {
    /// Operator namespace
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Installation name tagged onto every AWS object
    #[arg(long, env = "INSTALLATION")]
    pub installation: String,

    /// VPC of the host cluster that tenant VPCs are peered with
    #[arg(long, env = "HOST_VPC_ID")]
    pub host_vpc_id: String,

    /// Name tags of the host route tables receiving tenant routes
    #[arg(long, env = "HOST_ROUTE_TABLES", value_delimiter = ',')]
    pub host_route_tables: Vec<String>,

    /// Network tenant subnets are allocated from
    #[arg(long, env = "TENANT_NETWORK_CIDR", default_value = "10.1.0.0/16")]
    pub tenant_network_cidr: String,

    /// Prefix length of each tenant subnet
    #[arg(long, env = "TENANT_SUBNET_PREFIX", default_value_t = 24)]
    pub tenant_subnet_prefix: u8,

    /// Directory holding `<stack>.yaml` CloudFormation templates
    #[arg(long, env = "TEMPLATE_DIR", default_value = "/etc/aws-operator/templates")]
    pub template_dir: PathBuf,

    /// Attempts per resource call, including the first
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,

    /// Initial retry delay in milliseconds
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value_t = 500)]
    pub retry_base_delay_ms: u64,

    /// Ceiling of the stack create wait in seconds
    #[arg(long, env = "STACK_WAIT_DEADLINE_SECS", default_value_t = 20 * 60)]
    pub stack_wait_deadline_secs: u64,

    /// Poll interval of the stack create wait in seconds
    #[arg(long, env = "STACK_POLL_INTERVAL_SECS", default_value_t = 15)]
    pub stack_poll_interval_secs: u64,

    /// Lifetime of memoized account ID and VPC CIDR lookups in seconds
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 3600)]
    pub cache_ttl_secs: u64,

    /// Bind address of the metrics and health endpoint
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: SocketAddr,

    /// Log in JSON
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    /// Namespace of the leader election lease, defaults to the operator namespace
    #[arg(long, env = "POD_NAMESPACE")]
    pub lease_namespace: Option<String>,

    /// Seconds a leader lease stays valid without renewal
    #[arg(long, env = "LEASE_DURATION_SECS", default_value_t = 15)]
    pub lease_duration_secs: u64,
}

impl OperatorConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_attempts,
            initial_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..Default::default()
        }
    }

    pub fn stack_wait(&self) -> WaitConfig {
        WaitConfig {
            poll_interval: Duration::from_secs(self.stack_poll_interval_secs),
            deadline: Duration::from_secs(self.stack_wait_deadline_secs),
        }
    }

    pub fn lease_namespace(&self) -> &str {
        self.lease_namespace.as_deref().unwrap_or(&self.namespace)
    }

    /// Renewal runs at two thirds of the lease duration.
    pub fn lease(&self) -> LeaseConfig {
        let duration = Duration::from_secs(self.lease_duration_secs.max(3));
        LeaseConfig {
            duration,
            renew_interval: duration * 2 / 3,
            retry_interval: duration / 3,
            ..Default::default()
        }
    }

    /// Assemble and validate the dependencies shared by every resource set.
    pub fn resource_config(
        &self,
        status: Arc<dyn StatusWriter>,
        host_objects: Arc<dyn HostObjects>,
    ) -> Result<ResourceConfig> {
        if self.host_route_tables.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "host route table names must not be empty".into(),
            ));
        }

        let config = ResourceConfig {
            caches: Arc::new(LookupCaches::new(Duration::from_secs(self.cache_ttl_secs))),
            status,
            host_objects,
            renderer: Arc::new(FileTemplateRenderer::new(self.template_dir.clone())),
            installation: self.installation.clone(),
            host_vpc_id: self.host_vpc_id.clone(),
            host_route_tables: self.host_route_tables.clone(),
            subnets: Arc::new(SubnetAllocator::new(SubnetPool::new(
                &self.tenant_network_cidr,
                self.tenant_subnet_prefix,
            )?)),
            stack_wait: self.stack_wait(),
            retry: self.retry(),
        };
        config.validate()?;
        Ok(config)
    }
}
