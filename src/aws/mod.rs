//! AWS client contracts
//!
//! Every AWS service the operator talks to is consumed through a narrow,
//! object-safe trait so that resources can be exercised against mocks and
//! fakes. The SDK-backed implementations live in [`sdk`] behind the
//! `aws-sdk` feature.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::{Error, Result};

#[cfg(feature = "aws-sdk")]
pub mod sdk;

/// A CloudFormation stack as returned by DescribeStacks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackDescription {
    pub name: String,
    /// Raw CloudFormation status string, e.g. `CREATE_COMPLETE`.
    pub status: String,
    pub parameters: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub termination_protection: bool,
}

impl StackDescription {
    /// Parse an output into a typed value.
    pub fn parsed_output<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.parse_field("output", &self.outputs, key)
    }

    /// Parse a parameter into a typed value.
    pub fn parsed_parameter<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.parse_field("parameter", &self.parameters, key)
    }

    fn parse_field<T: FromStr>(
        &self,
        field: &str,
        values: &BTreeMap<String, String>,
        key: &str,
    ) -> Result<Option<T>> {
        match values.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                Error::WrongType(format!(
                    "stack {} {} {} has unexpected value {:?}",
                    self.name, field, key, raw
                ))
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateStackInput {
    pub name: String,
    pub template_body: String,
    pub parameters: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub termination_protection: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateStackInput {
    pub name: String,
    pub template_body: String,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub private_ip: Option<String>,
    /// EC2 instance state name, e.g. `running`.
    pub state: String,
}

impl Instance {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteTable {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyMetadata {
    pub key_id: String,
    pub arn: String,
    /// KMS key state, e.g. `Enabled` or `PendingDeletion`.
    pub state: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudFormation: Send + Sync {
    /// Describe a single stack by name. A missing stack is reported as an
    /// [`crate::error::AwsError`] for which `is_stack_not_found` holds.
    async fn describe_stack(&self, name: &str) -> Result<StackDescription>;

    async fn create_stack(&self, input: CreateStackInput) -> Result<()>;

    async fn update_stack(&self, input: UpdateStackInput) -> Result<()>;

    async fn delete_stack(&self, name: &str) -> Result<()>;

    async fn update_termination_protection(&self, name: &str, enabled: bool) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Ec2: Send + Sync {
    /// Describe instances carrying all of the given tags.
    async fn describe_instances(&self, tags: BTreeMap<String, String>) -> Result<Vec<Instance>>;

    /// Turn off instance-level API termination protection.
    async fn disable_api_termination(&self, instance_id: &str) -> Result<()>;

    /// CIDR block of the given VPC.
    async fn describe_vpc_cidr(&self, vpc_id: &str) -> Result<String>;

    /// Route tables whose `Name` tag is one of the given names.
    async fn describe_route_tables(&self, names: Vec<String>) -> Result<Vec<RouteTable>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Kms: Send + Sync {
    async fn describe_key(&self, key_id: &str) -> Result<KeyMetadata>;

    async fn create_key(&self, tags: BTreeMap<String, String>) -> Result<KeyMetadata>;

    async fn create_alias(&self, alias: &str, key_id: &str) -> Result<()>;

    async fn schedule_key_deletion(&self, key_id: &str, pending_window_days: i32) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait S3: Send + Sync {
    async fn head_bucket(&self, bucket: &str) -> Result<()>;

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()>;

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Sts: Send + Sync {
    /// ARN of the identity the client is authenticated as.
    async fn get_caller_identity(&self) -> Result<String>;
}

/// One client per service, all scoped to the same credentials.
#[derive(Clone)]
pub struct AwsClients {
    /// Label of the credential scope, e.g. the assumed role ARN. Used as the
    /// cache key for per-account lookups.
    pub scope: String,
    pub cloudformation: Arc<dyn CloudFormation>,
    pub ec2: Arc<dyn Ec2>,
    pub kms: Arc<dyn Kms>,
    pub s3: Arc<dyn S3>,
    pub sts: Arc<dyn Sts>,
}

impl fmt::Debug for AwsClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsClients")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Builds client sets for the host account and for tenant accounts.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Clients for the account the operator runs in.
    fn host(&self) -> AwsClients;

    /// Clients for a tenant account, reached by assuming `role_arn`.
    async fn tenant(&self, role_arn: &str, region: &str) -> Result<AwsClients>;
}
