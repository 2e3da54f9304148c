//! AWS SDK backed implementations of the client contracts
//!
//! Host clients use the ambient credentials of the operator. Tenant clients
//! assume the role named on the AWSConfig and are reused per role and region.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{Region, SdkConfig};
use aws_sdk_cloudformation::types::{Capability, Parameter};
use aws_sdk_ec2::types::{AttributeBooleanValue, Filter};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_sts::config::SharedCredentialsProvider;
use aws_sdk_sts::error::ProvideErrorMetadata;
use tracing::{debug, info};

use super::{
    AwsClients, ClientFactory, CloudFormation, CreateStackInput, Ec2, Instance, KeyMetadata, Kms,
    RouteTable, StackDescription, Sts, UpdateStackInput, S3,
};
use crate::error::{AwsError, Error, Result};

const SESSION_NAME: &str = "aws-operator";

fn aws_error<E>(service: &'static str, err: E) -> Error
where
    E: ProvideErrorMetadata + std::fmt::Display,
{
    let code = err.code().unwrap_or("Unknown").to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    Error::Aws(AwsError::new(service, code, message))
}

fn build_error(err: impl std::fmt::Display) -> Error {
    Error::ExecutionFailed(format!("failed to build AWS request: {err}"))
}

pub struct SdkCloudFormation {
    client: aws_sdk_cloudformation::Client,
}

fn cfn_parameters(parameters: &BTreeMap<String, String>) -> Vec<Parameter> {
    parameters
        .iter()
        .map(|(k, v)| Parameter::builder().parameter_key(k).parameter_value(v).build())
        .collect()
}

#[async_trait]
impl CloudFormation for SdkCloudFormation {
    async fn describe_stack(&self, name: &str) -> Result<StackDescription> {
        let output = self
            .client
            .describe_stacks()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| aws_error("cloudformation", e))?;

        let stack = output.stacks().first().ok_or_else(|| {
            Error::Aws(AwsError::new(
                "cloudformation",
                "ValidationError",
                format!("Stack with id {name} does not exist"),
            ))
        })?;

        Ok(StackDescription {
            name: stack.stack_name().unwrap_or(name).to_string(),
            status: stack
                .stack_status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            parameters: stack
                .parameters()
                .iter()
                .filter_map(|p| {
                    Some((
                        p.parameter_key()?.to_string(),
                        p.parameter_value().unwrap_or_default().to_string(),
                    ))
                })
                .collect(),
            outputs: stack
                .outputs()
                .iter()
                .filter_map(|o| {
                    Some((
                        o.output_key()?.to_string(),
                        o.output_value().unwrap_or_default().to_string(),
                    ))
                })
                .collect(),
            termination_protection: stack.enable_termination_protection().unwrap_or(false),
        })
    }

    async fn create_stack(&self, input: CreateStackInput) -> Result<()> {
        let tags = input
            .tags
            .iter()
            .map(|(k, v)| {
                aws_sdk_cloudformation::types::Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(build_error)
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .create_stack()
            .stack_name(&input.name)
            .template_body(input.template_body)
            .set_parameters(Some(cfn_parameters(&input.parameters)))
            .set_tags(Some(tags))
            .capabilities(Capability::CapabilityNamedIam)
            .enable_termination_protection(input.termination_protection)
            .send()
            .await
            .map_err(|e| aws_error("cloudformation", e))?;
        Ok(())
    }

    async fn update_stack(&self, input: UpdateStackInput) -> Result<()> {
        self.client
            .update_stack()
            .stack_name(&input.name)
            .template_body(input.template_body)
            .set_parameters(Some(cfn_parameters(&input.parameters)))
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .map_err(|e| aws_error("cloudformation", e))?;
        Ok(())
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| aws_error("cloudformation", e))?;
        Ok(())
    }

    async fn update_termination_protection(&self, name: &str, enabled: bool) -> Result<()> {
        self.client
            .update_termination_protection()
            .stack_name(name)
            .enable_termination_protection(enabled)
            .send()
            .await
            .map_err(|e| aws_error("cloudformation", e))?;
        Ok(())
    }
}

pub struct SdkEc2 {
    client: aws_sdk_ec2::Client,
}

#[async_trait]
impl Ec2 for SdkEc2 {
    async fn describe_instances(&self, tags: BTreeMap<String, String>) -> Result<Vec<Instance>> {
        let filters = tags
            .iter()
            .map(|(k, v)| Filter::builder().name(format!("tag:{k}")).values(v).build())
            .collect();

        let output = self
            .client
            .describe_instances()
            .set_filters(Some(filters))
            .send()
            .await
            .map_err(|e| aws_error("ec2", e))?;

        Ok(output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .map(|i| Instance {
                id: i.instance_id().unwrap_or_default().to_string(),
                private_ip: i.private_ip_address().map(str::to_string),
                state: i
                    .state()
                    .and_then(|s| s.name())
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn disable_api_termination(&self, instance_id: &str) -> Result<()> {
        self.client
            .modify_instance_attribute()
            .instance_id(instance_id)
            .disable_api_termination(AttributeBooleanValue::builder().value(false).build())
            .send()
            .await
            .map_err(|e| aws_error("ec2", e))?;
        Ok(())
    }

    async fn describe_vpc_cidr(&self, vpc_id: &str) -> Result<String> {
        let output = self
            .client
            .describe_vpcs()
            .vpc_ids(vpc_id)
            .send()
            .await
            .map_err(|e| aws_error("ec2", e))?;

        output
            .vpcs()
            .first()
            .and_then(|v| v.cidr_block())
            .map(str::to_string)
            .ok_or_else(|| Error::NotFound(format!("CIDR of VPC {vpc_id}")))
    }

    async fn describe_route_tables(&self, names: Vec<String>) -> Result<Vec<RouteTable>> {
        let output = self
            .client
            .describe_route_tables()
            .filters(Filter::builder().name("tag:Name").set_values(Some(names)).build())
            .send()
            .await
            .map_err(|e| aws_error("ec2", e))?;

        Ok(output
            .route_tables()
            .iter()
            .map(|t| RouteTable {
                id: t.route_table_id().unwrap_or_default().to_string(),
                name: t
                    .tags()
                    .iter()
                    .find(|tag| tag.key() == Some("Name"))
                    .and_then(|tag| tag.value())
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }
}

pub struct SdkKms {
    client: aws_sdk_kms::Client,
}

fn key_metadata(meta: Option<&aws_sdk_kms::types::KeyMetadata>) -> Result<KeyMetadata> {
    let meta = meta.ok_or_else(|| Error::ExecutionFailed("KMS returned no key metadata".into()))?;
    Ok(KeyMetadata {
        key_id: meta.key_id().to_string(),
        arn: meta.arn().unwrap_or_default().to_string(),
        state: meta
            .key_state()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
    })
}

#[async_trait]
impl Kms for SdkKms {
    async fn describe_key(&self, key_id: &str) -> Result<KeyMetadata> {
        let output = self
            .client
            .describe_key()
            .key_id(key_id)
            .send()
            .await
            .map_err(|e| aws_error("kms", e))?;
        key_metadata(output.key_metadata())
    }

    async fn create_key(&self, tags: BTreeMap<String, String>) -> Result<KeyMetadata> {
        let tags = tags
            .iter()
            .map(|(k, v)| {
                aws_sdk_kms::types::Tag::builder()
                    .tag_key(k)
                    .tag_value(v)
                    .build()
                    .map_err(build_error)
            })
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .create_key()
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| aws_error("kms", e))?;
        key_metadata(output.key_metadata())
    }

    async fn create_alias(&self, alias: &str, key_id: &str) -> Result<()> {
        self.client
            .create_alias()
            .alias_name(alias)
            .target_key_id(key_id)
            .send()
            .await
            .map_err(|e| aws_error("kms", e))?;
        Ok(())
    }

    async fn schedule_key_deletion(&self, key_id: &str, pending_window_days: i32) -> Result<()> {
        self.client
            .schedule_key_deletion()
            .key_id(key_id)
            .pending_window_in_days(pending_window_days)
            .send()
            .await
            .map_err(|e| aws_error("kms", e))?;
        Ok(())
    }
}

pub struct SdkS3 {
    client: aws_sdk_s3::Client,
}

#[async_trait]
impl S3 for SdkS3 {
    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| aws_error("s3", e))?;
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint.
        if region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request.send().await.map_err(|e| aws_error("s3", e))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(token)
                .send()
                .await
                .map_err(|e| aws_error("s3", e))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string())
                }
                _ => return Ok(keys),
            }
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| aws_error("s3", e))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| aws_error("s3", e))?;
        Ok(())
    }
}

pub struct SdkSts {
    client: aws_sdk_sts::Client,
}

#[async_trait]
impl Sts for SdkSts {
    async fn get_caller_identity(&self) -> Result<String> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| aws_error("sts", e))?;
        output
            .arn()
            .map(str::to_string)
            .ok_or_else(|| Error::ExecutionFailed("STS returned no caller ARN".into()))
    }
}

fn clients_from(scope: &str, config: &SdkConfig) -> AwsClients {
    AwsClients {
        scope: scope.to_string(),
        cloudformation: Arc::new(SdkCloudFormation {
            client: aws_sdk_cloudformation::Client::new(config),
        }),
        ec2: Arc::new(SdkEc2 {
            client: aws_sdk_ec2::Client::new(config),
        }),
        kms: Arc::new(SdkKms {
            client: aws_sdk_kms::Client::new(config),
        }),
        s3: Arc::new(SdkS3 {
            client: aws_sdk_s3::Client::new(config),
        }),
        sts: Arc::new(SdkSts {
            client: aws_sdk_sts::Client::new(config),
        }),
    }
}

/// Builds SDK clients from the ambient AWS configuration.
pub struct SdkClientFactory {
    base: SdkConfig,
    host: AwsClients,
    tenants: Mutex<HashMap<(String, String), AwsClients>>,
}

impl SdkClientFactory {
    /// Load the ambient configuration (environment, profile, IRSA).
    pub async fn from_env() -> Self {
        let base = aws_config::load_from_env().await;
        let host = clients_from("host", &base);
        info!(
            region = ?base.region().map(|r| r.as_ref().to_string()),
            "Loaded host AWS configuration"
        );
        Self {
            base,
            host,
            tenants: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ClientFactory for SdkClientFactory {
    fn host(&self) -> AwsClients {
        self.host.clone()
    }

    async fn tenant(&self, role_arn: &str, region: &str) -> Result<AwsClients> {
        if role_arn.is_empty() {
            return Err(Error::InvalidConfig("credential role ARN must not be empty".into()));
        }
        let key = (role_arn.to_string(), region.to_string());
        if let Some(clients) = self
            .tenants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Ok(clients.clone());
        }

        debug!(role_arn, region, "Assuming tenant role");
        let region = Region::new(region.to_string());
        let provider = AssumeRoleProvider::builder(role_arn)
            .session_name(SESSION_NAME)
            .region(region.clone())
            .configure(&self.base)
            .build()
            .await;
        let config = self
            .base
            .to_builder()
            .credentials_provider(SharedCredentialsProvider::new(provider))
            .region(region)
            .build();

        let clients = clients_from(role_arn, &config);
        self.tenants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, clients.clone());
        Ok(clients)
    }
}
