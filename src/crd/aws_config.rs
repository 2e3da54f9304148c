//! AWSConfig Custom Resource Definition
//!
//! An AWSConfig describes one tenant Kubernetes cluster running in a tenant
//! AWS account. The spec carries the desired topology and the version bundle
//! the cluster is pinned to; the status carries the values the operator
//! discovered or allocated and must remember across passes.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{AwsNode, ClusterNode, Condition};

/// Structured validation error for `AWSConfigSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
    pub how_to_fix: String,
}

impl SpecValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            how_to_fix: how_to_fix.into(),
        }
    }
}

impl std::fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.how_to_fix)
    }
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "provider.tenantcluster.io",
    version = "v1alpha1",
    kind = "AWSConfig",
    namespaced,
    status = "AWSConfigStatus",
    shortname = "awsc",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.cluster.id"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.cluster.versionBundle"}"#,
    printcolumn = r#"{"name":"CIDR","type":"string","jsonPath":".status.cluster.network.cidr"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AWSConfigSpec {
    pub cluster: ClusterSpec,
    pub aws: AwsSpec,

    #[serde(default)]
    pub scaling: ScalingSpec,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Tenant cluster ID, used as the prefix of every derived AWS name.
    pub id: String,

    /// Version bundle selecting the resource set that reconciles this cluster.
    pub version_bundle: String,

    #[serde(default)]
    pub masters: Vec<ClusterNode>,

    #[serde(default)]
    pub workers: Vec<ClusterNode>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsSpec {
    pub region: String,

    pub availability_zone: String,

    /// IAM role in the tenant account the operator assumes for this cluster.
    pub credential_role_arn: String,

    #[serde(default)]
    pub masters: Vec<AwsNode>,

    #[serde(default)]
    pub workers: Vec<AwsNode>,

    #[serde(default)]
    pub api_hosted_zone: String,

    #[serde(default)]
    pub ingress_hosted_zone: String,

    #[serde(default = "default_docker_volume_size_gb")]
    pub docker_volume_size_gb: i32,
}

fn default_docker_volume_size_gb() -> i32 {
    100
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingSpec {
    #[serde(default)]
    pub min: i32,
    #[serde(default)]
    pub max: i32,
}

/// Status of an AWSConfig, written by the operator.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AWSConfigStatus {
    #[serde(default)]
    pub aws: AwsStatus,

    #[serde(default)]
    pub cluster: ClusterStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_account_id: Option<String>,

    #[serde(default)]
    pub autoscaling_group: AutoscalingGroupStatus,

    /// Outputs of the tenant control-plane stack, keyed by output name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stack_outputs: BTreeMap<String, String>,

    /// Names of the stacks created for this cluster, keyed by stack kind.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stacks: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingGroupStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_capacity: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub network: NetworkStatus,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

impl AWSConfigSpec {
    /// Validate the spec before any resource runs.
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.cluster.id.is_empty() {
            errors.push(SpecValidationError::new(
                "spec.cluster.id",
                "cluster ID must not be empty",
                "Set spec.cluster.id to a short DNS label such as \"abc12\".",
            ));
        } else if !is_dns_label(&self.cluster.id) {
            errors.push(SpecValidationError::new(
                "spec.cluster.id",
                format!("cluster ID {:?} is not a valid DNS label", self.cluster.id),
                "Use lowercase alphanumerics and '-', starting and ending with an alphanumeric.",
            ));
        }

        if self.cluster.version_bundle.is_empty() {
            errors.push(SpecValidationError::new(
                "spec.cluster.versionBundle",
                "version bundle must not be empty",
                "Set spec.cluster.versionBundle to one of the versions this operator serves.",
            ));
        }

        if self.aws.masters.is_empty() {
            errors.push(SpecValidationError::new(
                "spec.aws.masters",
                "at least one master is required",
                "Add an entry with imageId and instanceType to spec.aws.masters.",
            ));
        }

        if self.aws.workers.is_empty() {
            errors.push(SpecValidationError::new(
                "spec.aws.workers",
                "at least one worker is required",
                "Add an entry with imageId and instanceType to spec.aws.workers.",
            ));
        }

        if self.aws.credential_role_arn.is_empty() {
            errors.push(SpecValidationError::new(
                "spec.aws.credentialRoleArn",
                "credential role ARN must not be empty",
                "Set spec.aws.credentialRoleArn to the role the operator may assume in the tenant account.",
            ));
        }

        if self.scaling.max > 0 && self.scaling.min > self.scaling.max {
            errors.push(SpecValidationError::new(
                "spec.scaling",
                "scaling.min must be <= scaling.max",
                "Lower spec.scaling.min or raise spec.scaling.max.",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_dns_label(s: &str) -> bool {
    s.len() <= 63
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

impl AWSConfig {
    pub fn cluster_id(&self) -> &str {
        &self.spec.cluster.id
    }

    pub fn version_bundle(&self) -> &str {
        &self.spec.cluster.version_bundle
    }

    /// A deletion timestamp indicates the user has requested deletion.
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    pub fn status_account_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.aws.account_id.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn status_host_account_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.aws.host_account_id.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn status_cidr(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.cluster.network.cidr.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn status_asg_desired_capacity(&self) -> Option<i32> {
        self.status
            .as_ref()
            .and_then(|s| s.aws.autoscaling_group.desired_capacity)
    }

    /// Recorded name of the stack of the given kind, if one was created.
    pub fn status_stack_name(&self, kind: &str) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.aws.stacks.get(kind))
            .map(String::as_str)
    }

    pub fn status_stack_output(&self, key: &str) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.aws.stack_outputs.get(key))
            .map(String::as_str)
    }

    pub fn worker_count(&self) -> i32 {
        self.spec.aws.workers.len() as i32
    }
}
