//! Shared types for the AWSConfig CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A node of the tenant cluster as seen by Kubernetes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNode {
    pub id: String,
}

/// The AWS machine shape of one master or worker.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsNode {
    pub image_id: String,
    pub instance_type: String,
}

/// Kubernetes-style condition for status reporting
///
/// # Example
///
/// ```rust
/// use aws_operator::crd::Condition;
///
/// let condition = Condition::new("Created", "True", "Created", "All stacks are created", Some(1));
/// assert_eq!(condition.observed_generation, Some(1));
/// ```
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: "Created", "Deleting" or "Degraded"
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// A condition that transitioned just now.
    pub fn new(
        type_: &str,
        status: &str,
        reason: &str,
        message: &str,
        observed_generation: Option<i64>,
    ) -> Self {
        Self {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation,
        }
    }
}
