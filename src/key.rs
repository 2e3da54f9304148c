//! Names and tags derived from an AWSConfig.

use std::collections::BTreeMap;

use crate::crd::AWSConfig;

pub const CLUSTER_TAG: &str = "tenantcluster.io/cluster";
pub const INSTALLATION_TAG: &str = "tenantcluster.io/installation";
pub const ROLE_TAG: &str = "tenantcluster.io/role";
pub const MASTER_ROLE: &str = "master";

/// Name of the Service (and Endpoints) fronting the tenant API in the host
/// cluster.
pub const MASTER_SERVICE_NAME: &str = "master";
pub const API_PORT: i32 = 443;

/// Stack outputs read from the tenant control-plane stack.
pub const WORKER_ASG_NAME_OUTPUT: &str = "WorkerASGName";
pub const VPC_PEERING_CONNECTION_ID_OUTPUT: &str = "VPCPeeringConnectionID";
pub const HOSTED_ZONE_NAME_SERVERS_OUTPUT: &str = "HostedZoneNameServers";
pub const WORKER_ASG_DESIRED_CAPACITY_OUTPUT: &str = "WorkerASGDesiredCapacity";

/// Tenant stack parameter carrying the worker count it was last applied with.
pub const WORKER_COUNT_PARAMETER: &str = "WorkerCount";

pub fn bucket_name(account_id: &str, cluster_id: &str) -> String {
    format!("{}-g8s-{}", account_id, cluster_id)
}

pub fn encryption_key_alias(cluster_id: &str) -> String {
    format!("alias/{}", cluster_id)
}

/// Namespace in the host cluster holding the tenant's API objects.
pub fn tenant_namespace(cluster_id: &str) -> String {
    cluster_id.to_string()
}

pub fn cluster_tags(obj: &AWSConfig, installation: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_TAG.to_string(), obj.cluster_id().to_string()),
        (INSTALLATION_TAG.to_string(), installation.to_string()),
    ])
}

/// Tags identifying the master instances of a cluster.
pub fn master_instance_tags(cluster_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_TAG.to_string(), cluster_id.to_string()),
        (ROLE_TAG.to_string(), MASTER_ROLE.to_string()),
    ])
}
