//! End-to-end passes of the real version-bundle resource sets against
//! in-memory AWS accounts and an in-memory host cluster.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Namespace, NamespaceStatus, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use serde_json::{json, Value};
use tokio_test::assert_ok;

use aws_operator::aws::{
    AwsClients, CloudFormation, CreateStackInput, Ec2, Instance, KeyMetadata, Kms, RouteTable,
    StackDescription, Sts, UpdateStackInput, S3,
};
use aws_operator::cache::LookupCaches;
use aws_operator::controller::{
    next_action, ControllerContext, HostObjects, PassAction, PassOutcome, ResourceSet,
    RetryConfig, StatusWriter,
};
use aws_operator::crd::{
    AWSConfig, AWSConfigSpec, AwsNode, AwsSpec, ClusterNode, ClusterSpec, ScalingSpec,
};
use aws_operator::error::{AwsError, Error, Result};
use aws_operator::resources::{resource_set, ResourceConfig, SubnetAllocator, SubnetPool};
use aws_operator::stack::{StackKind, WaitConfig};
use aws_operator::template::{TemplateParams, TemplateRenderer};

const CPI_STACK: &str = "abc12-host-setup";
const TCCP_STACK: &str = "abc12-guest-main";
const CPF_STACK: &str = "abc12-host-main";
const TENANT_ACCOUNT: &str = "123456789012";
const BUCKET: &str = "123456789012-g8s-abc12";

// Positions in the 4.0.0 set.
const TCCP: usize = 6;
const STACKOUTPUT: usize = 7;
const CPF: usize = 8;
const ENDPOINTS: usize = 11;

/// CloudFormation of one account. A settling account finishes every create
/// and delete by the next describe; otherwise the test drives the status.
#[derive(Default)]
struct Stacks {
    settles: bool,
    stacks: Mutex<BTreeMap<String, StackDescription>>,
    calls: Mutex<Vec<String>>,
}

impl Stacks {
    fn settling() -> Self {
        Self {
            settles: true,
            ..Default::default()
        }
    }

    fn set_status(&self, name: &str, status: &str) {
        if let Some(stack) = self.stacks.lock().unwrap().get_mut(name) {
            stack.status = status.to_string();
        }
    }

    fn set_outputs(&self, name: &str, outputs: &[(&str, &str)]) {
        if let Some(stack) = self.stacks.lock().unwrap().get_mut(name) {
            stack.outputs = outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
    }

    fn parameter(&self, name: &str, key: &str) -> Option<String> {
        self.stacks
            .lock()
            .unwrap()
            .get(name)
            .and_then(|s| s.parameters.get(key).cloned())
    }

    fn remove(&self, name: &str) {
        self.stacks.lock().unwrap().remove(name);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn deletes(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("delete:")).count()
    }
}

fn stack_missing(name: &str) -> Error {
    Error::Aws(AwsError::new(
        "cloudformation",
        "ValidationError",
        format!("Stack with id {name} does not exist"),
    ))
}

#[async_trait]
impl CloudFormation for Stacks {
    async fn describe_stack(&self, name: &str) -> Result<StackDescription> {
        let mut stacks = self.stacks.lock().unwrap();
        let status = stacks.get(name).map(|s| s.status.clone());
        if self.settles {
            match status.as_deref() {
                Some("CREATE_IN_PROGRESS") => {
                    if let Some(stack) = stacks.get_mut(name) {
                        stack.status = "CREATE_COMPLETE".to_string();
                    }
                }
                Some("DELETE_IN_PROGRESS") => {
                    stacks.remove(name);
                }
                _ => {}
            }
        }
        stacks.get(name).cloned().ok_or_else(|| stack_missing(name))
    }

    async fn create_stack(&self, input: CreateStackInput) -> Result<()> {
        self.calls.lock().unwrap().push(format!("create:{}", input.name));
        let mut stacks = self.stacks.lock().unwrap();
        if stacks.contains_key(&input.name) {
            return Err(Error::Aws(AwsError::new(
                "cloudformation",
                "AlreadyExistsException",
                format!("Stack [{}] already exists", input.name),
            )));
        }
        stacks.insert(
            input.name.clone(),
            StackDescription {
                name: input.name,
                status: "CREATE_IN_PROGRESS".to_string(),
                parameters: input.parameters,
                outputs: BTreeMap::new(),
                termination_protection: input.termination_protection,
            },
        );
        Ok(())
    }

    async fn update_stack(&self, input: UpdateStackInput) -> Result<()> {
        self.calls.lock().unwrap().push(format!("update:{}", input.name));
        Ok(())
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("delete:{name}"));
        let mut stacks = self.stacks.lock().unwrap();
        let stack = stacks.get_mut(name).ok_or_else(|| stack_missing(name))?;
        stack.status = "DELETE_IN_PROGRESS".to_string();
        Ok(())
    }

    async fn update_termination_protection(&self, name: &str, enabled: bool) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("protect:{name}:{enabled}"));
        Ok(())
    }
}

struct Identity(&'static str);

#[async_trait]
impl Sts for Identity {
    async fn get_caller_identity(&self) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// EC2 of one account: its VPCs, route tables and master instances.
#[derive(Default)]
struct Network {
    vpcs: BTreeMap<String, String>,
    route_tables: Vec<RouteTable>,
    masters: Mutex<Vec<Instance>>,
    unprotected: Mutex<Vec<String>>,
}

impl Network {
    fn host() -> Self {
        Self {
            vpcs: BTreeMap::from([("vpc-host".to_string(), "10.0.0.0/16".to_string())]),
            route_tables: vec![RouteTable {
                id: "rtb-1".to_string(),
                name: "host-private".to_string(),
            }],
            ..Default::default()
        }
    }

    fn boot_master(&self, ip: &str) {
        self.masters.lock().unwrap().push(Instance {
            id: "i-master0".to_string(),
            private_ip: Some(ip.to_string()),
            state: "running".to_string(),
        });
    }

    fn unprotected(&self) -> Vec<String> {
        self.unprotected.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ec2 for Network {
    async fn describe_instances(&self, _tags: BTreeMap<String, String>) -> Result<Vec<Instance>> {
        Ok(self.masters.lock().unwrap().clone())
    }

    async fn disable_api_termination(&self, instance_id: &str) -> Result<()> {
        self.unprotected
            .lock()
            .unwrap()
            .push(instance_id.to_string());
        Ok(())
    }

    async fn describe_vpc_cidr(&self, vpc_id: &str) -> Result<String> {
        self.vpcs
            .get(vpc_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(vpc_id.to_string()))
    }

    async fn describe_route_tables(&self, names: Vec<String>) -> Result<Vec<RouteTable>> {
        Ok(self
            .route_tables
            .iter()
            .filter(|t| names.contains(&t.name))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct Buckets {
    buckets: Mutex<BTreeSet<String>>,
}

impl Buckets {
    fn exists(&self, bucket: &str) -> bool {
        self.buckets.lock().unwrap().contains(bucket)
    }
}

#[async_trait]
impl S3 for Buckets {
    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        if self.exists(bucket) {
            Ok(())
        } else {
            Err(Error::Aws(AwsError::new("s3", "NotFound", bucket)))
        }
    }

    async fn create_bucket(&self, bucket: &str, _region: &str) -> Result<()> {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn list_objects(&self, _bucket: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete_object(&self, _bucket: &str, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets.lock().unwrap().remove(bucket);
        Ok(())
    }
}

/// 4.0.0 clusters carry no encryption key.
struct NoKeys;

#[async_trait]
impl Kms for NoKeys {
    async fn describe_key(&self, key_id: &str) -> Result<KeyMetadata> {
        Err(Error::NotFound(key_id.to_string()))
    }

    async fn create_key(&self, _tags: BTreeMap<String, String>) -> Result<KeyMetadata> {
        Err(Error::ExecutionFailed("unexpected create_key".into()))
    }

    async fn create_alias(&self, _alias: &str, _key_id: &str) -> Result<()> {
        Err(Error::ExecutionFailed("unexpected create_alias".into()))
    }

    async fn schedule_key_deletion(&self, _key_id: &str, _days: i32) -> Result<()> {
        Err(Error::ExecutionFailed("unexpected schedule_key_deletion".into()))
    }
}

/// The host cluster's namespaces, services and endpoints.
#[derive(Default)]
struct HostCluster {
    namespaces: Mutex<BTreeMap<String, Namespace>>,
    services: Mutex<BTreeSet<(String, String)>>,
    endpoints: Mutex<BTreeMap<(String, String), Endpoints>>,
}

impl HostCluster {
    fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.lock().unwrap().contains_key(name)
    }

    fn has_service(&self, namespace: &str, name: &str) -> bool {
        self.services
            .lock()
            .unwrap()
            .contains(&(namespace.to_string(), name.to_string()))
    }

    fn endpoint_ips(&self, namespace: &str, name: &str) -> Vec<String> {
        self.endpoints
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|e| e.subsets.clone())
            .unwrap_or_default()
            .into_iter()
            .flat_map(|s| s.addresses.unwrap_or_default())
            .map(|a| a.ip)
            .collect()
    }
}

fn object_key(metadata: &ObjectMeta) -> (String, String) {
    (
        metadata.namespace.clone().unwrap_or_default(),
        metadata.name.clone().unwrap_or_default(),
    )
}

#[async_trait]
impl HostObjects for HostCluster {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        Ok(self.namespaces.lock().unwrap().get(name).cloned())
    }

    async fn apply_namespace(&self, mut namespace: Namespace) -> Result<()> {
        namespace.status = Some(NamespaceStatus {
            phase: Some("Active".to_string()),
            ..Default::default()
        });
        let name = namespace.metadata.name.clone().unwrap_or_default();
        self.namespaces.lock().unwrap().insert(name, namespace);
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.namespaces.lock().unwrap().remove(name);
        Ok(())
    }

    async fn apply_service(&self, service: Service) -> Result<()> {
        self.services
            .lock()
            .unwrap()
            .insert(object_key(&service.metadata));
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.services
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn apply_endpoints(&self, endpoints: Endpoints) -> Result<()> {
        self.endpoints
            .lock()
            .unwrap()
            .insert(object_key(&endpoints.metadata), endpoints);
        Ok(())
    }

    async fn delete_endpoints(&self, namespace: &str, name: &str) -> Result<()> {
        self.endpoints
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}

/// JSON merge patch, as the API server applies it to the status.
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(target) = target {
        for (key, value) in fields {
            if value.is_null() {
                target.remove(key);
            } else {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// The status subresource of the single AWSConfig under test.
#[derive(Default)]
struct StatusStore {
    status: Mutex<Value>,
}

#[async_trait]
impl StatusWriter for StatusStore {
    async fn patch_status(&self, _ns: &str, _name: &str, patch: Value) -> Result<()> {
        merge(&mut self.status.lock().unwrap(), &patch);
        Ok(())
    }

    async fn allocated_subnets(&self) -> Result<Vec<String>> {
        let status = self.status.lock().unwrap();
        Ok(status
            .pointer("/cluster/network/cidr")
            .and_then(Value::as_str)
            .map(str::to_string)
            .into_iter()
            .collect())
    }
}

struct KindRenderer;

impl TemplateRenderer for KindRenderer {
    fn render(&self, kind: StackKind, _params: &TemplateParams) -> Result<String> {
        Ok(format!("Description: {kind}"))
    }
}

fn cluster() -> AWSConfig {
    let node = || AwsNode {
        image_id: "ami-0123456789".to_string(),
        instance_type: "m5.xlarge".to_string(),
    };
    let mut obj = AWSConfig::new(
        "abc12",
        AWSConfigSpec {
            cluster: ClusterSpec {
                id: "abc12".to_string(),
                version_bundle: "4.0.0".to_string(),
                masters: vec![ClusterNode {
                    id: "master-0".to_string(),
                }],
                workers: vec![ClusterNode {
                    id: "worker-0".to_string(),
                }],
            },
            aws: AwsSpec {
                region: "eu-central-1".to_string(),
                availability_zone: "eu-central-1a".to_string(),
                credential_role_arn: "arn:aws:iam::123456789012:role/aws-operator".to_string(),
                masters: vec![node()],
                workers: vec![node()],
                docker_volume_size_gb: 100,
                ..Default::default()
            },
            scaling: ScalingSpec { min: 1, max: 3 },
        },
    );
    obj.metadata = ObjectMeta {
        name: Some("abc12".to_string()),
        namespace: Some("default".to_string()),
        ..Default::default()
    };
    obj
}

struct Harness {
    host_stacks: Arc<Stacks>,
    tenant_stacks: Arc<Stacks>,
    host_network: Arc<Network>,
    tenant_network: Arc<Network>,
    buckets: Arc<Buckets>,
    host_cluster: Arc<HostCluster>,
    status: Arc<StatusStore>,
    set: ResourceSet,
}

impl Harness {
    fn new() -> Self {
        Self::with_host_stacks(Stacks::settling())
    }

    fn with_host_stacks(host_stacks: Stacks) -> Self {
        let host_cluster = Arc::new(HostCluster::default());
        let status = Arc::new(StatusStore::default());
        let config = ResourceConfig {
            caches: Arc::new(LookupCaches::default()),
            status: status.clone(),
            host_objects: host_cluster.clone(),
            renderer: Arc::new(KindRenderer),
            installation: "gauss".to_string(),
            host_vpc_id: "vpc-host".to_string(),
            host_route_tables: vec!["host-private".to_string()],
            subnets: Arc::new(SubnetAllocator::new(
                SubnetPool::new("10.1.0.0/16", 24).unwrap(),
            )),
            stack_wait: WaitConfig {
                poll_interval: Duration::from_millis(1),
                deadline: Duration::from_secs(1),
            },
            retry: RetryConfig {
                max_attempts: 1,
                ..Default::default()
            },
        };
        Self {
            host_stacks: Arc::new(host_stacks),
            tenant_stacks: Arc::new(Stacks::default()),
            host_network: Arc::new(Network::host()),
            tenant_network: Arc::new(Network::default()),
            buckets: Arc::new(Buckets::default()),
            host_cluster,
            status,
            set: resource_set("4.0.0", &config).unwrap(),
        }
    }

    fn context(&self) -> ControllerContext {
        let tenant = AwsClients {
            scope: "tenant".to_string(),
            cloudformation: self.tenant_stacks.clone(),
            ec2: self.tenant_network.clone(),
            kms: Arc::new(NoKeys),
            s3: self.buckets.clone(),
            sts: Arc::new(Identity(
                "arn:aws:sts::123456789012:assumed-role/aws-operator/session",
            )),
        };
        let host = AwsClients {
            scope: "host".to_string(),
            cloudformation: self.host_stacks.clone(),
            ec2: self.host_network.clone(),
            kms: Arc::new(NoKeys),
            s3: Arc::new(Buckets::default()),
            sts: Arc::new(Identity("arn:aws:iam::210987654321:user/operator")),
        };
        ControllerContext::new(tenant, host)
    }

    /// The cluster as the next watch event would deliver it.
    fn observed(&self, mut obj: AWSConfig) -> AWSConfig {
        let status = self.status.status.lock().unwrap().clone();
        if !status.is_null() {
            obj.status = Some(serde_json::from_value(status).unwrap());
        }
        obj
    }

    async fn try_create_pass(&self, obj: &AWSConfig) -> Result<PassOutcome> {
        let obj = self.observed(obj.clone());
        let mut ctx = self.context();
        self.set.ensure_created(&obj, &mut ctx).await
    }

    async fn create_pass(&self, obj: &AWSConfig) -> PassOutcome {
        assert_ok!(self.try_create_pass(obj).await)
    }

    async fn delete_pass(&self, obj: &AWSConfig) -> PassOutcome {
        let obj = self.observed(obj.clone());
        let mut ctx = self.context();
        assert_ok!(self.set.ensure_deleted(&obj, &mut ctx).await)
    }

    /// Drive creation until the tenant cluster is fully set up.
    async fn converge(&self, obj: &AWSConfig) {
        self.create_pass(obj).await;
        self.tenant_stacks.set_status(TCCP_STACK, "CREATE_COMPLETE");
        self.tenant_stacks.set_outputs(
            TCCP_STACK,
            &[
                ("WorkerASGName", "abc12-workers"),
                ("VPCPeeringConnectionID", "pcx-1"),
                ("HostedZoneNameServers", "ns1,ns2"),
            ],
        );
        self.tenant_network.boot_master("10.1.0.10");
        let outcome = self.create_pass(obj).await;
        assert!(!outcome.is_cancelled(), "{:?}", outcome);
    }
}

#[tokio::test]
async fn test_create_passes_follow_the_bundle_order() {
    let harness = Harness::new();
    let obj = cluster();

    // The host setup stack is waited for, the tenant stack is not, and its
    // missing outputs gate everything after it.
    let outcome = harness.create_pass(&obj).await;
    assert_eq!(outcome.cancelled_at, Some(STACKOUTPUT));
    assert_eq!(harness.host_stacks.calls(), vec![format!("create:{CPI_STACK}")]);
    assert_eq!(harness.tenant_stacks.calls(), vec![format!("create:{TCCP_STACK}")]);
    assert!(harness.buckets.exists(BUCKET));
    assert_eq!(
        harness.tenant_stacks.parameter(TCCP_STACK, "TenantCIDR").as_deref(),
        Some("10.1.0.0/24")
    );
    assert_eq!(
        harness.tenant_stacks.parameter(TCCP_STACK, "HostAccountID").as_deref(),
        Some("210987654321")
    );
    assert_eq!(
        harness.host_stacks.parameter(CPI_STACK, "TenantAccountID").as_deref(),
        Some(TENANT_ACCOUNT)
    );
    assert!(!harness.host_cluster.has_namespace("abc12"));

    // Complete without peering outputs: the finalizing stack cancels.
    harness.tenant_stacks.set_status(TCCP_STACK, "CREATE_COMPLETE");
    harness
        .tenant_stacks
        .set_outputs(TCCP_STACK, &[("WorkerASGName", "abc12-workers")]);
    let outcome = harness.create_pass(&obj).await;
    assert_eq!(outcome.cancelled_at, Some(CPF));
    assert_eq!(harness.host_stacks.calls().len(), 1);

    // With the outputs in place the host side is finalized, but no master
    // is running yet.
    harness.tenant_stacks.set_outputs(
        TCCP_STACK,
        &[
            ("WorkerASGName", "abc12-workers"),
            ("VPCPeeringConnectionID", "pcx-1"),
            ("HostedZoneNameServers", "ns1,ns2"),
        ],
    );
    let outcome = harness.create_pass(&obj).await;
    assert_eq!(outcome.cancelled_at, Some(ENDPOINTS));
    assert_eq!(
        harness.host_stacks.calls(),
        vec![format!("create:{CPI_STACK}"), format!("create:{CPF_STACK}")]
    );
    assert_eq!(
        harness.host_stacks.parameter(CPF_STACK, "PrivateRouteTableIDs").as_deref(),
        Some("rtb-1")
    );
    assert!(harness.host_cluster.has_namespace("abc12"));
    assert!(harness.host_cluster.has_service("abc12", "master"));

    harness.tenant_network.boot_master("10.1.0.10");
    let outcome = harness.create_pass(&obj).await;
    assert!(!outcome.is_cancelled());
    assert_eq!(
        next_action(false, &outcome),
        PassAction::Requeue(Duration::from_secs(300))
    );
    assert_eq!(
        harness.host_cluster.endpoint_ips("abc12", "master"),
        vec!["10.1.0.10".to_string()]
    );

    // A converged cluster issues no further stack calls.
    assert_eq!(harness.tenant_stacks.calls().len(), 1);
    assert_eq!(harness.host_stacks.calls().len(), 2);

    let status = harness.observed(obj).status.unwrap();
    assert_eq!(status.aws.account_id.as_deref(), Some(TENANT_ACCOUNT));
    assert_eq!(status.cluster.network.cidr.as_deref(), Some("10.1.0.0/24"));
    assert_eq!(status.aws.autoscaling_group.name.as_deref(), Some("abc12-workers"));
    assert_eq!(status.aws.autoscaling_group.desired_capacity, Some(1));
    assert_eq!(
        status.aws.stacks.get("tccp").map(String::as_str),
        Some(TCCP_STACK)
    );
}

#[tokio::test]
async fn test_tenant_stack_waits_for_host_setup_to_finish() {
    // The host account never finishes creating on its own.
    let harness = Harness::with_host_stacks(Stacks::default());
    let obj = cluster();

    let err = harness.try_create_pass(&obj).await.unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed(_)), "{err}");
    assert_eq!(harness.host_stacks.calls(), vec![format!("create:{CPI_STACK}")]);
    assert!(harness.tenant_stacks.calls().is_empty());

    // Still creating on the next pass: the tenant stack is not attempted.
    let outcome = harness.create_pass(&obj).await;
    assert_eq!(outcome.cancelled_at, Some(TCCP));
    assert!(harness.tenant_stacks.calls().is_empty());

    harness.host_stacks.set_status(CPI_STACK, "ROLLBACK_COMPLETE");
    let outcome = harness.create_pass(&obj).await;
    assert_eq!(outcome.cancelled_at, Some(TCCP));
    assert!(harness.tenant_stacks.calls().is_empty());

    harness.host_stacks.set_status(CPI_STACK, "CREATE_COMPLETE");
    let outcome = harness.create_pass(&obj).await;
    assert_eq!(outcome.cancelled_at, Some(STACKOUTPUT));
    assert_eq!(harness.tenant_stacks.calls(), vec![format!("create:{TCCP_STACK}")]);
    assert_eq!(harness.host_stacks.calls().len(), 1);
}

#[tokio::test]
async fn test_delete_during_rollback_waits_for_the_tenant_stack() {
    let harness = Harness::new();
    let mut obj = cluster();
    harness.converge(&obj).await;

    obj.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    harness.tenant_stacks.set_status(TCCP_STACK, "ROLLBACK_IN_PROGRESS");

    // Everything else is torn down; the rolling-back stack is left alone.
    let outcome = harness.delete_pass(&obj).await;
    assert!(outcome.keep_finalizer);
    assert!(!outcome.is_cancelled());
    assert_ne!(next_action(true, &outcome), PassAction::RemoveFinalizer);
    assert_eq!(harness.tenant_stacks.deletes(), 0);
    assert_eq!(harness.host_stacks.deletes(), 2);
    assert!(!harness.buckets.exists(BUCKET));
    assert!(!harness.host_cluster.has_namespace("abc12"));
    assert!(!harness.host_cluster.has_service("abc12", "master"));
    assert!(harness.host_cluster.endpoint_ips("abc12", "master").is_empty());

    // Once rolled back the tenant stack is unprotected and deleted.
    harness.tenant_stacks.set_status(TCCP_STACK, "ROLLBACK_COMPLETE");
    let outcome = harness.delete_pass(&obj).await;
    assert!(outcome.keep_finalizer);
    assert_eq!(harness.tenant_stacks.deletes(), 1);
    assert_eq!(harness.tenant_network.unprotected(), vec!["i-master0".to_string()]);
    assert!(harness
        .tenant_stacks
        .calls()
        .contains(&format!("protect:{TCCP_STACK}:false")));
    assert_eq!(harness.host_stacks.deletes(), 2);

    // Deletion in progress holds the finalizer without a second request.
    let outcome = harness.delete_pass(&obj).await;
    assert!(outcome.keep_finalizer);
    assert_eq!(harness.tenant_stacks.deletes(), 1);

    harness.tenant_stacks.remove(TCCP_STACK);
    let outcome = harness.delete_pass(&obj).await;
    assert_eq!(next_action(true, &outcome), PassAction::RemoveFinalizer);
    assert_eq!(harness.tenant_stacks.deletes(), 1);
}
