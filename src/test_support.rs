//! Fixtures shared by the unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::ObjectMeta;

use crate::aws::{
    AwsClients, CloudFormation, CreateStackInput, Ec2, Instance, Kms, MockCloudFormation,
    MockEc2, MockKms, MockS3, MockSts, RouteTable, S3, StackDescription, Sts, UpdateStackInput,
};
use crate::cache::LookupCaches;
use crate::controller::{ControllerContext, MockHostObjects, Resource, RetryConfig, StatusWriter};
use crate::crd::{
    AWSConfig, AWSConfigSpec, AwsNode, AwsSpec, ClusterNode, ClusterSpec, ScalingSpec,
};
use crate::error::{AwsError, Error, Result};
use crate::resources::{ResourceConfig, SubnetAllocator, SubnetPool};
use crate::stack::{StackKind, WaitConfig};
use crate::template::{TemplateParams, TemplateRenderer};

pub fn aws_config(id: &str, version: &str) -> AWSConfig {
    let node = || AwsNode {
        image_id: "ami-0123456789".to_string(),
        instance_type: "m5.xlarge".to_string(),
    };
    let mut obj = AWSConfig::new(
        id,
        AWSConfigSpec {
            cluster: ClusterSpec {
                id: id.to_string(),
                version_bundle: version.to_string(),
                masters: vec![ClusterNode {
                    id: "master-0".to_string(),
                }],
                workers: vec![
                    ClusterNode {
                        id: "worker-0".to_string(),
                    },
                    ClusterNode {
                        id: "worker-1".to_string(),
                    },
                ],
            },
            aws: AwsSpec {
                region: "eu-central-1".to_string(),
                availability_zone: "eu-central-1a".to_string(),
                credential_role_arn: "arn:aws:iam::123456789012:role/aws-operator".to_string(),
                masters: vec![node()],
                workers: vec![node(), node()],
                api_hosted_zone: "Z1API".to_string(),
                ingress_hosted_zone: "Z1INGRESS".to_string(),
                docker_volume_size_gb: 100,
            },
            scaling: ScalingSpec { min: 2, max: 4 },
        },
    );
    obj.metadata = ObjectMeta {
        name: Some(id.to_string()),
        namespace: Some("default".to_string()),
        generation: Some(1),
        ..Default::default()
    };
    obj
}

/// Mark the object as deleted by the user.
pub fn deleting(mut obj: AWSConfig) -> AWSConfig {
    obj.metadata.deletion_timestamp = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
        chrono::Utc::now(),
    ));
    obj
}

pub struct ClientsBuilder {
    scope: String,
    cloudformation: Arc<dyn CloudFormation>,
    ec2: Arc<dyn Ec2>,
    kms: Arc<dyn Kms>,
    s3: Arc<dyn S3>,
    sts: Arc<dyn Sts>,
}

/// Clients backed by expectation-free mocks unless replaced.
pub fn clients_with(scope: &str) -> ClientsBuilder {
    ClientsBuilder {
        scope: scope.to_string(),
        cloudformation: Arc::new(MockCloudFormation::new()),
        ec2: Arc::new(MockEc2::new()),
        kms: Arc::new(MockKms::new()),
        s3: Arc::new(MockS3::new()),
        sts: Arc::new(MockSts::new()),
    }
}

impl ClientsBuilder {
    pub fn cloudformation(mut self, client: impl CloudFormation + 'static) -> Self {
        self.cloudformation = Arc::new(client);
        self
    }

    pub fn shared_cloudformation(mut self, client: Arc<dyn CloudFormation>) -> Self {
        self.cloudformation = client;
        self
    }

    pub fn ec2(mut self, client: impl Ec2 + 'static) -> Self {
        self.ec2 = Arc::new(client);
        self
    }

    pub fn shared_ec2(mut self, client: Arc<dyn Ec2>) -> Self {
        self.ec2 = client;
        self
    }

    pub fn kms(mut self, client: impl Kms + 'static) -> Self {
        self.kms = Arc::new(client);
        self
    }

    pub fn s3(mut self, client: impl S3 + 'static) -> Self {
        self.s3 = Arc::new(client);
        self
    }

    pub fn sts(mut self, client: impl Sts + 'static) -> Self {
        self.sts = Arc::new(client);
        self
    }

    pub fn build(self) -> AwsClients {
        AwsClients {
            scope: self.scope,
            cloudformation: self.cloudformation,
            ec2: self.ec2,
            kms: self.kms,
            s3: self.s3,
            sts: self.sts,
        }
    }
}

pub fn context() -> ControllerContext {
    ControllerContext::new(clients_with("tenant").build(), clients_with("host").build())
}

pub trait ControllerContextExt {
    fn with_tenant(self, clients: AwsClients) -> Self;
    fn with_host(self, clients: AwsClients) -> Self;
}

impl ControllerContextExt for ControllerContext {
    fn with_tenant(mut self, clients: AwsClients) -> Self {
        self.tenant = clients;
        self
    }

    fn with_host(mut self, clients: AwsClients) -> Self {
        self.host = clients;
        self
    }
}

/// Resource dependencies with an echoing renderer and no host objects.
pub fn resource_config(status: Arc<dyn StatusWriter>) -> ResourceConfig {
    ResourceConfig {
        caches: Arc::new(LookupCaches::default()),
        status,
        host_objects: Arc::new(MockHostObjects::new()),
        renderer: Arc::new(EchoRenderer),
        installation: "gauss".to_string(),
        host_vpc_id: "vpc-host".to_string(),
        host_route_tables: vec!["host-private".to_string()],
        subnets: Arc::new(SubnetAllocator::new(SubnetPool::new("10.1.0.0/16", 24).unwrap())),
        stack_wait: WaitConfig::default(),
        retry: RetryConfig::default(),
    }
}

/// A resource returning scripted results, then `Ok(())` once exhausted.
pub struct ScriptedResource {
    name: String,
    results: Mutex<VecDeque<Result<()>>>,
    calls: AtomicUsize,
}

impl ScriptedResource {
    pub fn new(name: &str, results: Vec<Result<()>>) -> Self {
        Self {
            name: name.to_string(),
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

#[async_trait]
impl Resource for ScriptedResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_created(&self, _obj: &AWSConfig, _ctx: &mut ControllerContext) -> Result<()> {
        self.next()
    }

    async fn ensure_deleted(&self, _obj: &AWSConfig, _ctx: &mut ControllerContext) -> Result<()> {
        self.next()
    }
}

/// A resource that raises one signal on every call.
pub struct SignalingResource {
    name: String,
    cancel: bool,
}

impl SignalingResource {
    pub fn cancel(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cancel: true,
        }
    }

    pub fn keep_finalizer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cancel: false,
        }
    }

    fn signal(&self, ctx: &mut ControllerContext) {
        if self.cancel {
            ctx.cancel_remaining();
        } else {
            ctx.keep_finalizer();
        }
    }
}

#[async_trait]
impl Resource for SignalingResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_created(&self, _obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        self.signal(ctx);
        Ok(())
    }

    async fn ensure_deleted(&self, _obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        self.signal(ctx);
        Ok(())
    }
}

/// Status writer recording every patch.
#[derive(Default)]
pub struct RecordingStatusWriter {
    patches: Mutex<Vec<serde_json::Value>>,
    allocated: Mutex<Vec<String>>,
}

impl RecordingStatusWriter {
    pub fn with_allocated(subnets: &[&str]) -> Self {
        let writer = Self::default();
        *writer.allocated.lock().unwrap() = subnets.iter().map(|s| s.to_string()).collect();
        writer
    }

    pub fn patches(&self) -> Vec<serde_json::Value> {
        self.patches.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusWriter for RecordingStatusWriter {
    async fn patch_status(
        &self,
        _namespace: &str,
        _name: &str,
        patch: serde_json::Value,
    ) -> Result<()> {
        tokio::task::yield_now().await;
        if let Some(cidr) = patch.pointer("/cluster/network/cidr").and_then(|v| v.as_str()) {
            self.allocated.lock().unwrap().push(cidr.to_string());
        }
        self.patches.lock().unwrap().push(patch);
        Ok(())
    }

    async fn allocated_subnets(&self) -> Result<Vec<String>> {
        tokio::task::yield_now().await;
        Ok(self.allocated.lock().unwrap().clone())
    }
}

/// Renders the stack kind and its parameters, enough to assert on.
pub struct EchoRenderer;

impl TemplateRenderer for EchoRenderer {
    fn render(&self, kind: StackKind, params: &TemplateParams) -> Result<String> {
        Ok(format!("{}:{:?}", kind, params.parameters))
    }
}

/// In-memory CloudFormation keeping stacks by name and a call log.
#[derive(Default)]
pub struct FakeCloudFormation {
    stacks: Mutex<BTreeMap<String, StackDescription>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCloudFormation {
    pub fn insert(&self, name: &str, status: &str) {
        self.stacks.lock().unwrap().insert(
            name.to_string(),
            StackDescription {
                name: name.to_string(),
                status: status.to_string(),
                ..Default::default()
            },
        );
    }

    pub fn set_status(&self, name: &str, status: &str) {
        if let Some(stack) = self.stacks.lock().unwrap().get_mut(name) {
            stack.status = status.to_string();
        }
    }

    pub fn set_parameters(&self, name: &str, parameters: BTreeMap<String, String>) {
        if let Some(stack) = self.stacks.lock().unwrap().get_mut(name) {
            stack.parameters = parameters;
        }
    }

    pub fn set_outputs(&self, name: &str, outputs: &[(&str, &str)]) {
        if let Some(stack) = self.stacks.lock().unwrap().get_mut(name) {
            stack.outputs = outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
    }

    pub fn stack(&self, name: &str) -> Option<StackDescription> {
        self.stacks.lock().unwrap().get(name).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn not_found(name: &str) -> Error {
        Error::Aws(AwsError::new(
            "cloudformation",
            "ValidationError",
            format!("Stack with id {} does not exist", name),
        ))
    }
}

#[async_trait]
impl CloudFormation for FakeCloudFormation {
    async fn describe_stack(&self, name: &str) -> Result<StackDescription> {
        self.stack(name).ok_or_else(|| Self::not_found(name))
    }

    async fn create_stack(&self, input: CreateStackInput) -> Result<()> {
        self.record(format!("create:{}", input.name));
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
        self.record(format!("update:{}", input.name));
        let mut stacks = self.stacks.lock().unwrap();
        let stack = stacks
            .get_mut(&input.name)
            .ok_or_else(|| Self::not_found(&input.name))?;
        stack.parameters = input.parameters;
        stack.status = "UPDATE_IN_PROGRESS".to_string();
        Ok(())
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        self.record(format!("delete:{}", name));
        if let Some(stack) = self.stacks.lock().unwrap().get_mut(name) {
            stack.status = "DELETE_IN_PROGRESS".to_string();
        }
        Ok(())
    }

    async fn update_termination_protection(&self, name: &str, enabled: bool) -> Result<()> {
        self.record(format!("protect:{}:{}", name, enabled));
        let mut stacks = self.stacks.lock().unwrap();
        let stack = stacks.get_mut(name).ok_or_else(|| Self::not_found(name))?;
        stack.termination_protection = enabled;
        Ok(())
    }
}

/// In-memory EC2 with fixed instances, VPCs and route tables.
#[derive(Default)]
pub struct FakeEc2 {
    pub instances: Vec<Instance>,
    pub vpc_cidrs: BTreeMap<String, String>,
    pub route_tables: Vec<RouteTable>,
    pub(crate) disabled: Mutex<Vec<String>>,
}

impl FakeEc2 {
    pub fn with_masters(ips: &[&str]) -> Self {
        Self {
            instances: ips
                .iter()
                .enumerate()
                .map(|(i, ip)| Instance {
                    id: format!("i-master{}", i),
                    private_ip: Some(ip.to_string()),
                    state: "running".to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn disabled(&self) -> Vec<String> {
        self.disabled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ec2 for FakeEc2 {
    async fn describe_instances(&self, _tags: BTreeMap<String, String>) -> Result<Vec<Instance>> {
        Ok(self.instances.clone())
    }

    async fn disable_api_termination(&self, instance_id: &str) -> Result<()> {
        self.disabled.lock().unwrap().push(instance_id.to_string());
        Ok(())
    }

    async fn describe_vpc_cidr(&self, vpc_id: &str) -> Result<String> {
        self.vpc_cidrs
            .get(vpc_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("vpc {}", vpc_id)))
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
