//! Stack template data
//!
//! A [`TemplateParams`] is the side-effect-free input of template rendering:
//! a snapshot of the cluster description, the resolved account IDs of the
//! tenant and host accounts, status-derived values and the stack's
//! parameters. Rendering it into template text is the job of a
//! [`TemplateRenderer`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use crate::controller::ControllerContext;
use crate::crd::{AWSConfig, AwsNode};
use crate::error::{Error, Result};
use crate::stack::StackKind;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub id: String,
    pub version_bundle: String,
    pub region: String,
    pub availability_zone: String,
    pub api_hosted_zone: String,
    pub ingress_hosted_zone: String,
    pub masters: Vec<AwsNode>,
    pub workers: Vec<AwsNode>,
}

impl ClusterSnapshot {
    pub fn from_config(obj: &AWSConfig) -> Self {
        Self {
            id: obj.cluster_id().to_string(),
            version_bundle: obj.version_bundle().to_string(),
            region: obj.spec.aws.region.clone(),
            availability_zone: obj.spec.aws.availability_zone.clone(),
            api_hosted_zone: obj.spec.aws.api_hosted_zone.clone(),
            ingress_hosted_zone: obj.spec.aws.ingress_hosted_zone.clone(),
            masters: obj.spec.aws.masters.clone(),
            workers: obj.spec.aws.workers.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParams {
    pub stack: String,
    pub installation: String,
    pub cluster: ClusterSnapshot,
    pub tenant_account_id: String,
    pub host_account_id: String,
    pub host_vpc_cidr: String,
    pub tenant_cidr: String,
    pub parameters: BTreeMap<String, String>,
}

impl TemplateParams {
    pub fn new(
        kind: StackKind,
        installation: &str,
        obj: &AWSConfig,
        ctx: &ControllerContext,
        parameters: &BTreeMap<String, String>,
    ) -> Self {
        let status = &ctx.status;
        Self {
            stack: kind.as_str().to_string(),
            installation: installation.to_string(),
            cluster: ClusterSnapshot::from_config(obj),
            tenant_account_id: status.tenant_cluster.account_id.clone().unwrap_or_default(),
            host_account_id: status.control_plane.account_id.clone().unwrap_or_default(),
            host_vpc_cidr: status.control_plane.vpc_cidr.clone().unwrap_or_default(),
            tenant_cidr: status
                .tenant_cluster
                .cidr
                .clone()
                .or_else(|| obj.status_cidr().map(str::to_string))
                .unwrap_or_default(),
            parameters: parameters.clone(),
        }
    }
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, kind: StackKind, params: &TemplateParams) -> Result<String>;
}

/// Renders `<dir>/<kind>.yaml` with minijinja.
///
/// The template context is the serialized [`TemplateParams`], so a template
/// reads e.g. `{{ cluster.id }}` or `{{ parameters.WorkerCount }}`. Undefined
/// values are an error so a typo never reaches CloudFormation as empty text.
pub struct FileTemplateRenderer {
    dir: PathBuf,
    env: Environment<'static>,
}

impl FileTemplateRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self {
            dir: dir.into(),
            env,
        }
    }

    /// Render template text against `params`.
    pub fn render_str(&self, template: &str, params: &TemplateParams) -> Result<String> {
        Ok(self.env.render_str(template, params)?)
    }
}

impl TemplateRenderer for FileTemplateRenderer {
    fn render(&self, kind: StackKind, params: &TemplateParams) -> Result<String> {
        let path = self.dir.join(format!("{}.yaml", kind.as_str()));
        let template = std::fs::read_to_string(&path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read template {}: {}", path.display(), e))
        })?;
        self.render_str(&template, params)
    }
}
