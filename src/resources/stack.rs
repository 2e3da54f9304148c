//! Generic CloudFormation stack resource
//!
//! The three stacks of a tenant cluster share one lifecycle and differ in
//! the account they live in, their parameters and a few hooks. Those
//! differences are a [`StackDefinition`]; [`StackResource`] turns one into a
//! [`CrudResource`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::{write_status, ResourceConfig};
use crate::aws::{AwsClients, CloudFormation, CreateStackInput, UpdateStackInput};
use crate::controller::{ControllerContext, CrudResource, Patch, StatusWriter};
use crate::crd::AWSConfig;
use crate::error::Result;
use crate::key;
use crate::stack::{StackKind, StackLifecycle, StackState, StackStatus, WaitConfig};
use crate::template::{TemplateParams, TemplateRenderer};

#[async_trait]
pub trait StackDefinition: Send + Sync {
    fn kind(&self) -> StackKind;

    /// The account the stack lives in.
    fn clients<'a>(&self, ctx: &'a ControllerContext) -> &'a AwsClients;

    /// Parameters of the desired stack. `None` means a prerequisite is not
    /// available yet; the definition has then raised cancel-remaining.
    fn parameters(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<Option<BTreeMap<String, String>>>;

    /// Block the pass until a freshly created stack is complete.
    fn waits_for_creation(&self) -> bool {
        false
    }

    fn termination_protection(&self) -> bool {
        false
    }

    /// Called on the create path once the stack is known to be usable:
    /// observed in a settled, non-failed status or waited for until created.
    fn record_ready(&self, _ctx: &mut ControllerContext) {}

    /// Runs before termination protection is lifted and the stack deleted.
    async fn before_delete(&self, _obj: &AWSConfig, _ctx: &mut ControllerContext) -> Result<()> {
        Ok(())
    }
}

pub struct StackResource<D> {
    definition: D,
    renderer: Arc<dyn TemplateRenderer>,
    status: Arc<dyn StatusWriter>,
    installation: String,
    wait: WaitConfig,
}

impl<D: StackDefinition> StackResource<D> {
    pub fn new(definition: D, config: &ResourceConfig) -> Self {
        Self {
            definition,
            renderer: config.renderer.clone(),
            status: config.status.clone(),
            installation: config.installation.clone(),
            wait: config.stack_wait.clone(),
        }
    }

    fn cloudformation(&self, ctx: &ControllerContext) -> Arc<dyn CloudFormation> {
        self.definition.clients(ctx).cloudformation.clone()
    }

    /// The recorded name wins over the derived one so that a renamed stack
    /// is found and replaced rather than leaked.
    fn current_name(&self, obj: &AWSConfig) -> String {
        let kind = self.definition.kind();
        obj.status_stack_name(kind.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| kind.stack_name(obj.cluster_id()))
    }

    fn render(
        &self,
        obj: &AWSConfig,
        ctx: &ControllerContext,
        parameters: &BTreeMap<String, String>,
    ) -> Result<String> {
        let kind = self.definition.kind();
        let params = TemplateParams::new(kind, &self.installation, obj, ctx, parameters);
        self.renderer.render(kind, &params)
    }
}

#[async_trait]
impl<D: StackDefinition> CrudResource for StackResource<D> {
    type State = StackState;

    fn name(&self) -> &str {
        self.definition.kind().as_str()
    }

    async fn current_state(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<StackState> {
        let name = self.current_name(obj);
        let cloudformation = self.cloudformation(ctx);
        let Some(stack) = StackLifecycle::new(cloudformation.as_ref())
            .describe(&name)
            .await?
        else {
            return Ok(StackState::default());
        };

        let status = StackStatus::parse(&stack.status);
        if status == StackStatus::DeleteComplete {
            return Ok(StackState::default());
        }

        if obj.is_being_deleted() {
            if status.is_in_progress() {
                info!(stack = %name, status = %stack.status, "Stack is in transition, keeping finalizer");
                ctx.keep_finalizer();
                return Ok(StackState::default());
            }
            return Ok(StackState {
                name,
                parameters: stack.parameters,
                transitional: false,
            });
        }

        if status.is_untrustworthy() || status.is_in_progress() {
            if status == StackStatus::RollbackComplete {
                warn!(stack = %name, "Stack rolled back and needs to be deleted before it can be recreated");
                ctx.report_degraded(
                    "StackRolledBack",
                    format!(
                        "stack {} is in ROLLBACK_COMPLETE and must be deleted before it can be recreated",
                        name
                    ),
                );
            }
            return Ok(StackState::transitional(name));
        }

        if !status.is_failed() {
            self.definition.record_ready(ctx);
        }
        Ok(StackState {
            name,
            parameters: stack.parameters,
            transitional: false,
        })
    }

    fn desired_state(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<StackState> {
        let Some(parameters) = self.definition.parameters(obj, ctx)? else {
            return Ok(StackState::default());
        };
        Ok(StackState {
            name: self.definition.kind().stack_name(obj.cluster_id()),
            parameters,
            transitional: false,
        })
    }

    fn update_patch(&self, current: &StackState, desired: &StackState) -> Patch<StackState> {
        if current.transitional {
            return Patch::empty();
        }
        Patch::for_update(current, desired)
    }

    async fn apply_create_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &StackState,
    ) -> Result<()> {
        let kind = self.definition.kind();
        let input = CreateStackInput {
            name: change.name.clone(),
            template_body: self.render(obj, ctx, &change.parameters)?,
            parameters: change.parameters.clone(),
            tags: key::cluster_tags(obj, &self.installation),
            termination_protection: self.definition.termination_protection(),
        };

        let cloudformation = self.cloudformation(ctx);
        let lifecycle = StackLifecycle::new(cloudformation.as_ref());
        let created = lifecycle.create_if_absent(input).await?;

        write_status(
            self.status.as_ref(),
            obj,
            json!({ "aws": { "stacks": { kind.as_str(): change.name } } }),
        )
        .await?;

        if created && self.definition.waits_for_creation() {
            lifecycle.wait_until_created(&change.name, &self.wait).await?;
            self.definition.record_ready(ctx);
        }
        Ok(())
    }

    async fn apply_update_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &StackState,
    ) -> Result<()> {
        let input = UpdateStackInput {
            name: change.name.clone(),
            template_body: self.render(obj, ctx, &change.parameters)?,
            parameters: change.parameters.clone(),
        };
        let cloudformation = self.cloudformation(ctx);
        StackLifecycle::new(cloudformation.as_ref())
            .update(input)
            .await
    }

    async fn apply_delete_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &StackState,
    ) -> Result<()> {
        self.definition.before_delete(obj, ctx).await?;

        let cloudformation = self.cloudformation(ctx);
        let lifecycle = StackLifecycle::new(cloudformation.as_ref());
        lifecycle.disable_termination_protection(&change.name).await?;
        lifecycle.delete(&change.name).await?;

        if obj.is_being_deleted() {
            ctx.keep_finalizer();
        }
        Ok(())
    }
}
