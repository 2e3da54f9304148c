//! Resource sets
//!
//! A resource set is an ordered list of resources built once at boot. The
//! order encodes dependencies: lookups first, then stacks, then whatever
//! consumes stack outputs. Resources run strictly one after another; the
//! cooperative signals are checked after each one returns.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::context::{ControllerContext, Signals};
use super::metrics;
use super::resource::Resource;
use crate::crd::AWSConfig;
use crate::error::Result;

/// How a pass ended, when it did not fail.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Resources after this index did not run.
    pub cancelled_at: Option<usize>,
    pub keep_finalizer: bool,
}

impl PassOutcome {
    fn from_signals(signals: Signals, cancelled_at: Option<usize>) -> Self {
        Self {
            cancelled_at,
            keep_finalizer: signals.keep_finalizer,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    fn label(&self) -> &'static str {
        if self.is_cancelled() {
            "cancelled"
        } else if self.keep_finalizer {
            "finalizer_kept"
        } else {
            "completed"
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Create,
    Delete,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Delete => "delete",
        }
    }
}

pub struct ResourceSet {
    version: String,
    resources: Vec<Arc<dyn Resource>>,
}

impl ResourceSet {
    pub fn new(version: impl Into<String>, resources: Vec<Arc<dyn Resource>>) -> Self {
        Self {
            version: version.into(),
            resources,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[instrument(skip_all, fields(cluster = %obj.cluster_id(), version = %self.version))]
    pub async fn ensure_created(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<PassOutcome> {
        self.run(Operation::Create, obj, ctx).await
    }

    #[instrument(skip_all, fields(cluster = %obj.cluster_id(), version = %self.version))]
    pub async fn ensure_deleted(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<PassOutcome> {
        self.run(Operation::Delete, obj, ctx).await
    }

    async fn run(
        &self,
        operation: Operation,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<PassOutcome> {
        let mut cancelled_at = None;

        for (index, resource) in self.resources.iter().enumerate() {
            debug!(resource = resource.name(), operation = operation.as_str(), "Running resource");

            let result = match operation {
                Operation::Create => resource.ensure_created(obj, ctx).await,
                Operation::Delete => resource.ensure_deleted(obj, ctx).await,
            };
            if let Err(e) = result {
                metrics::inc_pass(operation.as_str(), "failed");
                return Err(e);
            }

            if ctx.is_cancelled() {
                info!(
                    resource = resource.name(),
                    skipped = self.resources.len() - index - 1,
                    "Resource cancelled the remaining pipeline"
                );
                cancelled_at = Some(index);
                break;
            }
        }

        let outcome = PassOutcome::from_signals(ctx.signals(), cancelled_at);
        metrics::inc_pass(operation.as_str(), outcome.label());
        Ok(outcome)
    }
}
