//! Per-stack lifecycle operations
//!
//! absent -> create (no-op if already present) -> creating -> present;
//! present -> disable termination protection -> DeleteStack -> deleting.
//! The leaf checks here are the only places where AWS errors turn into
//! non-error values: a missing stack is `None`, an existing one is a no-op
//! create, a stack already being deleted needs no protection change.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::StackStatus;
use crate::aws::{CloudFormation, CreateStackInput, StackDescription, UpdateStackInput};
use crate::error::{Error, Result};

/// Bounds of the create wait loop.
#[derive(Clone, Debug)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            deadline: Duration::from_secs(20 * 60),
        }
    }
}

pub struct StackLifecycle<'a> {
    cloudformation: &'a dyn CloudFormation,
}

impl<'a> StackLifecycle<'a> {
    pub fn new(cloudformation: &'a dyn CloudFormation) -> Self {
        Self { cloudformation }
    }

    /// Describe a stack, translating "does not exist" into `None`.
    pub async fn describe(&self, name: &str) -> Result<Option<StackDescription>> {
        match self.cloudformation.describe_stack(name).await {
            Ok(stack) => Ok(Some(stack)),
            Err(e) if e.is_stack_not_found() => {
                debug!(stack = %name, "Stack does not exist");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Create a stack unless it already exists. Returns whether a create call
    /// was accepted.
    pub async fn create_if_absent(&self, input: CreateStackInput) -> Result<bool> {
        let name = input.name.clone();
        match self.cloudformation.create_stack(input).await {
            Ok(()) => {
                info!(stack = %name, "Requested stack creation");
                Ok(true)
            }
            Err(e) if e.is_already_exists() => {
                debug!(stack = %name, "Stack already exists, nothing to create");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll DescribeStacks until the stack reaches a terminal status or the
    /// deadline passes.
    pub async fn wait_until_created(&self, name: &str, config: &WaitConfig) -> Result<()> {
        let started = Instant::now();

        loop {
            match self.describe(name).await? {
                None => {
                    return Err(Error::ExecutionFailed(format!(
                        "stack {} disappeared while waiting for creation",
                        name
                    )))
                }
                Some(stack) => {
                    let status = StackStatus::parse(&stack.status);
                    if status.is_complete() {
                        info!(stack = %name, elapsed = ?started.elapsed(), "Stack created");
                        return Ok(());
                    }
                    if status.is_failed() {
                        return Err(Error::ExecutionFailed(format!(
                            "stack {} ended in status {}",
                            name, stack.status
                        )));
                    }
                    debug!(stack = %name, status = %stack.status, "Waiting for stack creation");
                }
            }

            if started.elapsed() + config.poll_interval > config.deadline {
                return Err(Error::ExecutionFailed(format!(
                    "stack {} not created within {:?}",
                    name, config.deadline
                )));
            }
            tokio::time::sleep(config.poll_interval).await;
        }
    }

    /// Update a stack; an update without changes is a no-op.
    pub async fn update(&self, input: UpdateStackInput) -> Result<()> {
        let name = input.name.clone();
        match self.cloudformation.update_stack(input).await {
            Ok(()) => {
                info!(stack = %name, "Requested stack update");
                Ok(())
            }
            Err(Error::Aws(e)) if e.is_no_updates() => {
                debug!(stack = %name, "Stack is already up to date");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Disable stack-level termination protection. A stack that is already
    /// being deleted, or already gone, needs nothing.
    pub async fn disable_termination_protection(&self, name: &str) -> Result<()> {
        match self
            .cloudformation
            .update_termination_protection(name, false)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_delete_in_progress() => {
                debug!(stack = %name, "Stack is already being deleted");
                Ok(())
            }
            Err(e) if e.is_stack_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Request deletion. Does not wait for the deletion to finish.
    pub async fn delete(&self, name: &str) -> Result<()> {
        match self.cloudformation.delete_stack(name).await {
            Ok(()) => {
                info!(stack = %name, "Requested stack deletion");
                Ok(())
            }
            Err(e) if e.is_stack_not_found() => {
                warn!(stack = %name, "Stack vanished before deletion");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
