//! CloudFormation stack model
//!
//! A stack is tracked as a [`StackState`]: its name plus the parameter set it
//! was created with. The same type carries both the current state (read back
//! from DescribeStacks) and the desired state (derived from the cluster
//! description), so comparing the two is a map comparison.

mod lifecycle;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::controller::ResourceState;

pub use lifecycle::{StackLifecycle, WaitConfig};

/// The three dependency-ordered stacks of a tenant cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StackKind {
    /// Control-plane initializer: host-account IAM roles and VPC peering.
    Cpi,
    /// Tenant-cluster control plane: the bulk of the tenant infrastructure.
    Tccp,
    /// Control-plane finalizer: host-account DNS records and routes.
    Cpf,
}

impl StackKind {
    /// Key under which the stack name is recorded in the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            StackKind::Cpi => "cpi",
            StackKind::Tccp => "tccp",
            StackKind::Cpf => "cpf",
        }
    }

    pub fn stack_name(&self, cluster_id: &str) -> String {
        let suffix = match self {
            StackKind::Cpi => "host-setup",
            StackKind::Tccp => "guest-main",
            StackKind::Cpf => "host-main",
        };
        format!("{}-{}", cluster_id, suffix)
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CloudFormation stack status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateFailed,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    ReviewInProgress,
    ImportInProgress,
    ImportComplete,
    ImportRollbackInProgress,
    ImportRollbackFailed,
    ImportRollbackComplete,
    Unknown(String),
}

impl FromStr for StackStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "CREATE_IN_PROGRESS" => StackStatus::CreateInProgress,
            "CREATE_FAILED" => StackStatus::CreateFailed,
            "CREATE_COMPLETE" => StackStatus::CreateComplete,
            "ROLLBACK_IN_PROGRESS" => StackStatus::RollbackInProgress,
            "ROLLBACK_FAILED" => StackStatus::RollbackFailed,
            "ROLLBACK_COMPLETE" => StackStatus::RollbackComplete,
            "DELETE_IN_PROGRESS" => StackStatus::DeleteInProgress,
            "DELETE_FAILED" => StackStatus::DeleteFailed,
            "DELETE_COMPLETE" => StackStatus::DeleteComplete,
            "UPDATE_IN_PROGRESS" => StackStatus::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => StackStatus::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => StackStatus::UpdateComplete,
            "UPDATE_FAILED" => StackStatus::UpdateFailed,
            "UPDATE_ROLLBACK_IN_PROGRESS" => StackStatus::UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_FAILED" => StackStatus::UpdateRollbackFailed,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                StackStatus::UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => StackStatus::UpdateRollbackComplete,
            "REVIEW_IN_PROGRESS" => StackStatus::ReviewInProgress,
            "IMPORT_IN_PROGRESS" => StackStatus::ImportInProgress,
            "IMPORT_COMPLETE" => StackStatus::ImportComplete,
            "IMPORT_ROLLBACK_IN_PROGRESS" => StackStatus::ImportRollbackInProgress,
            "IMPORT_ROLLBACK_FAILED" => StackStatus::ImportRollbackFailed,
            "IMPORT_ROLLBACK_COMPLETE" => StackStatus::ImportRollbackComplete,
            other => StackStatus::Unknown(other.to_string()),
        })
    }
}

impl StackStatus {
    pub fn parse(s: &str) -> Self {
        match s.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateInProgress
                | StackStatus::RollbackInProgress
                | StackStatus::DeleteInProgress
                | StackStatus::UpdateInProgress
                | StackStatus::UpdateCompleteCleanupInProgress
                | StackStatus::UpdateRollbackInProgress
                | StackStatus::UpdateRollbackCompleteCleanupInProgress
                | StackStatus::ReviewInProgress
                | StackStatus::ImportInProgress
                | StackStatus::ImportRollbackInProgress
        )
    }

    /// Outputs and parameters of a stack in one of these statuses cannot be
    /// trusted to describe a working stack.
    pub fn is_untrustworthy(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateInProgress
                | StackStatus::RollbackInProgress
                | StackStatus::RollbackComplete
        )
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StackStatus::CreateComplete | StackStatus::UpdateComplete)
    }

    /// Terminal failure statuses. The create wait loop gives up on these.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateFailed
                | StackStatus::RollbackFailed
                | StackStatus::RollbackComplete
                | StackStatus::DeleteFailed
                | StackStatus::DeleteComplete
                | StackStatus::UpdateRollbackFailed
        )
    }
}

/// Current or desired configuration of one stack.
///
/// `transitional` marks a current state read while the stack was in an
/// untrustworthy status: only the name is populated and no update may be
/// built against it.
#[derive(Clone, Debug, Default)]
pub struct StackState {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
    pub transitional: bool,
}

impl PartialEq for StackState {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.parameters == other.parameters
    }
}

impl StackState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn transitional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
            transitional: true,
        }
    }
}

impl ResourceState for StackState {
    fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    fn identity(&self) -> &str {
        &self.name
    }
}
