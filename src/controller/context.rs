//! Per-pass controller context
//!
//! A [`ControllerContext`] is built by the driver before the pipeline runs
//! and dropped when the pass ends. It is passed explicitly as `&mut` through
//! every resource call, so which resource reads or writes which scratch
//! value is visible in the signatures. Nothing in it survives the pass:
//! values a later pass needs are written to the AWSConfig status.

use std::collections::BTreeMap;

use crate::aws::AwsClients;

/// Scratch values filled in by resources during one pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextStatus {
    pub tenant_cluster: TenantClusterStatus,
    pub control_plane: ControlPlaneStatus,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TenantClusterStatus {
    pub account_id: Option<String>,
    /// Subnet allocated to the tenant cluster.
    pub cidr: Option<String>,
    /// ARN of the KMS key encrypting tenant secrets.
    pub encryption_key: Option<String>,
    pub tccp: TccpStatus,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TccpStatus {
    /// Whether the tenant control-plane stack reached a complete status.
    pub is_complete: bool,
    pub outputs: BTreeMap<String, String>,
    pub worker_asg_name: Option<String>,
    /// Desired capacity of the worker ASG as last applied.
    pub worker_asg_desired_capacity: Option<i32>,
    pub vpc_peering_connection_id: Option<String>,
    pub hosted_zone_name_servers: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlPlaneStatus {
    pub account_id: Option<String>,
    /// Whether the initializer stack was observed usable in this pass.
    pub cpi_ready: bool,
    pub vpc_cidr: Option<String>,
    /// IDs of the host route tables peered with tenant VPCs.
    pub route_table_ids: Vec<String>,
    /// Some configured host route table could not be found; the IDs above
    /// are left empty.
    pub route_tables_missing: bool,
}

/// Cooperative signals checked by the driver after each resource returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Signals {
    /// Stop the pass after the current resource; retry on the next trigger.
    pub cancel_remaining: bool,
    /// Do not let the AWSConfig be removed from the API yet.
    pub keep_finalizer: bool,
}

/// A condition a resource cannot resolve by itself, surfaced as Degraded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Degradation {
    pub reason: String,
    pub message: String,
}

pub struct ControllerContext {
    /// Clients scoped to the tenant account through the assumed role.
    pub tenant: AwsClients,
    /// Clients for the account the operator runs in.
    pub host: AwsClients,
    pub status: ContextStatus,
    signals: Signals,
    degraded: Option<Degradation>,
}

impl ControllerContext {
    pub fn new(tenant: AwsClients, host: AwsClients) -> Self {
        Self {
            tenant,
            host,
            status: ContextStatus::default(),
            signals: Signals::default(),
            degraded: None,
        }
    }

    pub fn cancel_remaining(&mut self) {
        self.signals.cancel_remaining = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals.cancel_remaining
    }

    pub fn keep_finalizer(&mut self) {
        self.signals.keep_finalizer = true;
    }

    pub fn is_finalizer_kept(&self) -> bool {
        self.signals.keep_finalizer
    }

    pub fn signals(&self) -> Signals {
        self.signals
    }

    /// Report a stuck state. The first report of a pass wins.
    pub fn report_degraded(&mut self, reason: &str, message: impl Into<String>) {
        self.degraded.get_or_insert_with(|| Degradation {
            reason: reason.to_string(),
            message: message.into(),
        });
    }

    pub fn degraded(&self) -> Option<&Degradation> {
        self.degraded.as_ref()
    }
}
