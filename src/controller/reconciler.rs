//! Main reconciler for AWSConfig resources
//!
//! Implements the controller pattern using kube-rs runtime. Each pass routes
//! the object to the resource set of its version bundle, builds a fresh
//! [`ControllerContext`] and runs the creation or deletion pipeline. The
//! finalizer is handled here so that resources can hold it back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Resource as KubeResource, ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use super::conditions;
use super::context::{ControllerContext, Degradation};
use super::finalizers::{add_finalizer, has_finalizer, remove_finalizer};
use super::kube_client::FIELD_MANAGER;
use super::pipeline::PassOutcome;
use super::router::ResourceRouter;
use crate::aws::ClientFactory;
use crate::crd::{AWSConfig, Condition};
use crate::error::{Error, Result};

/// Requeue interval once everything converged.
pub const STEADY_REQUEUE: Duration = Duration::from_secs(5 * 60);
/// Requeue interval after a resource cancelled the pass or kept the
/// finalizer.
pub const SIGNAL_REQUEUE: Duration = Duration::from_secs(30);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub router: ResourceRouter,
    pub clients: Arc<dyn ClientFactory>,
    /// Only the leader reconciles. Defaults to true without leader election.
    pub is_leader: Arc<AtomicBool>,
}

/// What to do after a pass that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassAction {
    Requeue(Duration),
    RemoveFinalizer,
}

pub fn next_action(deleting: bool, outcome: &PassOutcome) -> PassAction {
    if deleting {
        if outcome.is_cancelled() || outcome.keep_finalizer {
            PassAction::Requeue(SIGNAL_REQUEUE)
        } else {
            PassAction::RemoveFinalizer
        }
    } else if outcome.is_cancelled() {
        PassAction::Requeue(SIGNAL_REQUEUE)
    } else {
        PassAction::Requeue(STEADY_REQUEUE)
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let configs: Api<AWSConfig> = Api::all(state.client.clone());

    info!(versions = ?state.router.versions(), "Starting AWSConfig controller");

    match configs.list(&Default::default()).await {
        Ok(_) => info!("AWSConfig CRD is available"),
        Err(e) => {
            error!("AWSConfig CRD not found. Please install the CRD first: {:?}", e);
            return Err(Error::InvalidConfig("AWSConfig CRD not installed".to_string()));
        }
    }

    Controller::new(configs, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// Helper to emit a Kubernetes Event
async fn emit_event(
    client: &Client,
    obj: &AWSConfig,
    event_type: &str,
    reason: &str,
    message: &str,
) -> Result<()> {
    let events: Api<Event> = Api::namespaced(client.clone(), &obj.namespace_or_default());

    let time = chrono::Utc::now();
    let event = Event {
        metadata: kube::api::ObjectMeta {
            generate_name: Some(format!("{}-event-", obj.name_any())),
            ..Default::default()
        },
        type_: Some(event_type.to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        involved_object: obj.object_ref(&()),
        first_timestamp: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(time)),
        last_timestamp: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(time)),
        count: Some(1),
        ..Default::default()
    };

    events
        .create(&PostParams::default(), &event)
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

/// Events are informational; failing to emit one never fails a pass.
async fn emit_warning(client: &Client, obj: &AWSConfig, reason: &str, message: &str) {
    if let Err(e) = emit_event(client, obj, "Warning", reason, message).await {
        warn!("Failed to emit event for {}: {:?}", obj.name_any(), e);
    }
}

/// Apply `update` to the object's conditions and write them back.
async fn update_conditions(
    client: &Client,
    obj: &AWSConfig,
    update: impl FnOnce(&mut Vec<Condition>),
) -> Result<()> {
    let api: Api<AWSConfig> = Api::namespaced(client.clone(), &obj.namespace_or_default());

    let mut conditions = obj
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    update(&mut conditions);

    let patch = serde_json::json!({
        "status": {
            "conditions": conditions,
            "observedGeneration": obj.metadata.generation,
        }
    });
    api.patch_status(
        &obj.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await
    .map_err(Error::KubeError)?;
    Ok(())
}

async fn build_context(obj: &AWSConfig, state: &ControllerState) -> Result<ControllerContext> {
    let aws = &obj.spec.aws;
    let tenant = state
        .clients
        .tenant(&aws.credential_role_arn, &aws.region)
        .await?;
    Ok(ControllerContext::new(tenant, state.clients.host()))
}

/// The main reconciliation function
///
/// This function is called whenever an AWSConfig is created, updated or
/// deleted, and when the requeue timer expires.
#[instrument(skip(state), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<AWSConfig>, state: Arc<ControllerState>) -> Result<Action> {
    if !state.is_leader.load(Ordering::Relaxed) {
        debug!("Not the leader, skipping reconciliation");
        return Ok(Action::requeue(Duration::from_secs(15)));
    }

    if obj.is_being_deleted() {
        if !has_finalizer(&obj) {
            return Ok(Action::await_change());
        }
        return cleanup_aws_config(&state, &obj).await;
    }
    apply_aws_config(&state, &obj).await
}

#[instrument(skip_all, fields(cluster = %obj.cluster_id()))]
async fn apply_aws_config(state: &ControllerState, obj: &AWSConfig) -> Result<Action> {
    let client = &state.client;
    let generation = obj.metadata.generation;

    if let Err(errors) = obj.spec.validate() {
        let message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        warn!("Validation failed for {}: {}", obj.name_any(), message);
        update_conditions(client, obj, |c| {
            conditions::set_degraded(c, "InvalidSpec", &message, generation)
        })
        .await?;
        emit_warning(client, obj, "InvalidSpec", &message).await;
        return Err(Error::InvalidConfig(message));
    }

    add_finalizer(client, obj).await?;

    let set = state.router.route(obj)?;
    let mut ctx = build_context(obj, state).await?;

    let outcome = match set.ensure_created(obj, &mut ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = e.to_string();
            emit_warning(client, obj, "CreateFailed", &message).await;
            update_conditions(client, obj, |c| {
                conditions::set_degraded(c, "CreateFailed", &message, generation)
            })
            .await?;
            return Err(e);
        }
    };

    if let Some(degraded) = ctx.degraded() {
        emit_warning(client, obj, &degraded.reason, &degraded.message).await;
    }
    update_conditions(client, obj, |c| {
        record_create_pass(c, &outcome, ctx.degraded(), generation)
    })
    .await?;

    match next_action(false, &outcome) {
        PassAction::Requeue(after) => Ok(Action::requeue(after)),
        PassAction::RemoveFinalizer => Ok(Action::await_change()),
    }
}

/// Conditions after a create pass that returned without error.
fn record_create_pass(
    conditions: &mut Vec<Condition>,
    outcome: &PassOutcome,
    degraded: Option<&Degradation>,
    generation: Option<i64>,
) {
    let (reason, message) = if outcome.is_cancelled() {
        ("Waiting", "Waiting for dependent resources")
    } else {
        ("Created", "All resources are created")
    };
    conditions::set_created(conditions, !outcome.is_cancelled(), reason, message, generation);
    if let Some(degraded) = degraded {
        conditions::set_degraded(conditions, &degraded.reason, &degraded.message, generation);
    }
}

#[instrument(skip_all, fields(cluster = %obj.cluster_id()))]
async fn cleanup_aws_config(state: &ControllerState, obj: &AWSConfig) -> Result<Action> {
    let client = &state.client;
    info!("Deleting tenant cluster {}", obj.cluster_id());

    let set = state.router.route(obj)?;
    let mut ctx = build_context(obj, state).await?;

    let outcome = match set.ensure_deleted(obj, &mut ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            emit_warning(client, obj, "DeleteFailed", &e.to_string()).await;
            return Err(e);
        }
    };

    match next_action(true, &outcome) {
        PassAction::RemoveFinalizer => {
            remove_finalizer(client, obj).await?;
            Ok(Action::await_change())
        }
        PassAction::Requeue(after) => {
            update_conditions(client, obj, |c| {
                conditions::set_deleting(
                    c,
                    "Waiting for external resources to be deleted",
                    obj.metadata.generation,
                )
            })
            .await?;
            Ok(Action::requeue(after))
        }
    }
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(obj: Arc<AWSConfig>, error: &Error, _state: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {:?}", obj.name_any(), error);

    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}
