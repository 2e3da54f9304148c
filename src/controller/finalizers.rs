//! Finalizer handling for AWSConfig cleanup
//!
//! The finalizer is added before the first create pass and removed only
//! after a delete pass completes without any resource asking to keep it.
//! Until then Kubernetes keeps the AWSConfig around so that the operator
//! can still read the recorded stack names and account IDs.

use kube::{
    api::{Api, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::json;
use tracing::info;

use super::kube_client::FIELD_MANAGER;
use crate::crd::AWSConfig;
use crate::error::Result;

pub const AWS_CONFIG_FINALIZER: &str = "aws-operator.tenantcluster.io/finalizer";

pub async fn add_finalizer(client: &Client, obj: &AWSConfig) -> Result<()> {
    if has_finalizer(obj) {
        return Ok(());
    }
    let api: Api<AWSConfig> = Api::namespaced(client.clone(), &obj.namespace_or_default());

    let mut finalizers: Vec<String> = obj.finalizers().to_vec();
    finalizers.push(AWS_CONFIG_FINALIZER.to_string());

    let patch = json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(
        &obj.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    info!("Added finalizer to AWSConfig: {}", obj.name_any());
    Ok(())
}

/// Once the finalizer is removed, Kubernetes completes the deletion.
pub async fn remove_finalizer(client: &Client, obj: &AWSConfig) -> Result<()> {
    let api: Api<AWSConfig> = Api::namespaced(client.clone(), &obj.namespace_or_default());

    let patch = json!({
        "metadata": {
            "finalizers": remaining_finalizers(obj)
        }
    });
    api.patch(
        &obj.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    info!("Removed finalizer from AWSConfig: {}", obj.name_any());
    Ok(())
}

fn remaining_finalizers(obj: &AWSConfig) -> Vec<String> {
    obj.finalizers()
        .iter()
        .filter(|f| f.as_str() != AWS_CONFIG_FINALIZER)
        .cloned()
        .collect()
}

pub fn has_finalizer(obj: &AWSConfig) -> bool {
    obj.finalizers().iter().any(|f| f == AWS_CONFIG_FINALIZER)
}
