use async_trait::async_trait;
use tracing::{info, warn};

use super::ResourceConfig;
use crate::controller::{ControllerContext, CrudResource, ResourceState};
use crate::crd::AWSConfig;
use crate::error::Result;
use crate::key;

const PENDING_DELETION: &str = "PendingDeletion";
const DELETION_WINDOW_DAYS: i32 = 7;

/// The KMS key encrypting tenant secrets, addressed by its alias.
///
/// Only the alias is compared: the key ID and ARN are assigned by KMS and
/// never desired.
#[derive(Clone, Debug, Default)]
pub struct KeyState {
    pub alias: String,
    pub key_id: String,
    pub arn: String,
    pub pending_deletion: bool,
}

impl PartialEq for KeyState {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias
    }
}

impl ResourceState for KeyState {
    fn is_empty(&self) -> bool {
        self.alias.is_empty()
    }

    fn identity(&self) -> &str {
        &self.alias
    }
}

pub struct EncryptionKeyResource {
    installation: String,
}

impl EncryptionKeyResource {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            installation: config.installation.clone(),
        }
    }
}

#[async_trait]
impl CrudResource for EncryptionKeyResource {
    type State = KeyState;

    fn name(&self) -> &str {
        "encryptionkey"
    }

    async fn current_state(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<KeyState> {
        let alias = key::encryption_key_alias(obj.cluster_id());
        let metadata = match ctx.tenant.kms.describe_key(&alias).await {
            Ok(metadata) => metadata,
            Err(e) if e.is_not_found() => return Ok(KeyState::default()),
            Err(e) => return Err(e),
        };

        let pending_deletion = metadata.state == PENDING_DELETION;
        if pending_deletion {
            warn!(cluster = %obj.cluster_id(), key_id = %metadata.key_id, "Encryption key is pending deletion");
        } else {
            ctx.status.tenant_cluster.encryption_key = Some(metadata.arn.clone());
        }

        Ok(KeyState {
            alias,
            key_id: metadata.key_id,
            arn: metadata.arn,
            pending_deletion,
        })
    }

    fn desired_state(&self, obj: &AWSConfig, _ctx: &mut ControllerContext) -> Result<KeyState> {
        Ok(KeyState {
            alias: key::encryption_key_alias(obj.cluster_id()),
            ..Default::default()
        })
    }

    async fn apply_create_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &KeyState,
    ) -> Result<()> {
        let metadata = ctx
            .tenant
            .kms
            .create_key(key::cluster_tags(obj, &self.installation))
            .await?;
        if let Err(e) = ctx.tenant.kms.create_alias(&change.alias, &metadata.key_id).await {
            // Unaliased keys are invisible to the next pass.
            warn!(cluster = %obj.cluster_id(), key_id = %metadata.key_id, error = %e, "Aliasing encryption key failed, scheduling its deletion");
            ctx.tenant
                .kms
                .schedule_key_deletion(&metadata.key_id, DELETION_WINDOW_DAYS)
                .await?;
            return Err(e);
        }
        info!(cluster = %obj.cluster_id(), alias = %change.alias, "Created encryption key");
        ctx.status.tenant_cluster.encryption_key = Some(metadata.arn);
        Ok(())
    }

    async fn apply_update_change(
        &self,
        _obj: &AWSConfig,
        _ctx: &mut ControllerContext,
        _change: &KeyState,
    ) -> Result<()> {
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &KeyState,
    ) -> Result<()> {
        if change.pending_deletion {
            return Ok(());
        }
        ctx.tenant
            .kms
            .schedule_key_deletion(&change.key_id, DELETION_WINDOW_DAYS)
            .await?;
        info!(cluster = %obj.cluster_id(), key_id = %change.key_id, "Scheduled encryption key deletion");
        Ok(())
    }
}
