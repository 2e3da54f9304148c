use async_trait::async_trait;
use tracing::info;

use super::ResourceConfig;
use crate::controller::{ControllerContext, CrudResource, ResourceState};
use crate::crd::AWSConfig;
use crate::error::{Error, Result};
use crate::key;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BucketState {
    pub name: String,
}

impl ResourceState for BucketState {
    fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    fn identity(&self) -> &str {
        &self.name
    }
}

/// The tenant's bucket in its own account, named after the account ID.
pub struct S3BucketResource;

impl S3BucketResource {
    pub fn new(_config: &ResourceConfig) -> Self {
        Self
    }

    fn bucket_name(obj: &AWSConfig, ctx: &ControllerContext) -> Result<String> {
        let account_id = ctx.status.tenant_cluster.account_id.as_deref().ok_or_else(|| {
            Error::InvalidConfig("tenant account ID must be resolved before the bucket".into())
        })?;
        Ok(key::bucket_name(account_id, obj.cluster_id()))
    }
}

#[async_trait]
impl CrudResource for S3BucketResource {
    type State = BucketState;

    fn name(&self) -> &str {
        "s3bucket"
    }

    async fn current_state(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<BucketState> {
        let name = Self::bucket_name(obj, ctx)?;
        match ctx.tenant.s3.head_bucket(&name).await {
            Ok(()) => Ok(BucketState { name }),
            Err(e) if e.is_not_found() => Ok(BucketState::default()),
            Err(e) => Err(e),
        }
    }

    fn desired_state(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<BucketState> {
        Ok(BucketState {
            name: Self::bucket_name(obj, ctx)?,
        })
    }

    async fn apply_create_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &BucketState,
    ) -> Result<()> {
        match ctx
            .tenant
            .s3
            .create_bucket(&change.name, &obj.spec.aws.region)
            .await
        {
            Ok(()) => {
                info!(cluster = %obj.cluster_id(), bucket = %change.name, "Created bucket");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn apply_update_change(
        &self,
        _obj: &AWSConfig,
        _ctx: &mut ControllerContext,
        _change: &BucketState,
    ) -> Result<()> {
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &BucketState,
    ) -> Result<()> {
        let s3 = ctx.tenant.s3.clone();
        let objects = s3.list_objects(&change.name).await?;
        for object in &objects {
            s3.delete_object(&change.name, object).await?;
        }
        match s3.delete_bucket(&change.name).await {
            Ok(()) => {
                info!(
                    cluster = %obj.cluster_id(),
                    bucket = %change.name,
                    objects = objects.len(),
                    "Deleted bucket"
                );
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
