use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::{write_status, ResourceConfig};
use crate::cache::{validate_account_id, LookupCaches};
use crate::controller::{ControllerContext, Resource, StatusWriter};
use crate::crd::AWSConfig;
use crate::error::Result;

/// Which account a lookup resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountScope {
    /// The tenant account reached through the assumed role.
    Tenant,
    /// The account the operator runs in.
    Host,
}

/// Resolves an account ID into the context.
///
/// The durable status is read first, then the process cache, then STS. A
/// freshly resolved ID is written back to the status so later passes skip
/// the lookup entirely.
pub struct AccountIdResource {
    scope: AccountScope,
    caches: Arc<LookupCaches>,
    status: Arc<dyn StatusWriter>,
}

impl AccountIdResource {
    pub fn new(scope: AccountScope, config: &ResourceConfig) -> Self {
        Self {
            scope,
            caches: config.caches.clone(),
            status: config.status.clone(),
        }
    }

    fn recorded<'a>(&self, obj: &'a AWSConfig) -> Option<&'a str> {
        match self.scope {
            AccountScope::Tenant => obj.status_account_id(),
            AccountScope::Host => obj.status_host_account_id(),
        }
    }

    fn status_field(&self) -> &'static str {
        match self.scope {
            AccountScope::Tenant => "accountId",
            AccountScope::Host => "hostAccountId",
        }
    }

    /// Resolve the ID and store it in the context. Returns whether it was
    /// looked up rather than read from the status.
    async fn resolve(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<bool> {
        let (id, looked_up) = match self.recorded(obj) {
            Some(id) => {
                validate_account_id(id)?;
                (id.to_string(), false)
            }
            None => {
                let clients = match self.scope {
                    AccountScope::Tenant => &ctx.tenant,
                    AccountScope::Host => &ctx.host,
                };
                (self.caches.account_id.account_id(clients).await?, true)
            }
        };

        debug!(resource = self.name(), account_id = %id, looked_up, "Resolved account ID");
        match self.scope {
            AccountScope::Tenant => ctx.status.tenant_cluster.account_id = Some(id),
            AccountScope::Host => ctx.status.control_plane.account_id = Some(id),
        }
        Ok(looked_up)
    }
}

#[async_trait]
impl Resource for AccountIdResource {
    fn name(&self) -> &str {
        match self.scope {
            AccountScope::Tenant => "accountid",
            AccountScope::Host => "hostaccountid",
        }
    }

    async fn ensure_created(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        if !self.resolve(obj, ctx).await? {
            return Ok(());
        }
        let id = match self.scope {
            AccountScope::Tenant => ctx.status.tenant_cluster.account_id.clone(),
            AccountScope::Host => ctx.status.control_plane.account_id.clone(),
        };
        info!(resource = self.name(), cluster = %obj.cluster_id(), "Recording account ID in status");
        write_status(
            self.status.as_ref(),
            obj,
            json!({ "aws": { self.status_field(): id } }),
        )
        .await
    }

    async fn ensure_deleted(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        self.resolve(obj, ctx).await.map(|_| ())
    }
}
