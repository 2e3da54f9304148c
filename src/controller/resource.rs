//! The resource contract
//!
//! Every pipeline unit implements [`Resource`]: converge on creation and on
//! deletion. Resources that manage one external object with a comparable
//! state implement [`CrudResource`] instead and are adapted by [`Crud`],
//! which computes desired and current state, builds a [`Patch`] and applies
//! at most one of its changes.

use std::fmt::Debug;

use async_trait::async_trait;
use tracing::{debug, info};

use super::context::ControllerContext;
use crate::crd::AWSConfig;
use crate::error::Result;

#[async_trait]
pub trait Resource: Send + Sync {
    fn name(&self) -> &str;

    async fn ensure_created(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()>;

    async fn ensure_deleted(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()>;
}

/// State compared by the patch builders.
///
/// The zero value (`Default`) means absent. Two non-empty states with
/// different identities describe different external objects.
pub trait ResourceState: Clone + Debug + Default + PartialEq + Send + Sync {
    fn is_empty(&self) -> bool;

    fn identity(&self) -> &str;
}

/// The changes needed to converge one resource. At most one is applied per
/// pass.
#[derive(Clone, Debug, PartialEq)]
pub struct Patch<S> {
    pub create: Option<S>,
    pub update: Option<S>,
    pub delete: Option<S>,
}

impl<S> Default for Patch<S> {
    fn default() -> Self {
        Self {
            create: None,
            update: None,
            delete: None,
        }
    }
}

impl<S: ResourceState> Patch<S> {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Patch converging `current` towards a present `desired`.
    ///
    /// An identity change carries both a delete of the old object and a
    /// create of the new one; the adapter applies the delete first and
    /// leaves the create to a later pass that observes the old one gone.
    pub fn for_update(current: &S, desired: &S) -> Self {
        if desired.is_empty() {
            return Self::empty();
        }
        if current.is_empty() {
            return Self {
                create: Some(desired.clone()),
                ..Self::empty()
            };
        }
        if current.identity() != desired.identity() {
            return Self {
                create: Some(desired.clone()),
                update: None,
                delete: Some(current.clone()),
            };
        }
        if current == desired {
            return Self::empty();
        }
        Self {
            update: Some(desired.clone()),
            ..Self::empty()
        }
    }

    /// Patch removing `current`. The desired state is always the zero value
    /// here, so the full current state becomes the delete change.
    pub fn for_delete(current: &S) -> Self {
        if current.is_empty() {
            return Self::empty();
        }
        Self {
            delete: Some(current.clone()),
            ..Self::empty()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_none() && self.update.is_none() && self.delete.is_none()
    }
}

/// A resource expressed as current/desired state plus appliers.
#[async_trait]
pub trait CrudResource: Send + Sync {
    type State: ResourceState;

    fn name(&self) -> &str;

    /// Observe the external object. Absence is the zero state, never an error.
    async fn current_state(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
    ) -> Result<Self::State>;

    /// Derive the wanted state from the AWSConfig and the context status.
    /// Performs no I/O.
    fn desired_state(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<Self::State>;

    fn update_patch(&self, current: &Self::State, desired: &Self::State) -> Patch<Self::State> {
        Patch::for_update(current, desired)
    }

    fn delete_patch(&self, current: &Self::State) -> Patch<Self::State> {
        Patch::for_delete(current)
    }

    async fn apply_create_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &Self::State,
    ) -> Result<()>;

    async fn apply_update_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &Self::State,
    ) -> Result<()>;

    async fn apply_delete_change(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        change: &Self::State,
    ) -> Result<()>;
}

/// Adapts a [`CrudResource`] into a [`Resource`].
pub struct Crud<R> {
    inner: R,
}

impl<R: CrudResource> Crud<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn apply(
        &self,
        obj: &AWSConfig,
        ctx: &mut ControllerContext,
        patch: Patch<R::State>,
    ) -> Result<()> {
        let name = self.inner.name();
        if let Some(change) = patch.delete {
            if patch.create.is_some() {
                info!(
                    resource = name,
                    old = change.identity(),
                    "Identity changed, deleting old object before creating the new one"
                );
            }
            return self.inner.apply_delete_change(obj, ctx, &change).await;
        }
        if let Some(change) = patch.create {
            return self.inner.apply_create_change(obj, ctx, &change).await;
        }
        if let Some(change) = patch.update {
            return self.inner.apply_update_change(obj, ctx, &change).await;
        }
        debug!(resource = name, "No changes to apply");
        Ok(())
    }
}

#[async_trait]
impl<R: CrudResource> Resource for Crud<R> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        let desired = self.inner.desired_state(obj, ctx)?;
        if ctx.is_cancelled() {
            return Ok(());
        }
        let current = self.inner.current_state(obj, ctx).await?;
        if ctx.is_cancelled() {
            return Ok(());
        }
        let patch = self.inner.update_patch(&current, &desired);
        self.apply(obj, ctx, patch).await
    }

    async fn ensure_deleted(&self, obj: &AWSConfig, ctx: &mut ControllerContext) -> Result<()> {
        let current = self.inner.current_state(obj, ctx).await?;
        if ctx.is_cancelled() {
            return Ok(());
        }
        let patch = self.inner.delete_patch(&current);
        self.apply(obj, ctx, patch).await
    }
}
