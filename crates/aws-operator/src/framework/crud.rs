use std::fmt::Debug;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    context::PassContext,
    error::Result,
    framework::{ReconcileObject, Resource},
};

/// Holds at most one change of each kind. An empty patch means the resource is converged.
#[derive(Debug)]
pub struct Patch<C, U, D> {
    create: Option<C>,
    update: Option<U>,
    delete: Option<D>,
}

impl<C, U, D> Default for Patch<C, U, D> {
    fn default() -> Self {
        Self {
            create: None,
            update: None,
            delete: None,
        }
    }
}

impl<C, U, D> Patch<C, U, D> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_create_change(mut self, change: C) -> Self {
        self.create = Some(change);
        self
    }

    pub fn with_update_change(mut self, change: U) -> Self {
        self.update = Some(change);
        self
    }

    pub fn with_delete_change(mut self, change: D) -> Self {
        self.delete = Some(change);
        self
    }

    pub fn create_change(&self) -> Option<&C> {
        self.create.as_ref()
    }

    pub fn update_change(&self) -> Option<&U> {
        self.update.as_ref()
    }

    pub fn delete_change(&self) -> Option<&D> {
        self.delete.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_none() && self.update.is_none() && self.delete.is_none()
    }
}

/// The current/desired/patch/apply protocol.
///
/// Observing ([`get_current_state`](Self::get_current_state)) and diffing
/// (`new_*_patch`) are kept apart from mutating (`apply_*_change`), so resources with very
/// different cloud APIs share one reconciliation skeleton, see [`CrudAdapter`].
#[async_trait]
pub trait CrudResource<K: ReconcileObject>: Send + Sync {
    type State: Debug + Send + Sync;
    type CreateChange: Debug + Send + Sync;
    type UpdateChange: Debug + Send + Sync;
    type DeleteChange: Debug + Send + Sync;

    fn name(&self) -> &str;

    /// Observes the live state. A resource that does not exist yet yields an empty state,
    /// never an error.
    async fn get_current_state(&self, ctx: &PassContext, obj: &K) -> Result<Self::State>;

    /// Computes the target state from the object.
    async fn get_desired_state(&self, ctx: &PassContext, obj: &K) -> Result<Self::State>;

    async fn new_create_patch(
        &self,
        ctx: &PassContext,
        obj: &K,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::CreateChange, Self::UpdateChange, Self::DeleteChange>>;

    async fn new_update_patch(
        &self,
        ctx: &PassContext,
        obj: &K,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::CreateChange, Self::UpdateChange, Self::DeleteChange>>;

    /// Only used while the object is being finalized.
    async fn new_delete_patch(
        &self,
        ctx: &PassContext,
        obj: &K,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::CreateChange, Self::UpdateChange, Self::DeleteChange>>;

    async fn apply_create_change(
        &self,
        ctx: &PassContext,
        obj: &K,
        change: &Self::CreateChange,
    ) -> Result<()>;

    async fn apply_update_change(
        &self,
        ctx: &PassContext,
        obj: &K,
        change: &Self::UpdateChange,
    ) -> Result<()>;

    async fn apply_delete_change(
        &self,
        ctx: &PassContext,
        obj: &K,
        change: &Self::DeleteChange,
    ) -> Result<()>;
}

/// Sequences the calls of a [`CrudResource`] into [`Resource::ensure_created`] and
/// [`Resource::ensure_deleted`].
///
/// Between every two steps the adapter checks whether the resource or the pass has been
/// canceled and, if so, returns successfully without running the remaining steps.
pub struct CrudAdapter<R> {
    inner: R,
}

impl<R> CrudAdapter<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    #[allow(clippy::type_complexity)]
    async fn states<K>(
        &self,
        ctx: &PassContext,
        obj: &K,
    ) -> Result<Option<(<R as CrudResource<K>>::State, <R as CrudResource<K>>::State)>>
    where
        K: ReconcileObject,
        R: CrudResource<K>,
    {
        let current = self.inner.get_current_state(ctx, obj).await?;
        if self.canceled::<K>(ctx, "computing current state") {
            return Ok(None);
        }

        let desired = self.inner.get_desired_state(ctx, obj).await?;
        if self.canceled::<K>(ctx, "computing desired state") {
            return Ok(None);
        }

        Ok(Some((current, desired)))
    }

    async fn apply_patch<K>(
        &self,
        ctx: &PassContext,
        obj: &K,
        patch: &Patch<
            <R as CrudResource<K>>::CreateChange,
            <R as CrudResource<K>>::UpdateChange,
            <R as CrudResource<K>>::DeleteChange,
        >,
    ) -> Result<()>
    where
        K: ReconcileObject,
        R: CrudResource<K>,
    {
        if let Some(change) = patch.create_change() {
            self.inner.apply_create_change(ctx, obj, change).await?;
            if self.canceled::<K>(ctx, "applying create change") {
                return Ok(());
            }
        }

        if let Some(change) = patch.delete_change() {
            self.inner.apply_delete_change(ctx, obj, change).await?;
            if self.canceled::<K>(ctx, "applying delete change") {
                return Ok(());
            }
        }

        if let Some(change) = patch.update_change() {
            self.inner.apply_update_change(ctx, obj, change).await?;
        }

        Ok(())
    }

    fn canceled<K>(&self, ctx: &PassContext, step: &str) -> bool
    where
        K: ReconcileObject,
        R: CrudResource<K>,
    {
        let canceled = ctx.is_resource_canceled();
        if canceled {
            debug!(
                resource = self.inner.name(),
                step, "resource canceled, skipping remaining steps"
            );
        }
        canceled
    }
}

#[async_trait]
impl<K, R> Resource<K> for CrudAdapter<R>
where
    K: ReconcileObject,
    R: CrudResource<K>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, ctx: &PassContext, obj: &K) -> Result<()> {
        let Some((current, desired)) = self.states(ctx, obj).await? else {
            return Ok(());
        };

        let patch = self
            .inner
            .new_create_patch(ctx, obj, &current, &desired)
            .await?;
        self.apply_patch(ctx, obj, &patch).await?;
        if self.canceled::<K>(ctx, "create") {
            return Ok(());
        }

        let patch = self
            .inner
            .new_update_patch(ctx, obj, &current, &desired)
            .await?;
        self.apply_patch(ctx, obj, &patch).await
    }

    async fn ensure_deleted(&self, ctx: &PassContext, obj: &K) -> Result<()> {
        let Some((current, desired)) = self.states(ctx, obj).await? else {
            return Ok(());
        };

        let patch = self
            .inner
            .new_delete_patch(ctx, obj, &current, &desired)
            .await?;
        self.apply_patch(ctx, obj, &patch).await
    }
}
