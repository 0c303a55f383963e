use async_trait::async_trait;

use crate::{
    context::PassContext,
    error::Result,
    framework::{CrudResource, Patch, ReconcileObject, Resource},
    retry::RetryPolicy,
};

/// Retries the mutating calls of the inner resource with bounded exponential backoff.
///
/// Only the single failing call is retried. Observing and diffing calls pass through.
pub struct Retrying<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R> Retrying<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<K, R> CrudResource<K> for Retrying<R>
where
    K: ReconcileObject,
    R: CrudResource<K>,
{
    type CreateChange = R::CreateChange;
    type DeleteChange = R::DeleteChange;
    type State = R::State;
    type UpdateChange = R::UpdateChange;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_current_state(&self, ctx: &PassContext, obj: &K) -> Result<Self::State> {
        self.inner.get_current_state(ctx, obj).await
    }

    async fn get_desired_state(&self, ctx: &PassContext, obj: &K) -> Result<Self::State> {
        self.inner.get_desired_state(ctx, obj).await
    }

    async fn new_create_patch(
        &self,
        ctx: &PassContext,
        obj: &K,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::CreateChange, Self::UpdateChange, Self::DeleteChange>> {
        self.inner.new_create_patch(ctx, obj, current, desired).await
    }

    async fn new_update_patch(
        &self,
        ctx: &PassContext,
        obj: &K,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::CreateChange, Self::UpdateChange, Self::DeleteChange>> {
        self.inner.new_update_patch(ctx, obj, current, desired).await
    }

    async fn new_delete_patch(
        &self,
        ctx: &PassContext,
        obj: &K,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::CreateChange, Self::UpdateChange, Self::DeleteChange>> {
        self.inner.new_delete_patch(ctx, obj, current, desired).await
    }

    async fn apply_create_change(
        &self,
        ctx: &PassContext,
        obj: &K,
        change: &Self::CreateChange,
    ) -> Result<()> {
        let inner = &self.inner;
        let operation = format!("{}/apply_create_change", inner.name());
        self.policy
            .retry(&operation, move || inner.apply_create_change(ctx, obj, change))
            .await
    }

    async fn apply_update_change(
        &self,
        ctx: &PassContext,
        obj: &K,
        change: &Self::UpdateChange,
    ) -> Result<()> {
        let inner = &self.inner;
        let operation = format!("{}/apply_update_change", inner.name());
        self.policy
            .retry(&operation, move || inner.apply_update_change(ctx, obj, change))
            .await
    }

    async fn apply_delete_change(
        &self,
        ctx: &PassContext,
        obj: &K,
        change: &Self::DeleteChange,
    ) -> Result<()> {
        let inner = &self.inner;
        let operation = format!("{}/apply_delete_change", inner.name());
        self.policy
            .retry(&operation, move || inner.apply_delete_change(ctx, obj, change))
            .await
    }
}

#[async_trait]
impl<K, R> Resource<K> for Retrying<R>
where
    K: ReconcileObject,
    R: Resource<K>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, ctx: &PassContext, obj: &K) -> Result<()> {
        let inner = &self.inner;
        let operation = format!("{}/ensure_created", inner.name());
        self.policy
            .retry(&operation, move || inner.ensure_created(ctx, obj))
            .await
    }

    async fn ensure_deleted(&self, ctx: &PassContext, obj: &K) -> Result<()> {
        let inner = &self.inner;
        let operation = format!("{}/ensure_deleted", inner.name());
        self.policy
            .retry(&operation, move || inner.ensure_deleted(ctx, obj))
            .await
    }
}
