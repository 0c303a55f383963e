use std::{future::Future, time::Instant};

use async_trait::async_trait;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

use crate::{
    context::PassContext,
    error::Result,
    framework::{CrudResource, Patch, ReconcileObject, Resource},
};

const METER_NAME: &str = "aws-operator";

/// Records the duration and the failures of every call of the inner resource.
///
/// Measurements are labeled with the resource name, the operation and the project the resource
/// set belongs to. Results pass through unchanged.
pub struct Measured<R> {
    inner: R,
    project: String,
    duration: Histogram<f64>,
    errors: Counter<u64>,
}

impl<R> Measured<R> {
    pub fn new(inner: R, project: impl Into<String>) -> Self {
        let meter = global::meter(METER_NAME);

        Self {
            inner,
            project: project.into(),
            duration: meter
                .f64_histogram("resource_operation_duration")
                .with_description("Time spent in a single resource operation")
                .with_unit("s")
                .build(),
            errors: meter
                .u64_counter("resource_operation_errors")
                .with_description("Number of failed resource operations")
                .build(),
        }
    }

    async fn observe<T, F>(&self, resource: &str, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = call.await;
        let elapsed = start.elapsed();

        let mut attributes = vec![
            KeyValue::new("resource", resource.to_owned()),
            KeyValue::new("operation", operation),
            KeyValue::new("project", self.project.clone()),
        ];
        match &result {
            Ok(_) => attributes.push(KeyValue::new("outcome", "success")),
            Err(error) => {
                attributes.push(KeyValue::new("outcome", "failure"));
                self.errors.add(1, &[
                    KeyValue::new("resource", resource.to_owned()),
                    KeyValue::new("operation", operation),
                    KeyValue::new("project", self.project.clone()),
                    KeyValue::new("category", error.category()),
                ]);
            }
        }
        self.duration.record(elapsed.as_secs_f64(), &attributes);

        result
    }
}

#[async_trait]
impl<K, R> CrudResource<K> for Measured<R>
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
        self.observe(
            self.inner.name(),
            "get_current_state",
            self.inner.get_current_state(ctx, obj),
        )
        .await
    }

    async fn get_desired_state(&self, ctx: &PassContext, obj: &K) -> Result<Self::State> {
        self.observe(
            self.inner.name(),
            "get_desired_state",
            self.inner.get_desired_state(ctx, obj),
        )
        .await
    }

    async fn new_create_patch(
        &self,
        ctx: &PassContext,
        obj: &K,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::CreateChange, Self::UpdateChange, Self::DeleteChange>> {
        self.observe(
            self.inner.name(),
            "new_create_patch",
            self.inner.new_create_patch(ctx, obj, current, desired),
        )
        .await
    }

    async fn new_update_patch(
        &self,
        ctx: &PassContext,
        obj: &K,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::CreateChange, Self::UpdateChange, Self::DeleteChange>> {
        self.observe(
            self.inner.name(),
            "new_update_patch",
            self.inner.new_update_patch(ctx, obj, current, desired),
        )
        .await
    }

    async fn new_delete_patch(
        &self,
        ctx: &PassContext,
        obj: &K,
        current: &Self::State,
        desired: &Self::State,
    ) -> Result<Patch<Self::CreateChange, Self::UpdateChange, Self::DeleteChange>> {
        self.observe(
            self.inner.name(),
            "new_delete_patch",
            self.inner.new_delete_patch(ctx, obj, current, desired),
        )
        .await
    }

    async fn apply_create_change(
        &self,
        ctx: &PassContext,
        obj: &K,
        change: &Self::CreateChange,
    ) -> Result<()> {
        self.observe(
            self.inner.name(),
            "apply_create_change",
            self.inner.apply_create_change(ctx, obj, change),
        )
        .await
    }

    async fn apply_update_change(
        &self,
        ctx: &PassContext,
        obj: &K,
        change: &Self::UpdateChange,
    ) -> Result<()> {
        self.observe(
            self.inner.name(),
            "apply_update_change",
            self.inner.apply_update_change(ctx, obj, change),
        )
        .await
    }

    async fn apply_delete_change(
        &self,
        ctx: &PassContext,
        obj: &K,
        change: &Self::DeleteChange,
    ) -> Result<()> {
        self.observe(
            self.inner.name(),
            "apply_delete_change",
            self.inner.apply_delete_change(ctx, obj, change),
        )
        .await
    }
}

#[async_trait]
impl<K, R> Resource<K> for Measured<R>
where
    K: ReconcileObject,
    R: Resource<K>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, ctx: &PassContext, obj: &K) -> Result<()> {
        self.observe(
            self.inner.name(),
            "ensure_created",
            self.inner.ensure_created(ctx, obj),
        )
        .await
    }

    async fn ensure_deleted(&self, ctx: &PassContext, obj: &K) -> Result<()> {
        self.observe(
            self.inner.name(),
            "ensure_deleted",
            self.inner.ensure_deleted(ctx, obj),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crd::AwsCluster,
        error::{Error, ErrorKind},
        framework::{CrudAdapter, crud::tests::Counter},
        testing::{Fakes, test_cluster},
    };

    struct Failing;

    #[async_trait]
    impl Resource<AwsCluster> for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn ensure_created(&self, _: &PassContext, _: &AwsCluster) -> Result<()> {
            Err(Error::NotFound {
                what: "worker auto scaling group".into(),
            })
        }

        async fn ensure_deleted(&self, _: &PassContext, _: &AwsCluster) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn measured_crud_resource_behaves_like_the_inner_one() {
        let counter = Counter::new(0, 3);
        let log = counter.log.clone();
        let resource = CrudAdapter::new(Measured::new(counter, "aws-operator"));

        resource
            .ensure_created(&Fakes::default().context(true), &test_cluster())
            .await
            .unwrap();

        assert_eq!(Resource::<AwsCluster>::name(&resource), "counter");
        assert_eq!(*log.lock().unwrap(), ["current", "desired", "create 3"]);
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let resource = Measured::new(Failing, "aws-operator");
        let ctx = Fakes::default().context(true);

        let err = resource
            .ensure_created(&ctx, &test_cluster())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        resource.ensure_deleted(&ctx, &test_cluster()).await.unwrap();
    }
}
