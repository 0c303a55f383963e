use tracing::{debug, info, instrument};

use crate::{
    context::PassContext,
    error::Result,
    framework::{ReconcileObject, Resource, Router},
};

#[derive(Clone, Copy, Debug, strum::Display)]
#[strum(serialize_all = "snake_case")]
enum Direction {
    EnsureCreated,
    EnsureDeleted,
}

/// Runs the resources of the routed [`ResourceSet`](super::ResourceSet) for an object.
///
/// Resources run strictly in the order they were declared. The first failing resource stops
/// the pass and its error is returned, so that the next pass starts over from the beginning.
pub struct Reconciler<K: ReconcileObject> {
    router: Router<K>,
}

impl<K: ReconcileObject> std::fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl<K: ReconcileObject> Reconciler<K> {
    pub fn new(router: Router<K>) -> Self {
        Self { router }
    }

    /// Creates or deletes, depending on whether `obj` is being finalized.
    pub async fn reconcile(&self, obj: &K) -> Result<()> {
        if obj.is_being_deleted() {
            self.ensure_deleted(obj).await
        } else {
            self.ensure_created(obj).await
        }
    }

    pub async fn ensure_created(&self, obj: &K) -> Result<()> {
        self.run(obj, Direction::EnsureCreated).await
    }

    pub async fn ensure_deleted(&self, obj: &K) -> Result<()> {
        self.run(obj, Direction::EnsureDeleted).await
    }

    #[instrument(skip_all, fields(object = %obj.object_key(), %direction))]
    async fn run(&self, obj: &K, direction: Direction) -> Result<()> {
        let resource_set = self.router.resource_set(obj)?;
        let ctx = resource_set.init_ctx().init(obj).await?;

        for resource in resource_set.resources() {
            ctx.reset_resource_cancellation();
            run_resource(resource.as_ref(), &ctx, obj, direction).await?;

            if ctx.is_pass_canceled() {
                info!(
                    resource = resource.name(),
                    "pass canceled, skipping remaining resources"
                );
                break;
            }
        }

        debug!("pass finished");
        Ok(())
    }
}

async fn run_resource<K: ReconcileObject>(
    resource: &dyn Resource<K>,
    ctx: &PassContext,
    obj: &K,
    direction: Direction,
) -> Result<()> {
    debug!(resource = resource.name(), "running resource");

    let result = match direction {
        Direction::EnsureCreated => resource.ensure_created(ctx, obj).await,
        Direction::EnsureDeleted => resource.ensure_deleted(ctx, obj).await,
    };

    if let Err(error) = &result {
        info!(
            resource = resource.name(),
            error.category = error.category(),
            error = error as &dyn std::error::Error,
            "resource failed, stopping pass"
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        context::ClusterContextInit,
        crd::AwsCluster,
        error::{Error, ErrorKind},
        framework::{ResourceSet, ResourceSetBuilder, handles_version},
        testing::{Fakes, being_deleted, test_cluster, test_cluster_with_version},
    };

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        CancelPass,
        CancelResource,
    }

    struct Recording {
        name: &'static str,
        behavior: Behavior,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recording {
        fn act(&self, ctx: &PassContext, call: &str) -> Result<()> {
            assert!(
                !ctx.is_resource_canceled(),
                "resource cancellation must be reset"
            );
            self.log
                .lock()
                .unwrap()
                .push(format!("{} {call}", self.name));

            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => Err(Error::NotFound {
                    what: self.name.into(),
                }),
                Behavior::CancelPass => {
                    ctx.cancel_pass();
                    Ok(())
                }
                Behavior::CancelResource => {
                    ctx.cancel_resource();
                    Ok(())
                }
            }
        }
    }

    #[async_trait]
    impl Resource<AwsCluster> for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn ensure_created(&self, ctx: &PassContext, _: &AwsCluster) -> Result<()> {
            self.act(ctx, "created")
        }

        async fn ensure_deleted(&self, ctx: &PassContext, _: &AwsCluster) -> Result<()> {
            self.act(ctx, "deleted")
        }
    }

    fn reconciler(
        behaviors: &[(&'static str, Behavior)],
    ) -> (Reconciler<AwsCluster>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let init = Arc::new(ClusterContextInit::new(true, Arc::new(Fakes::default())));

        let mut builder = ResourceSetBuilder::new(handles_version("1.0.0"), init);
        for &(name, behavior) in behaviors {
            builder = builder.resource(Recording {
                name,
                behavior,
                log: log.clone(),
            });
        }
        let set: ResourceSet<AwsCluster> = builder.build().unwrap();

        (Reconciler::new(Router::new(vec![set]).unwrap()), log)
    }

    #[tokio::test]
    async fn runs_resources_in_declared_order() {
        let (reconciler, log) = reconciler(&[
            ("a", Behavior::Succeed),
            ("b", Behavior::Succeed),
            ("c", Behavior::Succeed),
        ]);

        reconciler.reconcile(&test_cluster()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["a created", "b created", "c created"]);
    }

    #[tokio::test]
    async fn deletion_uses_ensure_deleted() {
        let (reconciler, log) = reconciler(&[("a", Behavior::Succeed), ("b", Behavior::Succeed)]);

        reconciler
            .reconcile(&being_deleted(test_cluster()))
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), ["a deleted", "b deleted"]);
    }

    #[tokio::test]
    async fn first_failure_stops_the_pass() {
        let (reconciler, log) = reconciler(&[
            ("a", Behavior::Succeed),
            ("b", Behavior::Fail),
            ("c", Behavior::Succeed),
        ]);

        let err = reconciler.ensure_created(&test_cluster()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        // the failing resource is retried by the middleware
        assert_eq!(
            *log.lock().unwrap(),
            ["a created", "b created", "b created", "b created"]
        );
    }

    #[tokio::test]
    async fn canceled_pass_skips_remaining_resources() {
        let (reconciler, log) = reconciler(&[
            ("a", Behavior::CancelPass),
            ("b", Behavior::Succeed),
        ]);

        reconciler.ensure_created(&test_cluster()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["a created"]);
    }

    #[tokio::test]
    async fn canceled_resource_does_not_affect_later_resources() {
        let (reconciler, log) = reconciler(&[
            ("a", Behavior::CancelResource),
            ("b", Behavior::Succeed),
        ]);

        reconciler.ensure_created(&test_cluster()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["a created", "b created"]);
    }

    #[tokio::test]
    async fn unhandled_version_is_rejected() {
        let (reconciler, log) = reconciler(&[("a", Behavior::Succeed)]);

        let err = reconciler
            .reconcile(&test_cluster_with_version("9.9.9"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidVersion);
        assert!(log.lock().unwrap().is_empty());
    }
}
