use std::sync::Arc;

use async_trait::async_trait;
use snafu::ensure;

use crate::{
    context::PassContext,
    error::{InvalidConfigSnafu, Result},
    framework::{
        CrudAdapter, CrudResource, ReconcileObject, Resource,
        middleware::{Measured, Retrying},
    },
    retry::RetryPolicy,
};

/// Decides whether a [`ResourceSet`] is responsible for an object.
pub type Handles<K> = Box<dyn Fn(&K) -> bool + Send + Sync>;

/// Claims exactly the objects whose version bundle version equals `version`.
pub fn handles_version<K: ReconcileObject>(version: impl Into<String>) -> Handles<K> {
    let version = version.into();
    Box::new(move |obj: &K| obj.version_bundle_version() == version)
}

/// Creates the [`PassContext`] of a reconciliation pass.
#[async_trait]
pub trait InitContext<K: ReconcileObject>: Send + Sync {
    async fn init(&self, obj: &K) -> Result<PassContext>;
}

/// An ordered list of resources together with the predicate claiming the objects they apply to.
pub struct ResourceSet<K: ReconcileObject> {
    handles: Handles<K>,
    init_ctx: Arc<dyn InitContext<K>>,
    resources: Vec<Box<dyn Resource<K>>>,
}

impl<K: ReconcileObject> ResourceSet<K> {
    pub fn new(
        handles: Handles<K>,
        init_ctx: Arc<dyn InitContext<K>>,
        resources: Vec<Box<dyn Resource<K>>>,
    ) -> Result<Self> {
        ensure!(!resources.is_empty(), InvalidConfigSnafu {
            reason: "a resource set needs at least one resource",
        });

        Ok(Self {
            handles,
            init_ctx,
            resources,
        })
    }

    pub fn handles(&self, obj: &K) -> bool {
        (self.handles)(obj)
    }

    pub fn init_ctx(&self) -> &dyn InitContext<K> {
        self.init_ctx.as_ref()
    }

    /// The resources in execution order.
    pub fn resources(&self) -> &[Box<dyn Resource<K>>] {
        &self.resources
    }
}

/// Assembles a [`ResourceSet`], wrapping every resource in retry and metrics middleware.
pub struct ResourceSetBuilder<K: ReconcileObject> {
    handles: Handles<K>,
    init_ctx: Arc<dyn InitContext<K>>,
    retry_policy: RetryPolicy,
    project: String,
    resources: Vec<Box<dyn Resource<K>>>,
}

impl<K: ReconcileObject> ResourceSetBuilder<K> {
    pub fn new(handles: Handles<K>, init_ctx: Arc<dyn InitContext<K>>) -> Self {
        Self {
            handles,
            init_ctx,
            retry_policy: RetryPolicy::default(),
            project: env!("CARGO_PKG_NAME").to_owned(),
            resources: Vec::new(),
        }
    }

    /// Applies to resources added after this call.
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// The project label of recorded metrics. Applies to resources added after this call.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Appends a resource implementing the CRUD protocol.
    pub fn crud<R>(mut self, resource: R) -> Self
    where
        R: CrudResource<K> + 'static,
    {
        let retrying = Retrying::new(resource, self.retry_policy.clone());
        let measured = Measured::new(retrying, self.project.clone());
        self.resources.push(Box::new(CrudAdapter::new(measured)));
        self
    }

    /// Appends a resource implementing [`Resource`] directly.
    pub fn resource<R>(mut self, resource: R) -> Self
    where
        R: Resource<K> + 'static,
    {
        let retrying = Retrying::new(resource, self.retry_policy.clone());
        let measured = Measured::new(retrying, self.project.clone());
        self.resources.push(Box::new(measured));
        self
    }

    pub fn build(self) -> Result<ResourceSet<K>> {
        ResourceSet::new(self.handles, self.init_ctx, self.resources)
    }
}
