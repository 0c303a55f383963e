//! The generic declarative resource pipeline.
//!
//! An object is routed by its version bundle version to exactly one [`ResourceSet`]. The set
//! seeds a [`PassContext`](crate::context::PassContext) and runs its resources strictly in
//! declared order. A resource either implements [`Resource`] directly or implements the
//! [`CrudResource`] protocol which [`CrudAdapter`] turns into a [`Resource`].
//!
//! Every resource added through a [`ResourceSetBuilder`] is wrapped in the retry and metrics
//! middleware, so resources never know they are retried or measured.

mod crud;
pub mod middleware;
mod reconciler;
mod resource;
mod resource_set;
mod router;

pub use crud::{CrudAdapter, CrudResource, Patch};
pub use reconciler::Reconciler;
pub use resource::Resource;
pub use resource_set::{Handles, InitContext, ResourceSet, ResourceSetBuilder, handles_version};
pub use router::Router;

/// An object the engine reconciles.
pub trait ReconcileObject: Send + Sync + 'static {
    /// The version string selecting the resource set handling this object.
    fn version_bundle_version(&self) -> &str;

    /// Whether the object is being finalized, in which case its resources are deleted.
    fn is_being_deleted(&self) -> bool;

    /// Identifies the object in log lines.
    fn object_key(&self) -> String;
}
