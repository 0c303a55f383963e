//! Reconciliation engine converging [`AwsCluster`](crd::AwsCluster) objects to AWS
//! infrastructure: a CloudFormation stack per guest cluster, its EBS volumes, its bucket and
//! its encryption key.
//!
//! The engine is invoked once per reconciliation pass for every tracked object. The
//! [`framework`] module routes the object to the resource set registered for its version
//! bundle version and drives every resource of that set through the current/desired/patch/apply
//! protocol. The domain resources live in [`resources`].

pub mod cli;
pub mod cloud;
pub mod config;
pub mod context;
pub mod crd;
pub mod duration;
pub mod ebs;
pub mod error;
pub mod framework;
pub mod logging;
pub mod names;
pub mod operator;
pub mod resources;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

// External re-exports
pub use k8s_openapi;
pub use kube;
