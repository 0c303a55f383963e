//! State scoped to a single reconciliation pass of one object.
//!
//! The [`PassContext`] is created by the resource set's [`InitContext`] before the first
//! resource runs and dropped after the last one finished. Resources read the clients and the
//! update flag from it and use it to cancel the remainder of their own work or of the whole
//! pass.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    cloud::{AwsClients, CloudError, HostClients},
    crd::AwsCluster,
    error::{ExecutionFailedSnafu, Result},
    framework::InitContext,
};

pub struct PassContext {
    updates_allowed: bool,
    guest: AwsClients,
    host: HostClients,
    pass_canceled: AtomicBool,
    resource_canceled: AtomicBool,
}

impl PassContext {
    pub fn new(updates_allowed: bool, guest: AwsClients, host: HostClients) -> Self {
        Self {
            updates_allowed,
            guest,
            host,
            pass_canceled: AtomicBool::new(false),
            resource_canceled: AtomicBool::new(false),
        }
    }

    /// Whether general updates of the guest cluster's infrastructure are allowed in this pass.
    /// Scaling is always allowed.
    pub fn updates_allowed(&self) -> bool {
        self.updates_allowed
    }

    /// Clients for the AWS account of the guest cluster.
    pub fn guest(&self) -> &AwsClients {
        &self.guest
    }

    /// Clients for the AWS account of the operator installation.
    pub fn host(&self) -> &HostClients {
        &self.host
    }

    /// Skips all remaining work of this pass. The next pass starts over.
    pub fn cancel_pass(&self) {
        self.pass_canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_pass_canceled(&self) -> bool {
        self.pass_canceled.load(Ordering::SeqCst)
    }

    /// Skips the remaining steps of the current resource. Later resources still run.
    pub fn cancel_resource(&self) {
        self.resource_canceled.store(true, Ordering::SeqCst);
    }

    /// True if either the current resource or the whole pass was canceled.
    pub fn is_resource_canceled(&self) -> bool {
        self.resource_canceled.load(Ordering::SeqCst) || self.is_pass_canceled()
    }

    pub(crate) fn reset_resource_cancellation(&self) {
        self.resource_canceled.store(false, Ordering::SeqCst);
    }
}

/// Builds the AWS clients of a guest cluster from its credentials.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn guest_clients(&self, cluster: &AwsCluster) -> Result<AwsClients, CloudError>;

    fn host_clients(&self) -> HostClients;
}

/// Seeds the [`PassContext`] of `AwsCluster` passes.
pub struct ClusterContextInit {
    updates_allowed: bool,
    client_factory: Arc<dyn ClientFactory>,
}

impl ClusterContextInit {
    pub fn new(updates_allowed: bool, client_factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            updates_allowed,
            client_factory,
        }
    }
}

#[async_trait]
impl InitContext<AwsCluster> for ClusterContextInit {
    async fn init(&self, cluster: &AwsCluster) -> Result<PassContext> {
        let guest = self
            .client_factory
            .guest_clients(cluster)
            .await
            .with_context(|_| ExecutionFailedSnafu {
                action: format!("create AWS clients for cluster {}", cluster.cluster_id()),
            })?;

        debug!(
            cluster.id = cluster.cluster_id(),
            updates_allowed = self.updates_allowed,
            "initialized pass context"
        );

        Ok(PassContext::new(
            self.updates_allowed,
            guest,
            self.client_factory.host_clients(),
        ))
    }
}
