//! Removes the etcd and persistent volumes of a cluster that is being deleted.
//!
//! These volumes are not part of any stack, so deleting the stacks would leave them behind
//! and, while they are attached, block the deletion of the instances.

use async_trait::async_trait;
use tracing::info;

use crate::{
    context::PassContext,
    crd::AwsCluster,
    ebs::{DetachOptions, EbsService, VolumeFilter},
    error::Result,
    framework::Resource,
    retry::RetryPolicy,
};

pub const NAME: &str = "ebs_volume";

const FORCED_DETACH: DetachOptions = DetachOptions {
    force: true,
    shutdown: false,
    wait: true,
};

pub struct EbsVolumeResource {
    delete_policy: RetryPolicy,
}

impl EbsVolumeResource {
    /// `delete_policy` bounds the deletion of each volume.
    pub fn new(delete_policy: RetryPolicy) -> Self {
        Self { delete_policy }
    }
}

#[async_trait]
impl Resource<AwsCluster> for EbsVolumeResource {
    fn name(&self) -> &str {
        NAME
    }

    /// Volumes are created by the stack and by the cluster's storage provisioner.
    async fn ensure_created(&self, _ctx: &PassContext, _cluster: &AwsCluster) -> Result<()> {
        Ok(())
    }

    async fn ensure_deleted(&self, ctx: &PassContext, cluster: &AwsCluster) -> Result<()> {
        let cluster_id = cluster.cluster_id();
        let ebs = EbsService::new(ctx.guest().ec2.clone(), self.delete_policy.clone());

        let volumes = ebs
            .list_volumes(cluster_id, &[
                VolumeFilter::etcd(cluster_id),
                VolumeFilter::PersistentVolume,
            ])
            .await?;
        info!(
            cluster.id = cluster_id,
            count = volumes.len(),
            "deleting volumes of cluster"
        );

        for volume in &volumes {
            for attachment in &volume.attachments {
                ebs.detach_volume(&volume.volume_id, attachment, FORCED_DETACH)
                    .await?;
            }
            ebs.delete_volume(&volume.volume_id).await?;
        }

        info!(cluster.id = cluster_id, "deleted volumes of cluster");
        Ok(())
    }
}
