//! Discovery, detachment and deletion of the EBS volumes belonging to a guest cluster.
//!
//! Every operation may be called repeatedly: volumes, attachments and instances that are
//! already gone are not an error.

use std::{collections::BTreeMap, sync::Arc};

use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::{
    cloud::{
        CloudError,
        ec2::{DetachVolumeInput, Ec2, Filter, VolumeAttachment},
    },
    error::{ExecutionFailedSnafu, Result},
    names,
    retry::RetryPolicy,
};

/// Selects a subset of the volumes owned by a cluster by their tags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VolumeFilter {
    /// The volume holding the etcd data of the cluster's master.
    Etcd { cluster_id: String },

    /// Volumes dynamically provisioned for a persistent volume.
    PersistentVolume,
}

impl VolumeFilter {
    pub fn etcd(cluster_id: impl Into<String>) -> Self {
        Self::Etcd {
            cluster_id: cluster_id.into(),
        }
    }

    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Etcd { cluster_id } => tags
                .get(names::NAME_TAG)
                .is_some_and(|name| *name == names::etcd_volume_name(cluster_id)),
            Self::PersistentVolume => tags.contains_key(names::PERSISTENT_VOLUME_TAG),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Volume {
    pub volume_id: String,
    pub attachments: Vec<VolumeAttachment>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetachOptions {
    /// Detaches even if the file system is busy.
    pub force: bool,

    /// Stops the instance the volume is attached to before detaching.
    pub shutdown: bool,

    /// Waits until the volume is available after detaching.
    pub wait: bool,
}

pub struct EbsService {
    ec2: Arc<dyn Ec2>,
    delete_policy: RetryPolicy,
}

impl EbsService {
    /// `delete_policy` bounds the retries of [`Self::delete_volume`].
    pub fn new(ec2: Arc<dyn Ec2>, delete_policy: RetryPolicy) -> Self {
        Self { ec2, delete_policy }
    }

    /// Lists the volumes owned by the cluster that match any of `filters`, or all of them if
    /// no filter is given.
    pub async fn list_volumes(
        &self,
        cluster_id: &str,
        filters: &[VolumeFilter],
    ) -> Result<Vec<Volume>> {
        let owned = Filter::tag(names::cluster_tag_key(cluster_id), names::CLUSTER_TAG_OWNED);
        let volumes = self
            .ec2
            .describe_volumes(&[owned])
            .await
            .with_context(|_| ExecutionFailedSnafu {
                action: format!("list volumes of cluster {cluster_id}"),
            })?;

        Ok(volumes
            .into_iter()
            .filter(|volume| filters.is_empty() || filters.iter().any(|f| f.matches(&volume.tags)))
            .map(|volume| Volume {
                volume_id: volume.volume_id,
                attachments: volume.attachments,
            })
            .collect())
    }

    pub async fn detach_volume(
        &self,
        volume_id: &str,
        attachment: &VolumeAttachment,
        options: DetachOptions,
    ) -> Result<()> {
        let instance_id = attachment.instance_id.as_str();

        if options.shutdown {
            info!(instance.id = instance_id, "stopping instance");
            ignore_not_found(self.ec2.stop_instance(instance_id, options.force).await)
                .with_context(|_| ExecutionFailedSnafu {
                    action: format!("stop instance {instance_id}"),
                })?;
            ignore_not_found(self.ec2.wait_until_instance_stopped(instance_id).await)
                .with_context(|_| ExecutionFailedSnafu {
                    action: format!("wait for instance {instance_id} to stop"),
                })?;
            info!(instance.id = instance_id, "stopped instance");
        }

        info!(
            volume.id = volume_id,
            instance.id = instance_id,
            force = options.force,
            "detaching volume"
        );
        let input = DetachVolumeInput {
            volume_id: volume_id.to_owned(),
            instance_id: instance_id.to_owned(),
            device: attachment.device.clone(),
            force: options.force,
        };
        match self.ec2.detach_volume(&input).await {
            Ok(()) => info!(volume.id = volume_id, "detached volume"),
            Err(CloudError::NotFound { .. } | CloudError::IncorrectState { .. }) => {
                debug!(volume.id = volume_id, "volume already detached");
            }
            Err(source) => {
                return Err(source).context(ExecutionFailedSnafu {
                    action: format!("detach volume {volume_id} from instance {instance_id}"),
                });
            }
        }

        if options.wait {
            ignore_not_found(self.ec2.wait_until_volume_available(volume_id).await)
                .with_context(|_| ExecutionFailedSnafu {
                    action: format!("wait for volume {volume_id} to become available"),
                })?;
        }

        Ok(())
    }

    /// Deletes the volume, retrying within the time budget of the delete policy.
    pub async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        let ec2 = self.ec2.as_ref();

        info!(volume.id = volume_id, "deleting volume");
        self.delete_policy
            .retry(&format!("delete volume {volume_id}"), || async move {
                ignore_not_found(ec2.delete_volume(volume_id).await)
            })
            .await
            .with_context(|_| ExecutionFailedSnafu {
                action: format!("delete volume {volume_id}"),
            })?;
        info!(volume.id = volume_id, "deleted volume");

        Ok(())
    }
}

fn ignore_not_found(result: Result<(), CloudError>) -> Result<(), CloudError> {
    match result {
        Err(error) if error.is_not_found() => Ok(()),
        result => result,
    }
}

/// Takes the etcd volume of a cluster out of service before its master is replaced.
///
/// Every attachment is first detached gracefully after stopping the owning instance, then
/// force-detached, then the volume is deleted. Failures are logged and do not stop the
/// sequence.
pub async fn retire_etcd_volumes(ebs: &EbsService, cluster_id: &str) {
    let volumes = match ebs
        .list_volumes(cluster_id, &[VolumeFilter::etcd(cluster_id)])
        .await
    {
        Ok(volumes) => volumes,
        Err(error) => {
            warn!(
                cluster.id = cluster_id,
                error = &error as &dyn std::error::Error,
                "failed to list etcd volumes, continuing"
            );
            return;
        }
    };

    let graceful = DetachOptions {
        force: false,
        shutdown: true,
        wait: true,
    };
    let forced = DetachOptions {
        force: true,
        shutdown: false,
        wait: true,
    };

    for volume in &volumes {
        for options in [graceful, forced] {
            for attachment in &volume.attachments {
                if let Err(error) = ebs
                    .detach_volume(&volume.volume_id, attachment, options)
                    .await
                {
                    warn!(
                        volume.id = %volume.volume_id,
                        instance.id = %attachment.instance_id,
                        force = options.force,
                        error = &error as &dyn std::error::Error,
                        "failed to detach volume, continuing"
                    );
                }
            }
        }

        if let Err(error) = ebs.delete_volume(&volume.volume_id).await {
            warn!(
                volume.id = %volume.volume_id,
                error = &error as &dyn std::error::Error,
                "failed to delete volume, continuing"
            );
        }
    }
}
