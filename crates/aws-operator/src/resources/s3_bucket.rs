//! The S3 bucket holding the cluster's cloud-config payloads.
//!
//! The bucket is named `<account id>-g8s-<cluster id>`. It is emptied and deleted when the
//! cluster is deleted.

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    cloud::CloudError,
    context::PassContext,
    crd::AwsCluster,
    error::{ExecutionFailedSnafu, Result},
    framework::{CrudResource, Patch},
    names,
};

pub const NAME: &str = "s3_bucket";

/// An empty name means the bucket does not exist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketState {
    pub name: String,
}

impl BucketState {
    pub fn exists(&self) -> bool {
        !self.name.is_empty()
    }
}

#[derive(Default)]
pub struct S3BucketResource;

async fn bucket_name(ctx: &PassContext, cluster: &AwsCluster) -> Result<String> {
    let account_id = ctx
        .guest()
        .sts
        .account_id()
        .await
        .context(ExecutionFailedSnafu {
            action: "look up the AWS account id",
        })?;

    Ok(names::bucket_name(&account_id, cluster.cluster_id()))
}

fn ignore_not_found<T: Default>(result: Result<T, CloudError>) -> Result<T, CloudError> {
    match result {
        Err(error) if error.is_not_found() => Ok(T::default()),
        result => result,
    }
}

#[async_trait]
impl CrudResource<AwsCluster> for S3BucketResource {
    type CreateChange = BucketState;
    type DeleteChange = BucketState;
    type State = BucketState;
    type UpdateChange = ();

    fn name(&self) -> &str {
        NAME
    }

    async fn get_current_state(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
    ) -> Result<BucketState> {
        let name = bucket_name(ctx, cluster).await?;

        match ctx.guest().s3.head_bucket(&name).await {
            Ok(()) => Ok(BucketState { name }),
            Err(error) if error.is_not_found() => {
                debug!(bucket.name = %name, "bucket does not exist");
                Ok(BucketState::default())
            }
            Err(error) => Err(error).context(ExecutionFailedSnafu {
                action: format!("look up bucket {name}"),
            }),
        }
    }

    async fn get_desired_state(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
    ) -> Result<BucketState> {
        Ok(BucketState {
            name: bucket_name(ctx, cluster).await?,
        })
    }

    async fn new_create_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        current: &BucketState,
        desired: &BucketState,
    ) -> Result<Patch<BucketState, (), BucketState>> {
        if current.exists() {
            return Ok(Patch::empty());
        }

        Ok(Patch::empty().with_create_change(desired.clone()))
    }

    async fn new_update_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        _current: &BucketState,
        _desired: &BucketState,
    ) -> Result<Patch<BucketState, (), BucketState>> {
        Ok(Patch::empty())
    }

    async fn new_delete_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        current: &BucketState,
        _desired: &BucketState,
    ) -> Result<Patch<BucketState, (), BucketState>> {
        if !current.exists() {
            return Ok(Patch::empty());
        }

        Ok(Patch::empty().with_delete_change(current.clone()))
    }

    async fn apply_create_change(
        &self,
        ctx: &PassContext,
        _cluster: &AwsCluster,
        change: &BucketState,
    ) -> Result<()> {
        info!(bucket.name = %change.name, "creating bucket");
        match ctx.guest().s3.create_bucket(&change.name).await {
            Ok(()) => info!(bucket.name = %change.name, "created bucket"),
            Err(error) if error.is_already_exists() => {
                debug!(bucket.name = %change.name, "bucket already exists");
            }
            Err(error) => {
                return Err(error).context(ExecutionFailedSnafu {
                    action: format!("create bucket {}", change.name),
                });
            }
        }

        Ok(())
    }

    async fn apply_update_change(&self, _: &PassContext, _: &AwsCluster, _: &()) -> Result<()> {
        Ok(())
    }

    /// Deletes the objects of the bucket, then the bucket itself.
    async fn apply_delete_change(
        &self,
        ctx: &PassContext,
        _cluster: &AwsCluster,
        change: &BucketState,
    ) -> Result<()> {
        let s3 = ctx.guest().s3.as_ref();
        let bucket = change.name.as_str();

        let keys = ignore_not_found(s3.list_objects(bucket).await).with_context(|_| {
            ExecutionFailedSnafu {
                action: format!("list objects of bucket {bucket}"),
            }
        })?;
        if !keys.is_empty() {
            info!(bucket.name = bucket, count = keys.len(), "deleting bucket objects");
            ignore_not_found(s3.delete_objects(bucket, &keys).await).with_context(|_| {
                ExecutionFailedSnafu {
                    action: format!("delete objects of bucket {bucket}"),
                }
            })?;
        }

        info!(bucket.name = bucket, "deleting bucket");
        match s3.delete_bucket(bucket).await {
            Ok(()) => info!(bucket.name = bucket, "deleted bucket"),
            Err(error) if error.is_not_found() => {
                debug!(bucket.name = bucket, "bucket already deleted");
            }
            Err(error) => {
                return Err(error).context(ExecutionFailedSnafu {
                    action: format!("delete bucket {bucket}"),
                });
            }
        }

        Ok(())
    }
}
