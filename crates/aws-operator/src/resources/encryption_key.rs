//! The key the cluster's secrets are encrypted with.
//!
//! The key is created when the cluster is created and deleted when it is deleted. It is never
//! rotated.

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    cloud::encrypter::EncryptionKeyState,
    context::PassContext,
    crd::AwsCluster,
    error::{ExecutionFailedSnafu, Result},
    framework::{CrudResource, Patch},
};

pub const NAME: &str = "encryption_key";

#[derive(Default)]
pub struct EncryptionKeyResource;

#[async_trait]
impl CrudResource<AwsCluster> for EncryptionKeyResource {
    type CreateChange = EncryptionKeyState;
    type DeleteChange = EncryptionKeyState;
    type State = EncryptionKeyState;
    type UpdateChange = ();

    fn name(&self) -> &str {
        NAME
    }

    async fn get_current_state(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
    ) -> Result<EncryptionKeyState> {
        ctx.guest()
            .encrypter
            .current_state(cluster.cluster_id())
            .await
            .with_context(|_| ExecutionFailedSnafu {
                action: format!("look up encryption key of cluster {}", cluster.cluster_id()),
            })
    }

    async fn get_desired_state(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
    ) -> Result<EncryptionKeyState> {
        ctx.guest()
            .encrypter
            .desired_state(cluster.cluster_id())
            .await
            .with_context(|_| ExecutionFailedSnafu {
                action: format!("compute encryption key of cluster {}", cluster.cluster_id()),
            })
    }

    async fn new_create_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        current: &EncryptionKeyState,
        desired: &EncryptionKeyState,
    ) -> Result<Patch<EncryptionKeyState, (), EncryptionKeyState>> {
        if !current.is_empty() {
            return Ok(Patch::empty());
        }

        Ok(Patch::empty().with_create_change(desired.clone()))
    }

    async fn new_update_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        _current: &EncryptionKeyState,
        _desired: &EncryptionKeyState,
    ) -> Result<Patch<EncryptionKeyState, (), EncryptionKeyState>> {
        Ok(Patch::empty())
    }

    async fn new_delete_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        current: &EncryptionKeyState,
        _desired: &EncryptionKeyState,
    ) -> Result<Patch<EncryptionKeyState, (), EncryptionKeyState>> {
        if current.is_empty() {
            return Ok(Patch::empty());
        }

        Ok(Patch::empty().with_delete_change(current.clone()))
    }

    async fn apply_create_change(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
        change: &EncryptionKeyState,
    ) -> Result<()> {
        info!(key.name = %change.key_name, "creating encryption key");
        match ctx.guest().encrypter.create_key(cluster.cluster_id()).await {
            Ok(()) => info!(key.name = %change.key_name, "created encryption key"),
            Err(error) if error.is_already_exists() => {
                debug!(key.name = %change.key_name, "encryption key already exists");
            }
            Err(error) => {
                return Err(error).context(ExecutionFailedSnafu {
                    action: format!("create encryption key {}", change.key_name),
                });
            }
        }

        Ok(())
    }

    async fn apply_update_change(&self, _: &PassContext, _: &AwsCluster, _: &()) -> Result<()> {
        Ok(())
    }

    async fn apply_delete_change(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
        change: &EncryptionKeyState,
    ) -> Result<()> {
        info!(key.name = %change.key_name, "deleting encryption key");
        match ctx.guest().encrypter.delete_key(cluster.cluster_id()).await {
            Ok(()) => info!(key.name = %change.key_name, "deleted encryption key"),
            Err(error) if error.is_not_found() => {
                debug!(key.name = %change.key_name, "encryption key already deleted");
            }
            Err(error) => {
                return Err(error).context(ExecutionFailedSnafu {
                    action: format!("delete encryption key {}", change.key_name),
                });
            }
        }

        Ok(())
    }
}
