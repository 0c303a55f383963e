//! The lifecycle of the CloudFormation stacks of a guest cluster.
//!
//! The guest main stack is created from the rendered template when it does not exist. An
//! existing stack is either scaled, when only the worker count changed, or updated, when
//! instance types or the version bundle changed and updates are allowed for the cluster. An
//! update replaces the master, so the etcd volume is taken out of service first. On deletion
//! the guest main stack and both host stacks are deleted.

use std::sync::Arc;

use async_trait::async_trait;
use snafu::{ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    cloud::{
        CloudError, CloudFormation,
        cloudformation::{CreateStackInput, Tag, UpdateStackInput, describe_outputs},
        template::{TemplateParams, TemplateRenderer},
    },
    context::PassContext,
    crd::AwsCluster,
    ebs::{EbsService, retire_etcd_volumes},
    error::{
        DeletionMustBeRetriedSnafu, ErrorKind, ExecutionFailedSnafu, RenderTemplateSnafu, Result,
    },
    framework::{CrudResource, Patch},
    names,
    retry::RetryPolicy,
};

mod state;

pub use state::{
    Decision, StackState, decide, master_instance_resource_name, should_scale, should_update,
};

pub const NAME: &str = "stack";

pub struct StackConfig {
    /// Cloud-config version of the version bundle, for masters and workers alike.
    pub cloud_config_version: String,
    pub renderer: Arc<dyn TemplateRenderer>,
    /// Bounds the deletion of each etcd volume before an update.
    pub volume_deletion_policy: RetryPolicy,
}

/// The stacks removed when the cluster is deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackDeletion {
    pub guest_main: String,
    pub host_main: String,
    pub host_setup: String,
}

impl StackDeletion {
    pub fn for_cluster(cluster_id: &str) -> Self {
        Self {
            guest_main: names::guest_main_stack_name(cluster_id),
            host_main: names::host_main_stack_name(cluster_id),
            host_setup: names::host_setup_stack_name(cluster_id),
        }
    }
}

pub struct StackResource {
    config: StackConfig,
}

impl StackResource {
    pub fn new(config: StackConfig) -> Self {
        Self { config }
    }

    fn render(&self, cluster: &AwsCluster, state: &StackState, account_id: &str) -> Result<String> {
        self.config
            .renderer
            .render_guest_main(TemplateParams {
                cluster,
                state,
                account_id,
            })
            .context(RenderTemplateSnafu {
                stack_name: &state.name,
            })
    }
}

async fn account_id(ctx: &PassContext) -> Result<String> {
    ctx.guest()
        .sts
        .account_id()
        .await
        .context(ExecutionFailedSnafu {
            action: "look up the AWS account id",
        })
}

async fn delete_stack(cf: &dyn CloudFormation, stack_name: &str) -> Result<(), CloudError> {
    info!(stack.name = stack_name, "deleting stack");
    match cf.delete_stack(stack_name).await {
        Ok(()) => {
            info!(stack.name = stack_name, "deleted stack");
            Ok(())
        }
        Err(error) if error.is_not_found() => {
            debug!(stack.name = stack_name, "stack already deleted");
            Ok(())
        }
        Err(error) => Err(error),
    }
}

#[async_trait]
impl CrudResource<AwsCluster> for StackResource {
    type CreateChange = StackState;
    type DeleteChange = StackDeletion;
    type State = StackState;
    type UpdateChange = StackState;

    fn name(&self) -> &str {
        NAME
    }

    async fn get_current_state(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
    ) -> Result<StackState> {
        let stack_name = names::guest_main_stack_name(cluster.cluster_id());

        match describe_outputs(ctx.guest().cloudformation.as_ref(), &stack_name).await {
            Ok(outputs) => match StackState::from_outputs(&outputs, stack_name.as_str()) {
                Ok(state) => Ok(state),
                // Failed or older stacks may lack outputs, they must still be deletable.
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    warn!(
                        stack.name = %stack_name,
                        error = &error as &dyn std::error::Error,
                        "stack outputs are incomplete, ignoring its outputs"
                    );
                    Ok(StackState {
                        name: stack_name,
                        ..StackState::default()
                    })
                }
                Err(error) => Err(error),
            },
            Err(error) if error.kind() == ErrorKind::StackNotFound => {
                debug!(stack.name = %stack_name, "stack does not exist");
                Ok(StackState::default())
            }
            Err(error) if error.kind() == ErrorKind::OutputsNotAccessible => {
                debug!(
                    stack.name = %stack_name,
                    error = &error as &dyn std::error::Error,
                    "stack is in transition, ignoring its outputs"
                );
                Ok(StackState {
                    name: stack_name,
                    ..StackState::default()
                })
            }
            Err(error) => Err(error),
        }
    }

    async fn get_desired_state(
        &self,
        _ctx: &PassContext,
        cluster: &AwsCluster,
    ) -> Result<StackState> {
        Ok(StackState::desired(cluster, &self.config.cloud_config_version))
    }

    async fn new_create_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        current: &StackState,
        desired: &StackState,
    ) -> Result<Patch<StackState, StackState, StackDeletion>> {
        if current.exists() {
            return Ok(Patch::empty());
        }

        Ok(Patch::empty().with_create_change(desired.clone()))
    }

    async fn new_update_patch(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
        current: &StackState,
        desired: &StackState,
    ) -> Result<Patch<StackState, StackState, StackDeletion>> {
        if !current.has_outputs() {
            debug!(
                stack.name = %current.name,
                "stack missing or in transition, not checking for updates"
            );
            return Ok(Patch::empty());
        }

        let decision = decide(current, desired, ctx.updates_allowed());
        if decision == Decision::None {
            if should_update(current, desired, true) {
                info!(
                    stack.name = %current.name,
                    "stack needs an update, but updates are not allowed for this cluster"
                );
            }
            return Ok(Patch::empty());
        }

        let account_id = account_id(ctx).await?;
        let template_body = self.render(cluster, desired, &account_id)?;

        let change = StackState {
            should_scale: decision == Decision::Scale,
            should_update: decision == Decision::Update,
            update_request: Some(UpdateStackInput {
                stack_name: desired.name.clone(),
                template_body,
            }),
            ..desired.clone()
        };
        debug!(stack.name = %desired.name, %decision, "stack needs to change");

        Ok(Patch::empty().with_update_change(change))
    }

    async fn new_delete_patch(
        &self,
        _ctx: &PassContext,
        cluster: &AwsCluster,
        _current: &StackState,
        _desired: &StackState,
    ) -> Result<Patch<StackState, StackState, StackDeletion>> {
        Ok(Patch::empty().with_delete_change(StackDeletion::for_cluster(cluster.cluster_id())))
    }

    async fn apply_create_change(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
        change: &StackState,
    ) -> Result<()> {
        let account_id = account_id(ctx).await?;
        let input = CreateStackInput {
            stack_name: change.name.clone(),
            template_body: self.render(cluster, change, &account_id)?,
            tags: vec![Tag {
                key: names::cluster_tag_key(cluster.cluster_id()),
                value: names::CLUSTER_TAG_OWNED.to_owned(),
            }],
        };

        info!(stack.name = %change.name, "creating stack");
        match ctx.guest().cloudformation.create_stack(&input).await {
            Ok(()) => info!(stack.name = %change.name, "requested stack creation"),
            Err(error) if error.is_already_exists() => {
                debug!(stack.name = %change.name, "stack already exists");
            }
            Err(error) => {
                return Err(error).context(ExecutionFailedSnafu {
                    action: format!("create stack {}", change.name),
                });
            }
        }

        Ok(())
    }

    async fn apply_update_change(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
        change: &StackState,
    ) -> Result<()> {
        let Some(request) = &change.update_request else {
            return Ok(());
        };

        if change.should_update {
            info!(stack.name = %request.stack_name, "updating stack");
            let ebs = EbsService::new(
                ctx.guest().ec2.clone(),
                self.config.volume_deletion_policy.clone(),
            );
            retire_etcd_volumes(&ebs, cluster.cluster_id()).await;
        } else if change.should_scale {
            info!(
                stack.name = %request.stack_name,
                worker.count = %change.worker_count,
                "scaling stack"
            );
        } else {
            return Ok(());
        }

        match ctx.guest().cloudformation.update_stack(request).await {
            Ok(()) => info!(stack.name = %request.stack_name, "requested stack update"),
            Err(CloudError::NoUpdatesToPerform { .. }) => {
                debug!(stack.name = %request.stack_name, "stack is already up to date");
            }
            Err(error) => {
                return Err(error).context(ExecutionFailedSnafu {
                    action: format!("update stack {}", request.stack_name),
                });
            }
        }

        Ok(())
    }

    async fn apply_delete_change(
        &self,
        ctx: &PassContext,
        _cluster: &AwsCluster,
        change: &StackDeletion,
    ) -> Result<()> {
        let guest = ctx.guest().cloudformation.as_ref();
        let host = ctx.host().cloudformation.as_ref();

        let mut failed = Vec::new();
        for (cf, stack_name) in [
            (guest, &change.guest_main),
            (host, &change.host_main),
            (host, &change.host_setup),
        ] {
            if let Err(error) = delete_stack(cf, stack_name).await {
                warn!(
                    stack.name = %stack_name,
                    error = &error as &dyn std::error::Error,
                    "failed to delete stack, continuing with the remaining stacks"
                );
                failed.push(stack_name.as_str());
            }
        }

        ensure!(failed.is_empty(), DeletionMustBeRetriedSnafu {
            what: format!("stacks {}", failed.join(", ")),
        });
        Ok(())
    }
}
