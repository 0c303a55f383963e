//! Releases worker instances held back by the `NodeDrainer` lifecycle hook.
//!
//! The worker Auto Scaling Group parks an instance it terminates in `Terminating:Wait`. Every
//! parked instance found in a pass has its lifecycle action completed with `CONTINUE`.
//! Completion is not gated on the node having been drained in Kubernetes.

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    cloud::{
        autoscaling::{CompleteLifecycleActionInput, LIFECYCLE_STATE_TERMINATING_WAIT},
        cloudformation::{OUTPUT_WORKER_ASG_NAME, describe_outputs},
    },
    context::PassContext,
    crd::AwsCluster,
    error::{ErrorKind, ExecutionFailedSnafu, Result},
    framework::{CrudResource, Patch},
    names,
};

pub const NAME: &str = "drainer";

pub const LIFECYCLE_HOOK_NAME: &str = "NodeDrainer";
pub const LIFECYCLE_ACTION_CONTINUE: &str = "CONTINUE";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleHookInstance {
    pub auto_scaling_group_name: String,
    pub instance_id: String,
    pub hook_name: String,
    pub action_result: String,
}

#[derive(Default)]
pub struct DrainerResource;

impl DrainerResource {
    /// Finds the worker Auto Scaling Group, or cancels the pass if the stack cannot tell yet.
    async fn worker_group_name(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
    ) -> Result<Option<String>> {
        let stack_name = names::guest_main_stack_name(cluster.cluster_id());
        let cf = ctx.guest().cloudformation.as_ref();

        let outputs = match describe_outputs(cf, &stack_name).await {
            Ok(outputs) => outputs,
            Err(error)
                if matches!(
                    error.kind(),
                    ErrorKind::StackNotFound | ErrorKind::OutputsNotAccessible
                ) =>
            {
                info!(
                    stack.name = %stack_name,
                    error = &error as &dyn std::error::Error,
                    "worker group unknown yet, canceling pass"
                );
                ctx.cancel_pass();
                return Ok(None);
            }
            Err(error) => return Err(error),
        };

        match outputs.get(OUTPUT_WORKER_ASG_NAME) {
            Ok(group_name) => Ok(Some(group_name.to_owned())),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                info!(
                    stack.name = %stack_name,
                    "stack has no {OUTPUT_WORKER_ASG_NAME} output, canceling pass"
                );
                ctx.cancel_pass();
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl CrudResource<AwsCluster> for DrainerResource {
    type CreateChange = ();
    type DeleteChange = ();
    type State = Vec<LifecycleHookInstance>;
    type UpdateChange = Vec<LifecycleHookInstance>;

    fn name(&self) -> &str {
        NAME
    }

    /// The instances waiting for their lifecycle action to be completed.
    async fn get_current_state(
        &self,
        ctx: &PassContext,
        cluster: &AwsCluster,
    ) -> Result<Vec<LifecycleHookInstance>> {
        let Some(group_name) = self.worker_group_name(ctx, cluster).await? else {
            return Ok(Vec::new());
        };

        let instances = ctx
            .guest()
            .autoscaling
            .describe_auto_scaling_group_instances(&group_name)
            .await
            .with_context(|_| ExecutionFailedSnafu {
                action: format!("describe instances of auto scaling group {group_name}"),
            })?;

        let waiting: Vec<_> = instances
            .into_iter()
            .filter(|instance| instance.lifecycle_state == LIFECYCLE_STATE_TERMINATING_WAIT)
            .map(|instance| LifecycleHookInstance {
                auto_scaling_group_name: group_name.clone(),
                instance_id: instance.instance_id,
                hook_name: LIFECYCLE_HOOK_NAME.to_owned(),
                action_result: LIFECYCLE_ACTION_CONTINUE.to_owned(),
            })
            .collect();
        debug!(
            auto_scaling_group = %group_name,
            count = waiting.len(),
            "found instances waiting for termination"
        );

        Ok(waiting)
    }

    /// No instance should be waiting.
    async fn get_desired_state(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
    ) -> Result<Vec<LifecycleHookInstance>> {
        Ok(Vec::new())
    }

    async fn new_create_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        _current: &Vec<LifecycleHookInstance>,
        _desired: &Vec<LifecycleHookInstance>,
    ) -> Result<Patch<(), Vec<LifecycleHookInstance>, ()>> {
        Ok(Patch::empty())
    }

    async fn new_update_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        current: &Vec<LifecycleHookInstance>,
        _desired: &Vec<LifecycleHookInstance>,
    ) -> Result<Patch<(), Vec<LifecycleHookInstance>, ()>> {
        if current.is_empty() {
            return Ok(Patch::empty());
        }

        Ok(Patch::empty().with_update_change(current.clone()))
    }

    async fn new_delete_patch(
        &self,
        _ctx: &PassContext,
        _cluster: &AwsCluster,
        _current: &Vec<LifecycleHookInstance>,
        _desired: &Vec<LifecycleHookInstance>,
    ) -> Result<Patch<(), Vec<LifecycleHookInstance>, ()>> {
        Ok(Patch::empty())
    }

    async fn apply_create_change(&self, _: &PassContext, _: &AwsCluster, _: &()) -> Result<()> {
        Ok(())
    }

    async fn apply_update_change(
        &self,
        ctx: &PassContext,
        _cluster: &AwsCluster,
        change: &Vec<LifecycleHookInstance>,
    ) -> Result<()> {
        for instance in change {
            info!(
                instance.id = %instance.instance_id,
                "completing lifecycle action"
            );
            let input = CompleteLifecycleActionInput {
                auto_scaling_group_name: instance.auto_scaling_group_name.clone(),
                instance_id: instance.instance_id.clone(),
                lifecycle_hook_name: instance.hook_name.clone(),
                lifecycle_action_result: instance.action_result.clone(),
            };

            match ctx.guest().autoscaling.complete_lifecycle_action(&input).await {
                Ok(()) => info!(instance.id = %instance.instance_id, "completed lifecycle action"),
                Err(error) if error.is_not_found() => {
                    debug!(
                        instance.id = %instance.instance_id,
                        "lifecycle action already completed"
                    );
                }
                Err(error) => {
                    return Err(error).context(ExecutionFailedSnafu {
                        action: format!(
                            "complete lifecycle action of instance {}",
                            instance.instance_id
                        ),
                    });
                }
            }
        }

        Ok(())
    }

    async fn apply_delete_change(&self, _: &PassContext, _: &AwsCluster, _: &()) -> Result<()> {
        Ok(())
    }
}
