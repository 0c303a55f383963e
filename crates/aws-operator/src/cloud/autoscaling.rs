use async_trait::async_trait;

use crate::cloud::CloudError;

/// Lifecycle state of an instance the Auto Scaling Group wants to terminate but which is held
/// back by a lifecycle hook.
pub const LIFECYCLE_STATE_TERMINATING_WAIT: &str = "Terminating:Wait";

#[async_trait]
pub trait AutoScaling: Send + Sync {
    async fn describe_auto_scaling_group_instances(
        &self,
        group_name: &str,
    ) -> Result<Vec<AutoScalingInstance>, CloudError>;

    /// Fails with [`CloudError::NotFound`] if no lifecycle action is pending for the instance,
    /// e.g. because it has already been completed.
    async fn complete_lifecycle_action(
        &self,
        input: &CompleteLifecycleActionInput,
    ) -> Result<(), CloudError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoScalingInstance {
    pub instance_id: String,
    pub lifecycle_state: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompleteLifecycleActionInput {
    pub auto_scaling_group_name: String,
    pub instance_id: String,
    pub lifecycle_hook_name: String,
    pub lifecycle_action_result: String,
}
