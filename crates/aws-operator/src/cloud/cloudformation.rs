use std::collections::BTreeMap;

use async_trait::async_trait;
use snafu::{OptionExt, ResultExt};
use strum::{AsRefStr, Display, EnumString};

use crate::{
    cloud::CloudError,
    error::{self, ExecutionFailedSnafu, NotFoundSnafu, Result},
};

/// Stack output holding the name of the worker Auto Scaling Group.
pub const OUTPUT_WORKER_ASG_NAME: &str = "WorkerASGName";

#[async_trait]
pub trait CloudFormation: Send + Sync {
    /// Fails with [`CloudError::NotFound`] if no stack with the given name exists.
    async fn describe_stack(&self, stack_name: &str) -> Result<Stack, CloudError>;

    async fn create_stack(&self, input: &CreateStackInput) -> Result<(), CloudError>;

    async fn update_stack(&self, input: &UpdateStackInput) -> Result<(), CloudError>;

    async fn delete_stack(&self, stack_name: &str) -> Result<(), CloudError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
}

impl StackStatus {
    /// Whether the outputs of a stack in this status can be trusted.
    ///
    /// While a stack is being created or rolled back its outputs are missing or describe
    /// resources that are about to disappear.
    pub fn outputs_accessible(self) -> bool {
        !matches!(
            self,
            Self::CreateInProgress | Self::RollbackInProgress | Self::RollbackComplete
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stack {
    pub name: String,
    pub status: StackStatus,
    pub outputs: Vec<StackOutput>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateStackInput {
    pub stack_name: String,
    pub template_body: String,
    pub tags: Vec<Tag>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateStackInput {
    pub stack_name: String,
    pub template_body: String,
}

/// The outputs of a stack whose status allows reading them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackOutputs {
    stack_name: String,
    outputs: BTreeMap<String, String>,
}

impl StackOutputs {
    /// Returns the value of the output `key`, failing with [`error::Error::NotFound`] if the
    /// stack does not declare it.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.outputs
            .get(key)
            .map(String::as_str)
            .with_context(|| NotFoundSnafu {
                what: format!("output {key} of stack {}", self.stack_name),
            })
    }
}

/// Describes the stack `stack_name` and returns its outputs.
///
/// Fails with [`error::Error::StackNotFound`] if the stack does not exist and with
/// [`error::Error::OutputsNotAccessible`] while the stack is in a transitional status.
pub async fn describe_outputs(cf: &dyn CloudFormation, stack_name: &str) -> Result<StackOutputs> {
    let stack = match cf.describe_stack(stack_name).await {
        Ok(stack) => stack,
        Err(CloudError::NotFound { .. }) => {
            return error::StackNotFoundSnafu { stack_name }.fail();
        }
        Err(source) => {
            return Err(source).context(ExecutionFailedSnafu {
                action: format!("describe stack {stack_name}"),
            });
        }
    };

    if !stack.status.outputs_accessible() {
        return error::OutputsNotAccessibleSnafu {
            stack_name,
            status: stack.status.to_string(),
        }
        .fail();
    }

    Ok(StackOutputs {
        stack_name: stack.name,
        outputs: stack
            .outputs
            .into_iter()
            .map(|output| (output.key, output.value))
            .collect(),
    })
}
