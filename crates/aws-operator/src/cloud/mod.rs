//! Interfaces of the AWS APIs the engine consumes.
//!
//! Every call is a blocking request/response exchange with one AWS service. The engine only
//! depends on the traits in this module; wiring them to an SDK happens outside of this crate.

use std::sync::Arc;

use snafu::Snafu;

pub mod autoscaling;
pub mod cloudformation;
pub mod ec2;
pub mod encrypter;
pub mod s3;
pub mod template;

pub use autoscaling::AutoScaling;
pub use cloudformation::CloudFormation;
pub use ec2::Ec2;
pub use encrypter::Encrypter;
pub use s3::S3;
pub use template::TemplateRenderer;

/// The conditions cloud API calls report.
///
/// Resources decide locally which of these are expected, e.g. [`CloudError::NotFound`] while
/// deleting something that is already gone.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum CloudError {
    #[snafu(display("{resource} does not exist"))]
    NotFound { resource: String },

    #[snafu(display("{resource} already exists"))]
    AlreadyExists { resource: String },

    #[snafu(display("{resource} is in an incorrect state: {message}"))]
    IncorrectState { resource: String, message: String },

    #[snafu(display("no updates are to be performed on {resource}"))]
    NoUpdatesToPerform { resource: String },

    #[snafu(display("request was throttled"))]
    Throttled,

    #[snafu(display("{service} API call failed: {message}"))]
    Api { service: String, message: String },
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Returns the id of the AWS account the credentials belong to.
#[async_trait::async_trait]
pub trait Sts: Send + Sync {
    async fn account_id(&self) -> Result<String, CloudError>;
}

/// Clients for the AWS account a guest cluster runs in.
#[derive(Clone)]
pub struct AwsClients {
    pub autoscaling: Arc<dyn AutoScaling>,
    pub cloudformation: Arc<dyn CloudFormation>,
    pub ec2: Arc<dyn Ec2>,
    pub encrypter: Arc<dyn Encrypter>,
    pub s3: Arc<dyn S3>,
    pub sts: Arc<dyn Sts>,
}

/// Clients for the AWS account the operator itself is installed in.
#[derive(Clone)]
pub struct HostClients {
    pub cloudformation: Arc<dyn CloudFormation>,
}
