use crate::{crd::AwsCluster, error::BoxedError, resources::stack::StackState};

/// Everything a guest main stack template is rendered from.
#[derive(Clone, Copy, Debug)]
pub struct TemplateParams<'a> {
    pub cluster: &'a AwsCluster,
    pub state: &'a StackState,
    pub account_id: &'a str,
}

/// Renders CloudFormation template bodies.
pub trait TemplateRenderer: Send + Sync {
    fn render_guest_main(&self, params: TemplateParams<'_>) -> Result<String, BoxedError>;
}
