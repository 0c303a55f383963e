//! Assembles the [`Reconciler`] of `AwsCluster` objects from the operator config.
//!
//! One resource set is registered per configured version bundle. Every set runs the same
//! resources in this order:
//!
//! 1. `encryption_key`
//! 2. `s3_bucket`
//! 3. `ebs_volume`
//! 4. `stack`
//! 5. `drainer`

use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tracing::info;

use crate::{
    cli::{self, RunArguments},
    cloud::TemplateRenderer,
    config::{OperatorConfig, VersionBundle},
    context::{ClientFactory, ClusterContextInit},
    crd::AwsCluster,
    error::{self, Result},
    framework::{InitContext, Reconciler, ResourceSet, ResourceSetBuilder, Router, handles_version},
    logging,
    resources::{
        drainer::DrainerResource,
        ebs_volume::EbsVolumeResource,
        encryption_key::EncryptionKeyResource,
        s3_bucket::S3BucketResource,
        stack::{StackConfig, StackResource},
    },
};

pub const APP_NAME: &str = "aws-operator";

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "AWS_OPERATOR_LOG";

#[derive(Debug, Snafu)]
pub enum StartError {
    #[snafu(display("failed to initialize logging"))]
    InitLogging { source: logging::Error },

    #[snafu(display("failed to load configuration"))]
    LoadConfig { source: cli::Error },

    #[snafu(display("failed to build reconciler"))]
    BuildReconciler { source: error::Error },
}

/// The collaborators the operator does not implement itself.
#[derive(Clone)]
pub struct OperatorDependencies {
    pub client_factory: Arc<dyn ClientFactory>,
    pub template_renderer: Arc<dyn TemplateRenderer>,
}

pub fn new_reconciler(
    config: &OperatorConfig,
    dependencies: OperatorDependencies,
) -> Result<Reconciler<AwsCluster>> {
    let init_ctx: Arc<dyn InitContext<AwsCluster>> = Arc::new(ClusterContextInit::new(
        config.guest_update_enabled,
        dependencies.client_factory.clone(),
    ));

    let resource_sets = config
        .version_bundles
        .iter()
        .map(|bundle| new_resource_set(config, bundle, &dependencies, init_ctx.clone()))
        .collect::<Result<Vec<_>>>()?;

    info!(
        installation = %config.installation_name,
        version_bundles = resource_sets.len(),
        guest_update_enabled = config.guest_update_enabled,
        "created reconciler"
    );

    Ok(Reconciler::new(Router::new(resource_sets)?))
}

/// Everything the `run` command does before handing objects to the reconciler: sets up
/// logging, then loads the config and builds the reconciler from it.
pub fn start(
    args: &RunArguments,
    dependencies: OperatorDependencies,
) -> Result<Reconciler<AwsCluster>, StartError> {
    logging::initialize_logging(LOG_ENV, APP_NAME).context(InitLoggingSnafu)?;

    let config = args.load().context(LoadConfigSnafu)?;
    new_reconciler(&config, dependencies).context(BuildReconcilerSnafu)
}

fn new_resource_set(
    config: &OperatorConfig,
    bundle: &VersionBundle,
    dependencies: &OperatorDependencies,
    init_ctx: Arc<dyn InitContext<AwsCluster>>,
) -> Result<ResourceSet<AwsCluster>> {
    let stack = StackResource::new(StackConfig {
        cloud_config_version: bundle.cloud_config_version.clone(),
        renderer: dependencies.template_renderer.clone(),
        volume_deletion_policy: config.volume_deletion_policy(),
    });

    ResourceSetBuilder::new(handles_version(&bundle.version), init_ctx)
        .retry_policy(config.retry.clone())
        .project(&config.installation_name)
        .crud(EncryptionKeyResource)
        .crud(S3BucketResource)
        .resource(EbsVolumeResource::new(config.volume_deletion_policy()))
        .crud(stack)
        .crud(DrainerResource)
        .build()
}
