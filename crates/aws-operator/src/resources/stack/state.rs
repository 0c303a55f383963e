use sha2::{Digest, Sha256};

use crate::{
    cloud::cloudformation::{StackOutputs, UpdateStackInput},
    crd::AwsCluster,
    error::Result,
    framework::ReconcileObject,
    names,
};

pub const OUTPUT_MASTER_IMAGE_ID: &str = "MasterImageID";
pub const OUTPUT_MASTER_INSTANCE_TYPE: &str = "MasterInstanceType";
pub const OUTPUT_MASTER_INSTANCE_RESOURCE_NAME: &str = "MasterInstanceResourceName";
pub const OUTPUT_MASTER_CLOUD_CONFIG_VERSION: &str = "MasterCloudConfigVersion";
pub const OUTPUT_WORKER_COUNT: &str = "WorkerCount";
pub const OUTPUT_WORKER_IMAGE_ID: &str = "WorkerImageID";
pub const OUTPUT_WORKER_INSTANCE_TYPE: &str = "WorkerInstanceType";
pub const OUTPUT_WORKER_CLOUD_CONFIG_VERSION: &str = "WorkerCloudConfigVersion";
pub const OUTPUT_VERSION_BUNDLE_VERSION: &str = "VersionBundleVersion";

const MASTER_INSTANCE_RESOURCE_PREFIX: &str = "MasterInstance";

/// The guest main stack as observed in CloudFormation or as derived from an `AwsCluster`.
///
/// An empty [`name`](Self::name) means the stack does not exist. A state with a name but no
/// other fields describes a stack whose outputs cannot be read yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackState {
    pub name: String,

    pub master_image_id: String,
    pub master_instance_type: String,
    pub master_cloud_config_version: String,
    pub master_instance_resource_name: String,
    pub master_monitoring: bool,

    /// Kept as the stack output string, e.g. `"4"`.
    pub worker_count: String,
    pub worker_image_id: String,
    pub worker_instance_type: String,
    pub worker_cloud_config_version: String,
    pub worker_monitoring: bool,

    pub version_bundle_version: String,

    pub should_scale: bool,
    pub should_update: bool,

    /// Ready to submit when either flag is set.
    pub update_request: Option<UpdateStackInput>,
}

impl StackState {
    pub fn exists(&self) -> bool {
        !self.name.is_empty()
    }

    /// Whether the outputs of the stack were read into this state.
    pub fn has_outputs(&self) -> bool {
        !self.version_bundle_version.is_empty()
    }

    pub fn from_outputs(outputs: &StackOutputs, name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            master_image_id: outputs.get(OUTPUT_MASTER_IMAGE_ID)?.to_owned(),
            master_instance_type: outputs.get(OUTPUT_MASTER_INSTANCE_TYPE)?.to_owned(),
            master_cloud_config_version: outputs
                .get(OUTPUT_MASTER_CLOUD_CONFIG_VERSION)?
                .to_owned(),
            master_instance_resource_name: outputs
                .get(OUTPUT_MASTER_INSTANCE_RESOURCE_NAME)?
                .to_owned(),
            worker_count: outputs.get(OUTPUT_WORKER_COUNT)?.to_owned(),
            worker_image_id: outputs.get(OUTPUT_WORKER_IMAGE_ID)?.to_owned(),
            worker_instance_type: outputs.get(OUTPUT_WORKER_INSTANCE_TYPE)?.to_owned(),
            worker_cloud_config_version: outputs
                .get(OUTPUT_WORKER_CLOUD_CONFIG_VERSION)?
                .to_owned(),
            version_bundle_version: outputs.get(OUTPUT_VERSION_BUNDLE_VERSION)?.to_owned(),
            ..Self::default()
        })
    }

    /// Derives the target state of the guest main stack from the cluster.
    pub fn desired(cluster: &AwsCluster, cloud_config_version: &str) -> Self {
        let masters = &cluster.spec.masters;
        let workers = &cluster.spec.workers;

        Self {
            name: names::guest_main_stack_name(cluster.cluster_id()),
            master_image_id: masters.image_id.clone(),
            master_instance_type: masters.instance_type.clone(),
            master_cloud_config_version: cloud_config_version.to_owned(),
            master_instance_resource_name: master_instance_resource_name(
                &masters.image_id,
                &masters.instance_type,
                cloud_config_version,
            ),
            master_monitoring: masters.monitoring,
            worker_count: workers.count.to_string(),
            worker_image_id: workers.image_id.clone(),
            worker_instance_type: workers.instance_type.clone(),
            worker_cloud_config_version: cloud_config_version.to_owned(),
            worker_monitoring: workers.monitoring,
            version_bundle_version: cluster.version_bundle_version().to_owned(),
            ..Self::default()
        }
    }
}

/// Logical id of the master instance in the template.
///
/// Changes whenever the image, instance type or cloud-config of the master changes, which
/// makes CloudFormation replace the instance.
pub fn master_instance_resource_name(
    image_id: &str,
    instance_type: &str,
    cloud_config_version: &str,
) -> String {
    let mut hasher = Sha256::new();
    for part in [image_id, instance_type, cloud_config_version] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();

    let suffix: String = digest[..4].iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{MASTER_INSTANCE_RESOURCE_PREFIX}{suffix}")
}

/// The update action a pass takes on an existing stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Decision {
    /// Only the worker count changes.
    Scale,

    /// Instance types or the version bundle change. Implies replacing the master.
    Update,

    None,
}

/// True iff the worker count differs and every other compared field is equal.
pub fn should_scale(current: &StackState, desired: &StackState) -> bool {
    current.master_image_id == desired.master_image_id
        && current.master_instance_type == desired.master_instance_type
        && current.master_cloud_config_version == desired.master_cloud_config_version
        && current.worker_image_id == desired.worker_image_id
        && current.worker_instance_type == desired.worker_instance_type
        && current.worker_cloud_config_version == desired.worker_cloud_config_version
        && current.version_bundle_version == desired.version_bundle_version
        && current.worker_count != desired.worker_count
}

/// True iff an instance type, the version bundle version or the worker count differs and
/// updates are allowed.
pub fn should_update(current: &StackState, desired: &StackState, updates_allowed: bool) -> bool {
    let changed = current.master_instance_type != desired.master_instance_type
        || current.worker_instance_type != desired.worker_instance_type
        || current.version_bundle_version != desired.version_bundle_version
        || current.worker_count != desired.worker_count;

    changed && updates_allowed
}

/// Picks at most one action. A pure worker count change is always a scale, even if
/// updates are not allowed.
pub fn decide(current: &StackState, desired: &StackState, updates_allowed: bool) -> Decision {
    let scale = should_scale(current, desired);

    if should_update(current, desired, updates_allowed) && !scale {
        Decision::Update
    } else if scale {
        Decision::Scale
    } else {
        Decision::None
    }
}
