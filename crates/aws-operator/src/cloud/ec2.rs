use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::cloud::CloudError;

#[async_trait]
pub trait Ec2: Send + Sync {
    /// Lists the volumes matching all of the given filters.
    async fn describe_volumes(&self, filters: &[Filter]) -> Result<Vec<Volume>, CloudError>;

    async fn stop_instance(&self, instance_id: &str, force: bool) -> Result<(), CloudError>;

    async fn wait_until_instance_stopped(&self, instance_id: &str) -> Result<(), CloudError>;

    /// Fails with [`CloudError::IncorrectState`] if the volume is not attached to the instance.
    async fn detach_volume(&self, input: &DetachVolumeInput) -> Result<(), CloudError>;

    async fn wait_until_volume_available(&self, volume_id: &str) -> Result<(), CloudError>;

    async fn delete_volume(&self, volume_id: &str) -> Result<(), CloudError>;
}

/// A server-side filter of a describe call, e.g. `tag:Name` = `a1b2c-etcd`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn tag(key: impl AsRef<str>, value: impl Into<String>) -> Self {
        Self {
            name: format!("tag:{}", key.as_ref()),
            values: vec![value.into()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Volume {
    pub volume_id: String,
    pub attachments: Vec<VolumeAttachment>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeAttachment {
    pub device: String,
    pub instance_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetachVolumeInput {
    pub volume_id: String,
    pub instance_id: String,
    pub device: String,
    pub force: bool,
}
