//! In-memory fakes of the cloud collaborators.
//!
//! All fakes created by one [`Fakes`] append to the same call log, so tests can assert the
//! order of calls across services.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    cloud::{
        AwsClients, CloudError, HostClients, Sts,
        autoscaling::{
            AutoScaling, AutoScalingInstance, CompleteLifecycleActionInput,
            LIFECYCLE_STATE_TERMINATING_WAIT,
        },
        cloudformation::{
            CloudFormation, CreateStackInput, Stack, StackOutput, StackStatus, UpdateStackInput,
        },
        ec2::{DetachVolumeInput, Ec2, Filter, Volume, VolumeAttachment},
        encrypter::{EncryptionKeyState, Encrypter},
        s3::S3,
        template::{TemplateParams, TemplateRenderer},
    },
    context::{ClientFactory, PassContext},
    crd::{
        AwsCluster, AwsClusterSpec, ClusterDefinition, NodeGroup, VersionBundleRef, Vpc,
    },
    error::BoxedError,
};

pub const ACCOUNT_ID: &str = "123456789012";
pub const CLUSTER_ID: &str = "a1b2c";

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn test_cluster() -> AwsCluster {
    test_cluster_with_version("1.0.0")
}

pub fn test_cluster_with_version(version: &str) -> AwsCluster {
    let mut cluster = AwsCluster::new(CLUSTER_ID, AwsClusterSpec {
        cluster: ClusterDefinition {
            id: CLUSTER_ID.to_owned(),
        },
        masters: NodeGroup {
            instance_type: "m5.large".to_owned(),
            image_id: "ami-1".to_owned(),
            count: 1,
            monitoring: false,
        },
        workers: NodeGroup {
            instance_type: "m5.xlarge".to_owned(),
            image_id: "ami-1".to_owned(),
            count: 3,
            monitoring: true,
        },
        vpc: Vpc {
            cidr: "10.1.0.0/16".to_owned(),
            peer_id: "vpc-123".to_owned(),
        },
        version_bundle: VersionBundleRef {
            version: version.to_owned(),
        },
    });
    cluster.metadata.namespace = Some("default".to_owned());
    cluster
}

pub fn being_deleted(mut cluster: AwsCluster) -> AwsCluster {
    cluster.metadata.deletion_timestamp =
        Some(serde_json::from_str("\"2026-01-01T00:00:00Z\"").unwrap());
    cluster
}

/// Errors injected into the calls of a fake, optionally only for a number of calls.
#[derive(Default)]
struct Failures(Mutex<Vec<(String, CloudError, Option<u32>)>>);

impl Failures {
    fn add(&self, operation: &str, error: CloudError, times: Option<u32>) {
        self.0
            .lock()
            .unwrap()
            .push((operation.to_owned(), error, times));
    }

    fn check(&self, operation: &str) -> Result<(), CloudError> {
        let mut failures = self.0.lock().unwrap();
        let Some(index) = failures.iter().position(|(op, _, _)| op == operation) else {
            return Ok(());
        };

        let error = failures[index].1.clone();
        let exhausted = match &mut failures[index].2 {
            Some(times) => {
                *times -= 1;
                *times == 0
            }
            None => false,
        };
        if exhausted {
            failures.remove(index);
        }
        Err(error)
    }
}

fn record(log: &CallLog, call: impl Into<String>) {
    log.lock().unwrap().push(call.into());
}

fn not_found(resource: impl Into<String>) -> CloudError {
    CloudError::NotFound {
        resource: resource.into(),
    }
}

#[derive(Default)]
pub struct FakeCloudFormation {
    log: CallLog,
    stacks: Mutex<BTreeMap<String, Stack>>,
    created: Mutex<Vec<CreateStackInput>>,
    updated: Mutex<Vec<UpdateStackInput>>,
    failures: Failures,
}

impl FakeCloudFormation {
    fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn insert_stack(&self, name: &str, status: StackStatus, outputs: &[(&str, &str)]) {
        let stack = Stack {
            name: name.to_owned(),
            status,
            outputs: outputs
                .iter()
                .map(|(key, value)| StackOutput {
                    key: (*key).to_owned(),
                    value: (*value).to_owned(),
                })
                .collect(),
        };
        self.stacks.lock().unwrap().insert(name.to_owned(), stack);
    }

    pub fn has_stack(&self, name: &str) -> bool {
        self.stacks.lock().unwrap().contains_key(name)
    }

    pub fn fail_describe(&self, error: CloudError) {
        self.fail("describe_stack", error);
    }

    /// Fails every call of `operation`.
    pub fn fail(&self, operation: &str, error: CloudError) {
        self.failures.add(operation, error, None);
    }

    pub fn created(&self) -> Vec<CreateStackInput> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<UpdateStackInput> {
        self.updated.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudFormation for FakeCloudFormation {
    async fn describe_stack(&self, stack_name: &str) -> Result<Stack, CloudError> {
        self.failures.check("describe_stack")?;
        self.stacks
            .lock()
            .unwrap()
            .get(stack_name)
            .cloned()
            .ok_or_else(|| not_found(stack_name))
    }

    async fn create_stack(&self, input: &CreateStackInput) -> Result<(), CloudError> {
        record(&self.log, format!("create_stack {}", input.stack_name));
        self.failures.check("create_stack")?;
        if self.has_stack(&input.stack_name) {
            return Err(CloudError::AlreadyExists {
                resource: input.stack_name.clone(),
            });
        }
        self.insert_stack(&input.stack_name, StackStatus::CreateInProgress, &[]);
        self.created.lock().unwrap().push(input.clone());
        Ok(())
    }

    async fn update_stack(&self, input: &UpdateStackInput) -> Result<(), CloudError> {
        record(&self.log, format!("update_stack {}", input.stack_name));
        self.failures.check("update_stack")?;
        self.updated.lock().unwrap().push(input.clone());
        Ok(())
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<(), CloudError> {
        record(&self.log, format!("delete_stack {stack_name}"));
        self.failures.check("delete_stack")?;
        self.stacks
            .lock()
            .unwrap()
            .remove(stack_name)
            .map(|_| ())
            .ok_or_else(|| not_found(stack_name))
    }
}

#[derive(Default)]
pub struct FakeEc2 {
    log: CallLog,
    volumes: Mutex<Vec<Volume>>,
    failures: Failures,
}

impl FakeEc2 {
    fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Adds a volume attached to the given instances, tagged with `tags`.
    pub fn insert_volume(&self, volume_id: &str, instance_ids: &[&str], tags: &[(&str, &str)]) {
        let volume = Volume {
            volume_id: volume_id.to_owned(),
            attachments: instance_ids
                .iter()
                .map(|instance_id| VolumeAttachment {
                    device: "/dev/xvdh".to_owned(),
                    instance_id: (*instance_id).to_owned(),
                })
                .collect(),
            tags: tags
                .iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
                .collect(),
        };
        self.volumes.lock().unwrap().push(volume);
    }

    pub fn volume_ids(&self) -> Vec<String> {
        self.volumes
            .lock()
            .unwrap()
            .iter()
            .map(|volume| volume.volume_id.clone())
            .collect()
    }

    pub fn fail(&self, operation: &str, error: CloudError) {
        self.failures.add(operation, error, None);
    }

    pub fn fail_times(&self, operation: &str, error: CloudError, times: u32) {
        self.failures.add(operation, error, Some(times));
    }
}

#[async_trait]
impl Ec2 for FakeEc2 {
    async fn describe_volumes(&self, filters: &[Filter]) -> Result<Vec<Volume>, CloudError> {
        self.failures.check("describe_volumes")?;
        let volumes = self.volumes.lock().unwrap();
        Ok(volumes
            .iter()
            .filter(|volume| {
                filters.iter().all(|filter| {
                    let key = filter.name.strip_prefix("tag:").unwrap_or(&filter.name);
                    volume
                        .tags
                        .get(key)
                        .is_some_and(|value| filter.values.contains(value))
                })
            })
            .cloned()
            .collect())
    }

    async fn stop_instance(&self, instance_id: &str, force: bool) -> Result<(), CloudError> {
        record(&self.log, format!("stop_instance {instance_id} force={force}"));
        self.failures.check("stop_instance")
    }

    async fn wait_until_instance_stopped(&self, instance_id: &str) -> Result<(), CloudError> {
        record(&self.log, format!("wait_until_instance_stopped {instance_id}"));
        self.failures.check("wait_until_instance_stopped")
    }

    async fn detach_volume(&self, input: &DetachVolumeInput) -> Result<(), CloudError> {
        record(
            &self.log,
            format!(
                "detach_volume {} {} force={}",
                input.volume_id, input.instance_id, input.force
            ),
        );
        self.failures.check("detach_volume")?;

        let mut volumes = self.volumes.lock().unwrap();
        let volume = volumes
            .iter_mut()
            .find(|volume| volume.volume_id == input.volume_id)
            .ok_or_else(|| not_found(&input.volume_id))?;
        let before = volume.attachments.len();
        volume
            .attachments
            .retain(|attachment| attachment.instance_id != input.instance_id);
        if volume.attachments.len() == before {
            return Err(CloudError::IncorrectState {
                resource: input.volume_id.clone(),
                message: format!("not attached to {}", input.instance_id),
            });
        }
        Ok(())
    }

    async fn wait_until_volume_available(&self, volume_id: &str) -> Result<(), CloudError> {
        record(&self.log, format!("wait_until_volume_available {volume_id}"));
        self.failures.check("wait_until_volume_available")
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<(), CloudError> {
        record(&self.log, format!("delete_volume {volume_id}"));
        self.failures.check("delete_volume")?;

        let mut volumes = self.volumes.lock().unwrap();
        let index = volumes
            .iter()
            .position(|volume| volume.volume_id == volume_id)
            .ok_or_else(|| not_found(volume_id))?;
        if !volumes[index].attachments.is_empty() {
            return Err(CloudError::IncorrectState {
                resource: volume_id.to_owned(),
                message: "volume is in use".to_owned(),
            });
        }
        volumes.remove(index);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAutoScaling {
    log: CallLog,
    groups: Mutex<BTreeMap<String, Vec<AutoScalingInstance>>>,
    completed: Mutex<Vec<CompleteLifecycleActionInput>>,
    failures: Failures,
}

impl FakeAutoScaling {
    fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn insert_instance(&self, group_name: &str, instance_id: &str, lifecycle_state: &str) {
        self.groups
            .lock()
            .unwrap()
            .entry(group_name.to_owned())
            .or_default()
            .push(AutoScalingInstance {
                instance_id: instance_id.to_owned(),
                lifecycle_state: lifecycle_state.to_owned(),
            });
    }

    pub fn completed(&self) -> Vec<CompleteLifecycleActionInput> {
        self.completed.lock().unwrap().clone()
    }

    pub fn fail(&self, operation: &str, error: CloudError) {
        self.failures.add(operation, error, None);
    }
}

#[async_trait]
impl AutoScaling for FakeAutoScaling {
    async fn describe_auto_scaling_group_instances(
        &self,
        group_name: &str,
    ) -> Result<Vec<AutoScalingInstance>, CloudError> {
        self.failures.check("describe_auto_scaling_group_instances")?;
        self.groups
            .lock()
            .unwrap()
            .get(group_name)
            .cloned()
            .ok_or_else(|| not_found(group_name))
    }

    async fn complete_lifecycle_action(
        &self,
        input: &CompleteLifecycleActionInput,
    ) -> Result<(), CloudError> {
        record(
            &self.log,
            format!("complete_lifecycle_action {}", input.instance_id),
        );
        self.failures.check("complete_lifecycle_action")?;

        let mut groups = self.groups.lock().unwrap();
        let instance = groups
            .get_mut(&input.auto_scaling_group_name)
            .and_then(|instances| {
                instances.iter_mut().find(|instance| {
                    instance.instance_id == input.instance_id
                        && instance.lifecycle_state == LIFECYCLE_STATE_TERMINATING_WAIT
                })
            })
            .ok_or_else(|| not_found(format!("lifecycle action of {}", input.instance_id)))?;
        instance.lifecycle_state = "Terminating:Proceed".to_owned();
        self.completed.lock().unwrap().push(input.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeS3 {
    log: CallLog,
    buckets: Mutex<BTreeMap<String, Vec<String>>>,
    failures: Failures,
}

impl FakeS3 {
    fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn insert_bucket(&self, bucket: &str, keys: &[&str]) {
        self.buckets.lock().unwrap().insert(
            bucket.to_owned(),
            keys.iter().map(|key| (*key).to_owned()).collect(),
        );
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.lock().unwrap().contains_key(bucket)
    }

    pub fn fail(&self, operation: &str, error: CloudError) {
        self.failures.add(operation, error, None);
    }
}

#[async_trait]
impl S3 for FakeS3 {
    async fn head_bucket(&self, bucket: &str) -> Result<(), CloudError> {
        self.failures.check("head_bucket")?;
        if self.has_bucket(bucket) {
            Ok(())
        } else {
            Err(not_found(bucket))
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), CloudError> {
        record(&self.log, format!("create_bucket {bucket}"));
        self.failures.check("create_bucket")?;
        if self.has_bucket(bucket) {
            return Err(CloudError::AlreadyExists {
                resource: bucket.to_owned(),
            });
        }
        self.insert_bucket(bucket, &[]);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, CloudError> {
        self.failures.check("list_objects")?;
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .ok_or_else(|| not_found(bucket))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), CloudError> {
        record(&self.log, format!("delete_objects {bucket} {}", keys.len()));
        self.failures.check("delete_objects")?;
        let mut buckets = self.buckets.lock().unwrap();
        let objects = buckets.get_mut(bucket).ok_or_else(|| not_found(bucket))?;
        objects.retain(|key| !keys.contains(key));
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), CloudError> {
        record(&self.log, format!("delete_bucket {bucket}"));
        self.failures.check("delete_bucket")?;
        let mut buckets = self.buckets.lock().unwrap();
        match buckets.get(bucket) {
            None => Err(not_found(bucket)),
            Some(objects) if !objects.is_empty() => Err(CloudError::IncorrectState {
                resource: bucket.to_owned(),
                message: "bucket is not empty".to_owned(),
            }),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }
}

#[derive(Default)]
pub struct FakeSts;

#[async_trait]
impl Sts for FakeSts {
    async fn account_id(&self) -> Result<String, CloudError> {
        Ok(ACCOUNT_ID.to_owned())
    }
}

/// Keeps one key per cluster, named `alias/<cluster id>`.
#[derive(Default)]
pub struct FakeEncrypter {
    log: CallLog,
    keys: Mutex<BTreeSet<String>>,
    failures: Failures,
}

impl FakeEncrypter {
    fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    fn key_name(cluster_id: &str) -> String {
        format!("alias/{cluster_id}")
    }

    pub fn has_key(&self, cluster_id: &str) -> bool {
        self.keys.lock().unwrap().contains(cluster_id)
    }

    pub fn insert_key(&self, cluster_id: &str) {
        self.keys.lock().unwrap().insert(cluster_id.to_owned());
    }

    pub fn fail(&self, operation: &str, error: CloudError) {
        self.failures.add(operation, error, None);
    }
}

#[async_trait]
impl Encrypter for FakeEncrypter {
    async fn current_state(&self, cluster_id: &str) -> Result<EncryptionKeyState, CloudError> {
        self.failures.check("current_state")?;
        Ok(if self.has_key(cluster_id) {
            EncryptionKeyState {
                key_name: Self::key_name(cluster_id),
            }
        } else {
            EncryptionKeyState::default()
        })
    }

    async fn desired_state(&self, cluster_id: &str) -> Result<EncryptionKeyState, CloudError> {
        Ok(EncryptionKeyState {
            key_name: Self::key_name(cluster_id),
        })
    }

    async fn create_key(&self, cluster_id: &str) -> Result<(), CloudError> {
        record(&self.log, format!("create_key {cluster_id}"));
        self.failures.check("create_key")?;
        if !self.keys.lock().unwrap().insert(cluster_id.to_owned()) {
            return Err(CloudError::AlreadyExists {
                resource: Self::key_name(cluster_id),
            });
        }
        Ok(())
    }

    async fn delete_key(&self, cluster_id: &str) -> Result<(), CloudError> {
        record(&self.log, format!("delete_key {cluster_id}"));
        self.failures.check("delete_key")?;
        if !self.keys.lock().unwrap().remove(cluster_id) {
            return Err(not_found(Self::key_name(cluster_id)));
        }
        Ok(())
    }

    async fn encrypt(&self, key_name: &str, plaintext: &[u8]) -> Result<Vec<u8>, CloudError> {
        let mut ciphertext = format!("{key_name}:").into_bytes();
        ciphertext.extend(plaintext.iter().rev());
        Ok(ciphertext)
    }

    async fn decrypt(&self, key_name: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CloudError> {
        let prefix = format!("{key_name}:");
        let payload = ciphertext
            .strip_prefix(prefix.as_bytes())
            .ok_or_else(|| CloudError::IncorrectState {
                resource: key_name.to_owned(),
                message: "ciphertext was encrypted with another key".to_owned(),
            })?;
        Ok(payload.iter().rev().copied().collect())
    }
}

/// Renders a one-line summary of the parameters instead of a real template.
#[derive(Default)]
pub struct FakeRenderer {
    fail: bool,
}

impl FakeRenderer {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl TemplateRenderer for FakeRenderer {
    fn render_guest_main(&self, params: TemplateParams<'_>) -> Result<String, BoxedError> {
        if self.fail {
            return Err("template syntax error".into());
        }
        Ok(format!(
            "account={} cluster={} version={} workers={} master={}",
            params.account_id,
            params.cluster.cluster_id(),
            params.state.version_bundle_version,
            params.state.worker_count,
            params.state.master_instance_resource_name,
        ))
    }
}

/// One set of fakes sharing a call log.
#[derive(Clone)]
pub struct Fakes {
    pub log: CallLog,
    pub autoscaling: Arc<FakeAutoScaling>,
    pub cloudformation: Arc<FakeCloudFormation>,
    pub host_cloudformation: Arc<FakeCloudFormation>,
    pub ec2: Arc<FakeEc2>,
    pub encrypter: Arc<FakeEncrypter>,
    pub s3: Arc<FakeS3>,
    pub sts: Arc<FakeSts>,
}

impl Default for Fakes {
    fn default() -> Self {
        let log = CallLog::default();
        Self {
            autoscaling: Arc::new(FakeAutoScaling::with_log(log.clone())),
            cloudformation: Arc::new(FakeCloudFormation::with_log(log.clone())),
            host_cloudformation: Arc::new(FakeCloudFormation::with_log(log.clone())),
            ec2: Arc::new(FakeEc2::with_log(log.clone())),
            encrypter: Arc::new(FakeEncrypter::with_log(log.clone())),
            s3: Arc::new(FakeS3::with_log(log.clone())),
            sts: Arc::new(FakeSts),
            log,
        }
    }
}

impl Fakes {
    pub fn aws_clients(&self) -> AwsClients {
        AwsClients {
            autoscaling: self.autoscaling.clone(),
            cloudformation: self.cloudformation.clone(),
            ec2: self.ec2.clone(),
            encrypter: self.encrypter.clone(),
            s3: self.s3.clone(),
            sts: self.sts.clone(),
        }
    }

    pub fn context(&self, updates_allowed: bool) -> PassContext {
        PassContext::new(updates_allowed, self.aws_clients(), ClientFactory::host_clients(self))
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Calls whose log line starts with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl ClientFactory for Fakes {
    async fn guest_clients(&self, _cluster: &AwsCluster) -> Result<AwsClients, CloudError> {
        Ok(self.aws_clients())
    }

    fn host_clients(&self) -> HostClients {
        HostClients {
            cloudformation: self.host_cloudformation.clone(),
        }
    }
}
