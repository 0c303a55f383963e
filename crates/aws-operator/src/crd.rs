//! The `AwsCluster` custom resource describing a guest cluster to run on AWS.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::framework::ReconcileObject;

#[derive(Clone, CustomResource, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[kube(
    group = "provider.aws-operator.io",
    version = "v1alpha1",
    kind = "AwsCluster",
    plural = "awsclusters",
    shortname = "awsc",
    namespaced,
    crates(
        kube_core = "kube::core",
        k8s_openapi = "k8s_openapi",
        schemars = "schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct AwsClusterSpec {
    pub cluster: ClusterDefinition,
    pub masters: NodeGroup,
    pub workers: NodeGroup,
    pub vpc: Vpc,
    pub version_bundle: VersionBundleRef,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDefinition {
    /// Short unique identifier of the guest cluster, e.g. `a1b2c`.
    pub id: String,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub instance_type: String,
    pub image_id: String,
    pub count: u32,

    /// Enables detailed CloudWatch monitoring for the instances.
    #[serde(default)]
    pub monitoring: bool,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    pub cidr: String,
    pub peer_id: String,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionBundleRef {
    /// Selects the reconciliation logic generation applied to the cluster.
    pub version: String,
}

impl AwsCluster {
    pub fn cluster_id(&self) -> &str {
        &self.spec.cluster.id
    }
}

impl ReconcileObject for AwsCluster {
    fn version_bundle_version(&self) -> &str {
        &self.spec.version_bundle.version
    }

    fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    fn object_key(&self) -> String {
        match self.namespace() {
            Some(namespace) => format!("{namespace}/{}", self.name_any()),
            None => self.name_any(),
        }
    }
}
