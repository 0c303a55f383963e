//! Deterministic names of the cloud resources belonging to a guest cluster.

/// Value of the cluster ownership tag.
pub const CLUSTER_TAG_OWNED: &str = "owned";

/// Tag the EBS CSI/in-tree provisioner puts on volumes backing a persistent volume.
pub const PERSISTENT_VOLUME_TAG: &str = "kubernetes.io/created-for/pv/name";

pub const NAME_TAG: &str = "Name";

pub fn guest_main_stack_name(cluster_id: &str) -> String {
    format!("cluster-{cluster_id}-guest-main")
}

pub fn host_setup_stack_name(cluster_id: &str) -> String {
    format!("cluster-{cluster_id}-host-setup")
}

pub fn host_main_stack_name(cluster_id: &str) -> String {
    format!("cluster-{cluster_id}-host-main")
}

/// Key of the tag marking resources owned by the cluster, valued [`CLUSTER_TAG_OWNED`].
pub fn cluster_tag_key(cluster_id: &str) -> String {
    format!("kubernetes.io/cluster/{cluster_id}")
}

/// Value of the [`NAME_TAG`] of the cluster's etcd volume.
pub fn etcd_volume_name(cluster_id: &str) -> String {
    format!("{cluster_id}-etcd")
}

pub fn bucket_name(account_id: &str, cluster_id: &str) -> String {
    format!("{account_id}-g8s-{cluster_id}")
}
