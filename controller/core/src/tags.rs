use crate::{ClusterInput, Role};
use std::collections::BTreeMap;

pub type Tags = BTreeMap<String, String>;

const PROVIDER_PREFIX: &str = "sigs.k8s.io/cluster-api-provider-aws/";
const CLOUD_PROVIDER_PREFIX: &str = "kubernetes.io/cluster/";

/// Names the group's role.
pub const ROLE_TAG_KEY: &str = "sigs.k8s.io/cluster-api-provider-aws/role";

pub const NAME_TAG_KEY: &str = "Name";

/// Present on groups that an EKS control plane manages.
pub const EKS_CLUSTER_NAME_TAG_KEY: &str = "aws:eks:cluster-name";

pub const LIFECYCLE_OWNED: &str = "owned";

/// The group name prefix the cloud uses for group IDs.
const GROUP_ID_PREFIX: &str = "sg-";

/// Derives the name of the group for `role`.
///
/// Cluster names that look like group IDs are prefixed with `@` so that a
/// name can never be mistaken for an ID.
pub fn group_name(cluster_name: &str, role: Role) -> String {
    if cluster_name.starts_with(GROUP_ID_PREFIX) {
        return format!("@{cluster_name}-{role}");
    }
    format!("{cluster_name}-{role}")
}

pub fn group_description(cluster_name: &str, role: Role) -> String {
    format!("Kubernetes cluster {cluster_name}: {role}")
}

/// The key marking a resource as owned by the cluster.
pub fn cluster_tag_key(cluster_name: &str) -> String {
    format!("{PROVIDER_PREFIX}cluster/{cluster_name}")
}

/// The key the in-cluster cloud provider uses to find its resources.
pub fn cloud_provider_tag_key(kubernetes_cluster_name: &str) -> String {
    format!("{CLOUD_PROVIDER_PREFIX}{kubernetes_cluster_name}")
}

/// Builds the full tag set for the group of `role`.
///
/// Exactly one role, [`Role::Lb`], carries the cloud provider tag; the
/// cloud provider cannot pick a group for its load balancers otherwise.
pub fn build(input: &ClusterInput, name: &str, role: Role) -> Tags {
    let mut tags = input.additional_tags.clone();

    let cloud_provider_key = cloud_provider_tag_key(input.kubernetes_cluster_name());
    if role == Role::Lb {
        tags.insert(cloud_provider_key, LIFECYCLE_OWNED.to_string());
    } else {
        tags.remove(&cloud_provider_key);
    }

    tags.insert(
        cluster_tag_key(&input.cluster_name),
        LIFECYCLE_OWNED.to_string(),
    );
    tags.insert(NAME_TAG_KEY.to_string(), name.to_string());
    tags.insert(ROLE_TAG_KEY.to_string(), role.to_string());
    tags
}

/// Returns the tags in `desired` that are missing from `current` or have a
/// different value there.
pub fn missing(current: &Tags, desired: &Tags) -> Tags {
    desired
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub fn is_eks_owned(tags: &Tags) -> bool {
    tags.contains_key(EKS_CLUSTER_NAME_TAG_KEY)
}

pub fn has_cloud_provider_owned(tags: &Tags, kubernetes_cluster_name: &str) -> bool {
    tags.get(&cloud_provider_tag_key(kubernetes_cluster_name))
        .is_some_and(|v| v == LIFECYCLE_OWNED)
}
