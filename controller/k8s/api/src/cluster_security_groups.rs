use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Describes the security groups a cluster needs.
///
/// Network sources are kept as strings so that a malformed value is reported
/// on the resource's status rather than rejected by the watch.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "sgcontroller.io",
    version = "v1alpha1",
    kind = "ClusterSecurityGroups",
    status = "ClusterSecurityGroupsStatus",
    shortname = "csg",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecurityGroupsSpec {
    pub cluster_name: String,
    pub kubernetes_cluster_name: Option<String>,
    pub vpc: VpcSpec,

    /// Role names, in reconciliation order. Defaults to the self-managed
    /// roles.
    pub roles: Option<Vec<String>>,
    pub api_server_port: Option<i32>,
    pub bastion: Option<BastionSpec>,
    pub node_port_ingress_cidr_blocks: Option<Vec<String>>,
    pub additional_control_plane_ingress_rules: Option<Vec<IngressRuleSpec>>,
    pub cni_ingress_rules: Option<Vec<CniIngressRuleSpec>>,
    pub control_plane_load_balancers: Option<Vec<LoadBalancerSpec>>,
    pub nat_gateway_ips: Option<Vec<String>>,

    /// Role name to pre-existing security group ID.
    pub security_group_overrides: Option<BTreeMap<String, String>>,
    pub additional_tags: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VpcSpec {
    pub id: Option<String>,
    pub cidr_block: Option<String>,
    pub ipv6_cidr_block: Option<String>,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub empty_routes_default_vpc_security_group: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BastionSpec {
    #[serde(default)]
    pub enabled: bool,
    pub allowed_cidr_blocks: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressRuleSpec {
    #[serde(default)]
    pub description: String,
    pub protocol: String,
    #[serde(default)]
    pub from_port: i32,
    #[serde(default)]
    pub to_port: i32,
    pub cidr_blocks: Option<Vec<String>>,
    pub ipv6_cidr_blocks: Option<Vec<String>>,
    pub source_security_group_ids: Option<Vec<String>>,
    pub source_security_group_roles: Option<Vec<String>>,
    #[serde(default)]
    pub nat_gateways_ips_source: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CniIngressRuleSpec {
    #[serde(default)]
    pub description: String,
    pub protocol: String,
    #[serde(default)]
    pub from_port: i32,
    #[serde(default)]
    pub to_port: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    pub scheme: Option<LoadBalancerScheme>,
    pub load_balancer_type: Option<LoadBalancerType>,
    pub ingress_rules: Option<Vec<IngressRuleSpec>>,
    #[serde(default)]
    pub preserve_client_ip: bool,
    pub additional_listeners: Option<Vec<ListenerSpec>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancerScheme {
    InternetFacing,
    Internal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerType {
    Classic,
    Elb,
    Alb,
    Nlb,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
    pub port: i32,
    pub protocol: Option<ListenerProtocol>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerProtocol {
    Tcp,
    Tls,
    Udp,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecurityGroupsStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Role name to the group reconciled for it.
    #[serde(default)]
    pub security_groups: BTreeMap<String, SecurityGroupStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupStatus {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}
