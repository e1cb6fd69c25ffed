use crate::{CniIngressRule, IngressRule, Protocol, Role, Tags};
use ipnet::{Ipv4Net, Ipv6Net};
use std::{collections::BTreeMap, net::Ipv4Addr};

pub const DEFAULT_API_SERVER_PORT: i32 = 6443;

/// Everything a reconciliation reads. It is never mutated by the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterInput {
    /// Used for group names and the ownership tag.
    pub cluster_name: String,

    /// The cluster name the in-cluster cloud provider knows, when it differs
    /// from `cluster_name`.
    pub kubernetes_cluster_name: Option<String>,

    pub vpc: VpcInput,

    /// The roles to reconcile, in order.
    pub roles: Vec<Role>,

    pub api_server_port: i32,

    pub bastion: BastionInput,

    /// Sources allowed to reach node ports. Defaults to any IPv4 address.
    pub node_port_ingress_cidr_blocks: Option<Vec<Ipv4Net>>,

    pub additional_control_plane_ingress_rules: Vec<IngressRule>,

    /// Defaults to the Calico requirements.
    pub cni_ingress_rules: Option<Vec<CniIngressRule>>,

    /// The first load balancer is the primary API server load balancer.
    pub control_plane_load_balancers: Vec<LoadBalancerInput>,

    /// Public IPs of the VPC's NAT gateways, once they are known.
    pub nat_gateway_ips: Vec<Ipv4Addr>,

    /// Pre-existing groups, by ID, to use instead of managed ones.
    pub security_group_overrides: BTreeMap<Role, String>,

    pub additional_tags: Tags,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VpcInput {
    /// Unset until the VPC exists.
    pub id: Option<String>,
    pub cidr_block: Option<Ipv4Net>,
    pub ipv6_enabled: bool,
    pub ipv6_cidr_block: Option<Ipv6Net>,

    /// Whether the VPC itself is created and owned by the cluster.
    pub managed: bool,

    /// Whether to strip the rules from the VPC's built-in default group.
    pub empty_routes_default_security_group: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BastionInput {
    pub enabled: bool,

    /// Defaults to any IPv4 address.
    pub allowed_cidr_blocks: Vec<Ipv4Net>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadBalancerInput {
    pub scheme: LoadBalancerScheme,
    pub load_balancer_type: LoadBalancerType,

    /// Custom ingress rules for the API server load balancer group.
    pub ingress_rules: Vec<IngressRule>,

    pub preserve_client_ip: bool,
    pub additional_listeners: Vec<Listener>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LoadBalancerScheme {
    #[default]
    InternetFacing,
    Internal,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LoadBalancerType {
    #[default]
    Classic,
    Elb,
    Alb,
    Nlb,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub port: i32,
    pub protocol: ListenerProtocol,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ListenerProtocol {
    #[default]
    Tcp,
    Tls,
    Udp,
}

// === impl ClusterInput ===

impl ClusterInput {
    pub const DEFAULT_ROLES: [Role; 5] = [
        Role::Bastion,
        Role::ApiServerLb,
        Role::Lb,
        Role::ControlPlane,
        Role::Node,
    ];

    pub fn kubernetes_cluster_name(&self) -> &str {
        self.kubernetes_cluster_name
            .as_deref()
            .unwrap_or(&self.cluster_name)
    }

    pub fn primary_load_balancer(&self) -> Option<&LoadBalancerInput> {
        self.control_plane_load_balancers.first()
    }

    pub fn override_for(&self, role: Role) -> Option<&str> {
        self.security_group_overrides.get(&role).map(String::as_str)
    }

    /// Whether a group ID was supplied as an override for any role.
    pub fn is_override(&self, group_id: &str) -> bool {
        self.security_group_overrides
            .values()
            .any(|id| id == group_id)
    }

    pub fn cni_ingress_rules(&self) -> Vec<CniIngressRule> {
        self.cni_ingress_rules
            .clone()
            .unwrap_or_else(CniIngressRule::calico_defaults)
    }
}

// === impl ListenerProtocol ===

impl ListenerProtocol {
    pub fn ip_protocol(&self) -> Protocol {
        match self {
            Self::Tcp | Self::Tls => Protocol::Tcp,
            Self::Udp => Protocol::Udp,
        }
    }
}
