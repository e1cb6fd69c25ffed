//! Computes the ingress rules each role's group should carry.
//!
//! The rules returned here may name several sources at once. Callers expand
//! them with [`crate::rule_set::expand`] before comparing them to what is
//! observed.

use crate::{
    any_ipv4, any_ipv6, peers, rule_set, ClusterInput, Error, IngressRule, LoadBalancerInput,
    LoadBalancerScheme, LoadBalancerType, Protocol, Role, SecurityGroup,
};
use ipnet::{Ipv4Net, Ipv6Net};
use std::collections::BTreeMap;

const ETCD_PORT: i32 = 2379;
const ETCD_PEER_PORT: i32 = 2380;
const SSH_PORT: i32 = 22;
const KUBELET_PORT: i32 = 10250;
const NODE_PORT_MIN: i32 = 30000;
const NODE_PORT_MAX: i32 = 32767;

const API_DESCRIPTION: &str = "Kubernetes API";

/// Builds desired rules against the groups reconciled so far.
#[derive(Copy, Clone, Debug)]
pub struct Desired<'a> {
    input: &'a ClusterInput,
    groups: &'a BTreeMap<Role, SecurityGroup>,
}

// === impl Desired ===

impl<'a> Desired<'a> {
    pub fn new(input: &'a ClusterInput, groups: &'a BTreeMap<Role, SecurityGroup>) -> Self {
        Self { input, groups }
    }

    /// Returns the rules the group of `role` should carry.
    ///
    /// Fails if a referenced group has not been reconciled or if a rule
    /// depends on infrastructure that is not known yet.
    pub fn ingress_rules(&self, role: Role) -> Result<Vec<IngressRule>, Error> {
        match role {
            Role::Bastion => Ok(self.bastion_rules()),
            Role::ControlPlane => self.control_plane_rules(),
            Role::Node => self.node_rules(),
            Role::EksNodeAdditional => self.eks_node_additional_rules(),
            Role::ApiServerLb => self.api_server_lb_rules(),
            Role::Lb => self.lb_rules(),
        }
    }

    fn group_id(&self, role: Role) -> Result<&'a str, Error> {
        peers::group_id(self.groups, role)
    }

    fn bastion_rules(&self) -> Vec<IngressRule> {
        let allowed = &self.input.bastion.allowed_cidr_blocks;
        let rule = IngressRule::tcp("SSH", SSH_PORT);
        if allowed.is_empty() {
            return vec![rule.with_cidr_blocks(Some(any_ipv4()))];
        }
        vec![rule.with_cidr_blocks(allowed.iter().copied())]
    }

    fn bastion_ssh_rule(&self) -> Result<Option<IngressRule>, Error> {
        if !self.input.bastion.enabled {
            return Ok(None);
        }
        let bastion = self.group_id(Role::Bastion)?;
        Ok(Some(
            IngressRule::tcp("SSH", SSH_PORT).with_source_groups(Some(bastion)),
        ))
    }

    fn cni_rules(&self) -> Result<Vec<IngressRule>, Error> {
        let cp = self.group_id(Role::ControlPlane)?;
        let node = self.group_id(Role::Node)?;
        Ok(self
            .input
            .cni_ingress_rules()
            .into_iter()
            .map(|cni| {
                IngressRule::new(cni.description, cni.protocol, cni.from_port, cni.to_port)
                    .with_source_groups([cp, node])
            })
            .collect())
    }

    fn control_plane_rules(&self) -> Result<Vec<IngressRule>, Error> {
        let cp = self.group_id(Role::ControlPlane)?;
        let node = self.group_id(Role::Node)?;
        let lb = self.group_id(Role::ApiServerLb)?;

        let mut rules = vec![
            IngressRule::tcp(API_DESCRIPTION, self.input.api_server_port)
                .with_source_groups([lb, cp, node]),
            IngressRule::tcp("etcd", ETCD_PORT).with_source_groups(Some(cp)),
            IngressRule::tcp("etcd peer", ETCD_PEER_PORT).with_source_groups(Some(cp)),
        ];
        rules.extend(self.bastion_ssh_rule()?);
        rules.extend(peers::resolve(
            self.input,
            self.groups,
            &self.input.additional_control_plane_ingress_rules,
        )?);
        rules.extend(self.cni_rules()?);
        Ok(rules)
    }

    fn node_rules(&self) -> Result<Vec<IngressRule>, Error> {
        let cp = self.group_id(Role::ControlPlane)?;
        let node = self.group_id(Role::Node)?;

        let node_port_sources = self
            .input
            .node_port_ingress_cidr_blocks
            .clone()
            .unwrap_or_else(|| vec![any_ipv4()]);
        let mut rules = vec![
            IngressRule::new(
                "Node Port Services",
                Protocol::Tcp,
                NODE_PORT_MIN,
                NODE_PORT_MAX,
            )
            .with_cidr_blocks(node_port_sources),
            IngressRule::tcp("Kubelet API", KUBELET_PORT).with_source_groups([cp, node]),
        ];
        if self.input.vpc.ipv6_enabled {
            rules.push(
                IngressRule::new(
                    "Node Port Services",
                    Protocol::Tcp,
                    NODE_PORT_MIN,
                    NODE_PORT_MAX,
                )
                .with_ipv6_cidr_blocks(Some(any_ipv6())),
            );
        }
        rules.extend(self.bastion_ssh_rule()?);
        rules.extend(self.cni_rules()?);
        Ok(rules)
    }

    // Managed node groups bring their own rules; only the configured extras
    // are added and they are used as-is.
    fn eks_node_additional_rules(&self) -> Result<Vec<IngressRule>, Error> {
        let mut rules = self.input.additional_control_plane_ingress_rules.clone();
        rules.extend(self.bastion_ssh_rule()?);
        Ok(rules)
    }

    /// The API server load balancer always admits the kubelets; custom rules
    /// are only added where they are not already covered.
    fn api_server_lb_rules(&self) -> Result<Vec<IngressRule>, Error> {
        let kubelet = self.kubelet_to_api_server_lb_rules()?;

        let custom = match self.input.primary_load_balancer() {
            Some(lb) if !lb.ingress_rules.is_empty() => {
                peers::resolve(self.input, self.groups, &lb.ingress_rules)?
            }
            _ => self.default_api_server_lb_rules(),
        };

        let kubelet_set = rule_set::expand(&kubelet);
        let extra = rule_set::expand(&custom).difference(&kubelet_set);

        Ok(kubelet
            .into_iter()
            .chain(extra.into_iter().map(IngressRule::from))
            .collect())
    }

    fn kubelet_to_api_server_lb_rules(&self) -> Result<Vec<IngressRule>, Error> {
        let port = self.input.api_server_port;
        let scheme = self
            .input
            .primary_load_balancer()
            .map(|lb| lb.scheme)
            .unwrap_or_default();

        if scheme == LoadBalancerScheme::Internal {
            let (v4, v6) = self.vpc_cidrs()?;
            let mut rules = vec![IngressRule::tcp(API_DESCRIPTION, port).with_cidr_blocks(Some(v4))];
            if let Some(v6) = v6 {
                rules.push(IngressRule::tcp(API_DESCRIPTION, port).with_ipv6_cidr_blocks(Some(v6)));
            }
            return Ok(rules);
        }

        // Internet-facing load balancers see the kubelets' traffic from the
        // NAT gateways. Until those are known the API stays open to all.
        if !self.input.nat_gateway_ips.is_empty() {
            let nat = self.input.nat_gateway_ips.iter().map(|ip| Ipv4Net::from(*ip));
            return Ok(vec![IngressRule::tcp(API_DESCRIPTION, port).with_cidr_blocks(nat)]);
        }
        Ok(self.any_api_rules())
    }

    fn default_api_server_lb_rules(&self) -> Vec<IngressRule> {
        self.any_api_rules()
    }

    fn any_api_rules(&self) -> Vec<IngressRule> {
        let port = self.input.api_server_port;
        let mut rules = vec![IngressRule::tcp(API_DESCRIPTION, port).with_cidr_blocks(Some(any_ipv4()))];
        if self.input.vpc.ipv6_enabled {
            rules.push(IngressRule::tcp(API_DESCRIPTION, port).with_ipv6_cidr_blocks(Some(any_ipv6())));
        }
        rules
    }

    /// The in-cluster cloud provider manages this group's rules for its own
    /// load balancers. Only the traffic of network load balancers fronting
    /// the control plane is admitted here.
    fn lb_rules(&self) -> Result<Vec<IngressRule>, Error> {
        let mut rules = Vec::new();
        let mut allowed_nlb_traffic = false;
        for lb in &self.input.control_plane_load_balancers {
            if lb.load_balancer_type != LoadBalancerType::Nlb {
                continue;
            }

            if !allowed_nlb_traffic {
                rules.extend(self.nlb_rule(lb, API_DESCRIPTION, Protocol::Tcp, self.input.api_server_port)?);
                allowed_nlb_traffic = true;
            }

            for listener in &lb.additional_listeners {
                rules.extend(self.nlb_rule(
                    lb,
                    format!("Additional listener port {}", listener.port),
                    listener.protocol.ip_protocol(),
                    listener.port,
                )?);
            }
        }
        Ok(rules)
    }

    fn nlb_rule(
        &self,
        lb: &LoadBalancerInput,
        description: impl ToString,
        protocol: Protocol,
        port: i32,
    ) -> Result<Vec<IngressRule>, Error> {
        let rule = IngressRule::new(description, protocol, port, port);
        if lb.preserve_client_ip {
            let mut rules = vec![rule.clone().with_cidr_blocks(Some(any_ipv4()))];
            if self.input.vpc.ipv6_enabled {
                rules.push(rule.with_ipv6_cidr_blocks(Some(any_ipv6())));
            }
            return Ok(rules);
        }

        let (v4, v6) = self.vpc_cidrs()?;
        let mut rules = vec![rule.clone().with_cidr_blocks(Some(v4))];
        if let Some(v6) = v6 {
            rules.push(rule.with_ipv6_cidr_blocks(Some(v6)));
        }
        Ok(rules)
    }

    fn vpc_cidrs(&self) -> Result<(Ipv4Net, Option<Ipv6Net>), Error> {
        let v4 = self.input.vpc.cidr_block.ok_or(Error::MissingVpcCidr)?;
        Ok((v4, self.input.vpc.ipv6_cidr_block))
    }
}
