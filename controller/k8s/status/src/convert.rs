//! Translates between the `ClusterSecurityGroups` resource and the
//! reconciliation input and state.

use sg_controller_core::{
    self as core, BastionInput, ClusterInput, ClusterState, CniIngressRule, Condition,
    ConditionReason, IngressRule, Ipv4Net, Ipv6Net, Listener, ListenerProtocol,
    LoadBalancerInput, LoadBalancerScheme, LoadBalancerType, Role, SecurityGroup, VpcInput,
    DEFAULT_API_SERVER_PORT, SECURITY_GROUPS_READY,
};
use sg_controller_k8s_api::{self as k8s, cluster_security_groups as api};
use std::{collections::BTreeMap, net::Ipv4Addr};

const READY_REASON: &str = "SecurityGroupsReady";

const REASONS: [ConditionReason; 4] = [
    ConditionReason::ReconciliationFailed,
    ConditionReason::Deleting,
    ConditionReason::DeletionFailed,
    ConditionReason::Deleted,
];

/// Builds the input for processing a resource.
///
/// Deleting a cluster's groups only needs its name and VPC, so a resource
/// that is being deleted never fails validation. Otherwise it could not be
/// finalized.
pub(crate) fn input_for(
    spec: &k8s::ClusterSecurityGroupsSpec,
    deleting: bool,
) -> Result<ClusterInput, core::Error> {
    if deleting {
        return Ok(deletion_input(spec));
    }
    cluster_input(spec)
}

fn deletion_input(spec: &k8s::ClusterSecurityGroupsSpec) -> ClusterInput {
    ClusterInput {
        cluster_name: spec.cluster_name.clone(),
        kubernetes_cluster_name: spec.kubernetes_cluster_name.clone(),
        vpc: VpcInput {
            id: spec.vpc.id.clone(),
            managed: spec.vpc.managed,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Validates a resource's spec into the input of a reconciliation.
pub(crate) fn cluster_input(spec: &k8s::ClusterSecurityGroupsSpec) -> Result<ClusterInput, core::Error> {
    let roles = match &spec.roles {
        Some(roles) => roles
            .iter()
            .map(|r| r.parse::<Role>())
            .collect::<Result<Vec<_>, _>>()?,
        None => ClusterInput::DEFAULT_ROLES.to_vec(),
    };

    let security_group_overrides = spec
        .security_group_overrides
        .iter()
        .flatten()
        .map(|(role, id)| Ok((role.parse::<Role>()?, id.clone())))
        .collect::<Result<BTreeMap<_, _>, core::Error>>()?;

    let bastion = match &spec.bastion {
        Some(bastion) => BastionInput {
            enabled: bastion.enabled,
            allowed_cidr_blocks: ipv4_nets(bastion.allowed_cidr_blocks.iter().flatten())?,
        },
        None => BastionInput::default(),
    };

    let node_port_ingress_cidr_blocks = spec
        .node_port_ingress_cidr_blocks
        .as_ref()
        .map(|nets| ipv4_nets(nets))
        .transpose()?;

    let cni_ingress_rules = spec
        .cni_ingress_rules
        .as_ref()
        .map(|rules| rules.iter().map(cni_ingress_rule).collect::<Result<Vec<_>, _>>())
        .transpose()?;

    let nat_gateway_ips = spec
        .nat_gateway_ips
        .iter()
        .flatten()
        .map(|ip| ip.parse::<Ipv4Addr>().map_err(|_| core::Error::InvalidCidr(ip.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClusterInput {
        cluster_name: spec.cluster_name.clone(),
        kubernetes_cluster_name: spec.kubernetes_cluster_name.clone(),
        vpc: vpc(&spec.vpc)?,
        roles,
        api_server_port: spec.api_server_port.unwrap_or(DEFAULT_API_SERVER_PORT),
        bastion,
        node_port_ingress_cidr_blocks,
        additional_control_plane_ingress_rules: ingress_rules(
            spec.additional_control_plane_ingress_rules.iter().flatten(),
        )?,
        cni_ingress_rules,
        control_plane_load_balancers: spec
            .control_plane_load_balancers
            .iter()
            .flatten()
            .map(load_balancer)
            .collect::<Result<Vec<_>, _>>()?,
        nat_gateway_ips,
        security_group_overrides,
        additional_tags: spec.additional_tags.clone().unwrap_or_default(),
    })
}

fn vpc(spec: &api::VpcSpec) -> Result<VpcInput, core::Error> {
    let cidr_block = spec.cidr_block.as_deref().map(ipv4_net).transpose()?;
    let ipv6_cidr_block = spec.ipv6_cidr_block.as_deref().map(ipv6_net).transpose()?;
    Ok(VpcInput {
        id: spec.id.clone(),
        cidr_block,
        ipv6_enabled: ipv6_cidr_block.is_some(),
        ipv6_cidr_block,
        managed: spec.managed,
        empty_routes_default_security_group: spec.empty_routes_default_vpc_security_group,
    })
}

fn load_balancer(spec: &api::LoadBalancerSpec) -> Result<LoadBalancerInput, core::Error> {
    let scheme = match spec.scheme {
        Some(api::LoadBalancerScheme::Internal) => LoadBalancerScheme::Internal,
        Some(api::LoadBalancerScheme::InternetFacing) | None => LoadBalancerScheme::InternetFacing,
    };
    let load_balancer_type = match spec.load_balancer_type {
        Some(api::LoadBalancerType::Classic) | None => LoadBalancerType::Classic,
        Some(api::LoadBalancerType::Elb) => LoadBalancerType::Elb,
        Some(api::LoadBalancerType::Alb) => LoadBalancerType::Alb,
        Some(api::LoadBalancerType::Nlb) => LoadBalancerType::Nlb,
    };
    let additional_listeners = spec
        .additional_listeners
        .iter()
        .flatten()
        .map(|listener| Listener {
            port: listener.port,
            protocol: match listener.protocol {
                Some(api::ListenerProtocol::Tcp) | None => ListenerProtocol::Tcp,
                Some(api::ListenerProtocol::Tls) => ListenerProtocol::Tls,
                Some(api::ListenerProtocol::Udp) => ListenerProtocol::Udp,
            },
        })
        .collect();

    Ok(LoadBalancerInput {
        scheme,
        load_balancer_type,
        ingress_rules: ingress_rules(spec.ingress_rules.iter().flatten())?,
        preserve_client_ip: spec.preserve_client_ip,
        additional_listeners,
    })
}

fn ingress_rules<'a>(
    specs: impl IntoIterator<Item = &'a api::IngressRuleSpec>,
) -> Result<Vec<IngressRule>, core::Error> {
    specs.into_iter().map(ingress_rule).collect()
}

fn ingress_rule(spec: &api::IngressRuleSpec) -> Result<IngressRule, core::Error> {
    Ok(IngressRule {
        description: spec.description.clone(),
        protocol: spec.protocol.parse()?,
        from_port: spec.from_port,
        to_port: spec.to_port,
        cidr_blocks: ipv4_nets(spec.cidr_blocks.iter().flatten())?,
        ipv6_cidr_blocks: spec
            .ipv6_cidr_blocks
            .iter()
            .flatten()
            .map(|net| ipv6_net(net))
            .collect::<Result<Vec<_>, _>>()?,
        source_security_group_ids: spec.source_security_group_ids.clone().unwrap_or_default(),
        source_security_group_roles: spec
            .source_security_group_roles
            .iter()
            .flatten()
            .map(|role| role.parse::<Role>())
            .collect::<Result<Vec<_>, _>>()?,
        nat_gateways_ips_source: spec.nat_gateways_ips_source,
    })
}

fn cni_ingress_rule(spec: &api::CniIngressRuleSpec) -> Result<CniIngressRule, core::Error> {
    Ok(CniIngressRule {
        description: spec.description.clone(),
        protocol: spec.protocol.parse()?,
        from_port: spec.from_port,
        to_port: spec.to_port,
    })
}

fn ipv4_nets<'a>(nets: impl IntoIterator<Item = &'a String>) -> Result<Vec<Ipv4Net>, core::Error> {
    nets.into_iter().map(|net| ipv4_net(net)).collect()
}

fn ipv4_net(net: &str) -> Result<Ipv4Net, core::Error> {
    net.parse()
        .map_err(|_| core::Error::InvalidCidr(net.to_string()))
}

fn ipv6_net(net: &str) -> Result<Ipv6Net, core::Error> {
    net.parse()
        .map_err(|_| core::Error::InvalidCidr(net.to_string()))
}

/// Restores the groups and condition recorded by earlier reconciliations.
///
/// Roles this version doesn't know are dropped.
pub(crate) fn cluster_state(status: Option<&k8s::ClusterSecurityGroupsStatus>) -> ClusterState {
    let Some(status) = status else {
        return ClusterState::default();
    };

    let security_groups = status
        .security_groups
        .iter()
        .filter_map(|(role, sg)| {
            let role = role.parse::<Role>().ok()?;
            let sg = SecurityGroup {
                id: sg.id.clone(),
                name: sg.name.clone(),
                tags: sg.tags.clone(),
                ..Default::default()
            };
            Some((role, sg))
        })
        .collect();

    let condition = status
        .conditions
        .iter()
        .find(|c| c.type_ == SECURITY_GROUPS_READY)
        .map(|c| Condition {
            ready: c.status == "True",
            reason: REASONS.into_iter().find(|r| r.as_str() == c.reason),
            message: Some(c.message.clone()).filter(|m| !m.is_empty()),
        });

    ClusterState {
        security_groups,
        condition,
    }
}

/// Builds the status describing `state`.
///
/// Conditions of other types are kept. The transition time of the ready
/// condition only moves when its status does, so that an unchanged state
/// yields an identical status.
pub(crate) fn status(
    state: &ClusterState,
    previous: Option<&k8s::ClusterSecurityGroupsStatus>,
    generation: Option<i64>,
    now: k8s::Time,
) -> k8s::ClusterSecurityGroupsStatus {
    let previous_conditions = previous.map(|s| s.conditions.as_slice()).unwrap_or_default();

    let mut conditions = previous_conditions
        .iter()
        .filter(|c| c.type_ != SECURITY_GROUPS_READY)
        .cloned()
        .collect::<Vec<_>>();
    if let Some(condition) = &state.condition {
        let status = if condition.ready { "True" } else { "False" };
        let last_transition_time = previous_conditions
            .iter()
            .find(|c| c.type_ == SECURITY_GROUPS_READY && c.status == status)
            .map(|c| c.last_transition_time.clone())
            .unwrap_or(now);
        conditions.push(k8s::Condition {
            type_: SECURITY_GROUPS_READY.to_string(),
            status: status.to_string(),
            reason: condition
                .reason
                .map(|r| r.as_str())
                .unwrap_or(READY_REASON)
                .to_string(),
            message: condition.message.clone().unwrap_or_default(),
            observed_generation: generation,
            last_transition_time,
        });
    }

    let security_groups = state
        .security_groups
        .iter()
        .map(|(role, sg)| {
            let status = k8s::SecurityGroupStatus {
                id: sg.id.clone(),
                name: sg.name.clone(),
                tags: sg.tags.clone(),
            };
            (role.to_string(), status)
        })
        .collect();

    k8s::ClusterSecurityGroupsStatus {
        conditions,
        security_groups,
    }
}

/// A merge patch replacing `previous` with `status`.
///
/// Merge patches only remove map keys that are explicitly nulled, so roles
/// that are no longer reconciled are nulled out.
pub(crate) fn status_patch(
    previous: Option<&k8s::ClusterSecurityGroupsStatus>,
    status: &k8s::ClusterSecurityGroupsStatus,
) -> serde_json::Value {
    let mut groups = status
        .security_groups
        .iter()
        .map(|(role, sg)| (role.clone(), serde_json::json!(sg)))
        .collect::<BTreeMap<_, _>>();
    for role in previous.iter().flat_map(|s| s.security_groups.keys()) {
        groups.entry(role.clone()).or_insert(serde_json::Value::Null);
    }

    serde_json::json!({
        "status": {
            "conditions": status.conditions,
            "securityGroups": groups,
        }
    })
}
