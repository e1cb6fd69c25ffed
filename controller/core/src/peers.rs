use crate::{ClusterInput, Error, IngressRule, Role, SecurityGroup};
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, BTreeSet};

/// Returns the ID of the group reconciled for `role`.
pub fn group_id(groups: &BTreeMap<Role, SecurityGroup>, role: Role) -> Result<&str, Error> {
    groups
        .get(&role)
        .map(|sg| sg.id.as_str())
        .filter(|id| !id.is_empty())
        .ok_or(Error::MissingSecurityGroup(role))
}

/// Resolves the symbolic sources of user-supplied rules into concrete ones.
///
/// In order of precedence, a rule is sourced from:
///
/// 1. the NAT gateway IPs, when it asks for them;
/// 2. its own CIDR blocks, when it has any;
/// 3. the control plane group, when it names no source at all;
/// 4. its source group IDs plus the groups of its source roles.
///
/// Either every rule resolves or none is returned.
pub fn resolve(
    input: &ClusterInput,
    groups: &BTreeMap<Role, SecurityGroup>,
    rules: &[IngressRule],
) -> Result<Vec<IngressRule>, Error> {
    rules
        .iter()
        .map(|rule| resolve_rule(input, groups, rule))
        .collect()
}

fn resolve_rule(
    input: &ClusterInput,
    groups: &BTreeMap<Role, SecurityGroup>,
    rule: &IngressRule,
) -> Result<IngressRule, Error> {
    let mut rule = rule.clone();

    if rule.nat_gateways_ips_source {
        if input.nat_gateway_ips.is_empty() {
            return Err(Error::NatGatewayIpsNotReady(rule.description));
        }
        rule.cidr_blocks = input
            .nat_gateway_ips
            .iter()
            .map(|ip| Ipv4Net::from(*ip))
            .collect();
        return Ok(rule);
    }

    if rule.has_cidr_blocks() {
        return Ok(rule);
    }

    if rule.source_security_group_ids.is_empty() && rule.source_security_group_roles.is_empty() {
        rule.source_security_group_ids = vec![group_id(groups, Role::ControlPlane)?.to_string()];
        return Ok(rule);
    }

    let mut ids = rule
        .source_security_group_ids
        .drain(..)
        .collect::<BTreeSet<_>>();
    for role in rule.source_security_group_roles.drain(..) {
        ids.insert(group_id(groups, role)?.to_string());
    }
    rule.source_security_group_ids = ids.into_iter().collect();
    Ok(rule)
}
