use crate::Error;
use sg_controller_core::{
    self as core,
    api::{CloudSecurityGroup, DescribeFilter, GROUP_NOT_FOUND},
    ApiError, ClusterInput, Role, RuleSet, SecurityGroup, SecurityGroupApi,
};
use std::collections::BTreeMap;
use tracing::warn;

/// Describes the groups the cluster owns in its VPC, keyed by name.
pub async fn describe_managed<A: SecurityGroupApi + ?Sized>(
    api: &A,
    vpc_id: &str,
    cluster_name: &str,
) -> Result<BTreeMap<String, SecurityGroup>, Error> {
    let groups = api
        .describe_security_groups(DescribeFilter::ClusterOwned {
            vpc_id: Some(vpc_id.to_string()),
            cluster_name: cluster_name.to_string(),
        })
        .await
        .map_err(Error::api("describe", format!("owned by {cluster_name}")))?;

    groups
        .into_iter()
        .map(|cloud| {
            let sg = security_group(cloud)?;
            Ok((sg.name.clone(), sg))
        })
        .collect()
}

/// Resolves the configured overrides to groups, matching them by ID.
///
/// Returns `None` when no overrides are configured.
pub async fn describe_overrides<A: SecurityGroupApi + ?Sized>(
    api: &A,
    input: &ClusterInput,
) -> Result<Option<BTreeMap<Role, SecurityGroup>>, Error> {
    if input.security_group_overrides.is_empty() {
        return Ok(None);
    }
    if input.vpc.managed {
        let vpc = input.vpc.id.clone().unwrap_or_default();
        return Err(core::Error::OverridesForManagedVpc(vpc).into());
    }

    let mut ids = input
        .security_group_overrides
        .values()
        .cloned()
        .collect::<Vec<_>>();
    ids.sort();
    ids.dedup();
    let described = api
        .describe_security_groups(DescribeFilter::Ids(ids.clone()))
        .await
        .map_err(Error::api("describe", ids.join(",")))?;

    let by_id = described
        .into_iter()
        .map(|cloud| Ok((cloud.id.clone(), security_group(cloud)?)))
        .collect::<Result<BTreeMap<_, _>, Error>>()?;

    let mut overrides = BTreeMap::new();
    for (role, id) in &input.security_group_overrides {
        let sg = match by_id.get(id) {
            Some(sg) => sg.clone(),
            None => {
                return Err(Error::Api {
                    op: "describe",
                    group: id.clone(),
                    source: ApiError::new(
                        GROUP_NOT_FOUND,
                        format!("override for role {role} does not exist"),
                    ),
                })
            }
        };
        overrides.insert(*role, sg);
    }
    Ok(Some(overrides))
}

/// Normalizes a described group, splitting its permissions into one rule per
/// source.
///
/// Permissions using protocols that no managed rule can express are left out
/// so that they are never revoked.
pub fn security_group(cloud: CloudSecurityGroup) -> Result<SecurityGroup, Error> {
    let mut ingress_rules = RuleSet::new();
    for permission in &cloud.ingress {
        match permission.rules() {
            Ok(rules) => ingress_rules.extend(rules),
            Err(core::Error::InvalidProtocol(protocol)) => {
                warn!(group = %cloud.id, %protocol, "Ignoring permission with unsupported protocol");
            }
            Err(source) => {
                return Err(Error::InvalidPermission {
                    group: cloud.id,
                    source,
                })
            }
        }
    }

    Ok(SecurityGroup {
        id: cloud.id,
        name: cloud.name,
        tags: cloud.tags,
        ingress_rules,
    })
}
