use crate::{Error, Event, Recorder};
use sg_controller_core::{
    any_ipv4,
    api::{DescribeFilter, GroupPair, IpPermission, IpRange},
    Protocol, SecurityGroupApi,
};
use tracing::{debug, info};

/// The name of the group every VPC is created with.
pub const DEFAULT_GROUP_NAME: &str = "default";

/// Removes the rules the VPC's default group is created with: all traffic
/// from members of the group itself, and all traffic out.
///
/// The default group cannot be deleted and no managed role uses it.
pub async fn harden<A: SecurityGroupApi + ?Sized>(
    api: &A,
    vpc_id: &str,
    recorder: &dyn Recorder,
) -> Result<(), Error> {
    let groups = api
        .describe_security_groups(DescribeFilter::Names {
            vpc_id: vpc_id.to_string(),
            names: vec![DEFAULT_GROUP_NAME.to_string()],
        })
        .await
        .map_err(Error::api("describe", DEFAULT_GROUP_NAME))?;
    let Some(default) = groups.into_iter().next() else {
        debug!(vpc = %vpc_id, "VPC has no default security group");
        return Ok(());
    };

    let all_from_self = IpPermission {
        protocol: Protocol::All.as_str().to_string(),
        group_pairs: vec![GroupPair {
            group_id: default.id.clone(),
            description: None,
        }],
        ..Default::default()
    };
    let all_out = IpPermission {
        protocol: Protocol::All.as_str().to_string(),
        ip_ranges: vec![IpRange {
            cidr: any_ipv4().to_string(),
            description: None,
        }],
        ..Default::default()
    };

    let mut revoked = false;
    match api.revoke_ingress(&default.id, vec![all_from_self]).await {
        Ok(()) => revoked = true,
        Err(error) if error.is_permission_not_found() => {}
        Err(error) => return Err(Error::api("revoke ingress from", &default.id)(error)),
    }
    match api.revoke_egress(&default.id, vec![all_out]).await {
        Ok(()) => revoked = true,
        Err(error) if error.is_permission_not_found() => {}
        Err(error) => return Err(Error::api("revoke egress from", &default.id)(error)),
    }

    if revoked {
        info!(group = %default.id, "Removed rules from the VPC's default security group");
        recorder.event(Event::normal(
            "SuccessfulRevokeDefaultSecurityGroupRules",
            format!("Revoked default security group rules from {}", default.id),
        ));
    }
    Ok(())
}
