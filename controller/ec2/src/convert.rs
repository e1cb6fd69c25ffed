use aws_sdk_ec2::types as ec2;
use sg_controller_core::{
    api::{CloudSecurityGroup, GroupPair, IpPermission, IpRange, Ipv6Range},
    Tags,
};

pub(crate) fn security_group(sg: &ec2::SecurityGroup) -> CloudSecurityGroup {
    CloudSecurityGroup {
        id: sg.group_id().unwrap_or_default().to_string(),
        name: sg.group_name().unwrap_or_default().to_string(),
        vpc_id: sg.vpc_id().map(ToString::to_string),
        tags: sg
            .tags()
            .iter()
            .filter_map(|tag| Some((tag.key()?.to_string(), tag.value()?.to_string())))
            .collect(),
        ingress: sg.ip_permissions().iter().map(ip_permission).collect(),
        egress: sg.ip_permissions_egress().iter().map(ip_permission).collect(),
    }
}

fn ip_permission(permission: &ec2::IpPermission) -> IpPermission {
    IpPermission {
        protocol: permission.ip_protocol().unwrap_or_default().to_string(),
        from_port: permission.from_port(),
        to_port: permission.to_port(),
        ip_ranges: permission
            .ip_ranges()
            .iter()
            .filter_map(|range| {
                Some(IpRange {
                    cidr: range.cidr_ip()?.to_string(),
                    description: range.description().map(ToString::to_string),
                })
            })
            .collect(),
        ipv6_ranges: permission
            .ipv6_ranges()
            .iter()
            .filter_map(|range| {
                Some(Ipv6Range {
                    cidr: range.cidr_ipv6()?.to_string(),
                    description: range.description().map(ToString::to_string),
                })
            })
            .collect(),
        group_pairs: permission
            .user_id_group_pairs()
            .iter()
            .filter_map(|pair| {
                Some(GroupPair {
                    group_id: pair.group_id()?.to_string(),
                    description: pair.description().map(ToString::to_string),
                })
            })
            .collect(),
    }
}

pub(crate) fn permission(permission: &IpPermission) -> ec2::IpPermission {
    let ip_ranges = permission
        .ip_ranges
        .iter()
        .map(|range| {
            ec2::IpRange::builder()
                .cidr_ip(&range.cidr)
                .set_description(range.description.clone())
                .build()
        })
        .collect();
    let ipv6_ranges = permission
        .ipv6_ranges
        .iter()
        .map(|range| {
            ec2::Ipv6Range::builder()
                .cidr_ipv6(&range.cidr)
                .set_description(range.description.clone())
                .build()
        })
        .collect();
    let group_pairs = permission
        .group_pairs
        .iter()
        .map(|pair| {
            ec2::UserIdGroupPair::builder()
                .group_id(&pair.group_id)
                .set_description(pair.description.clone())
                .build()
        })
        .collect();

    ec2::IpPermission::builder()
        .ip_protocol(&permission.protocol)
        .set_from_port(permission.from_port)
        .set_to_port(permission.to_port)
        .set_ip_ranges(Some(ip_ranges))
        .set_ipv6_ranges(Some(ipv6_ranges))
        .set_user_id_group_pairs(Some(group_pairs))
        .build()
}

pub(crate) fn tags(tags: &Tags) -> Vec<ec2::Tag> {
    tags.iter()
        .map(|(key, value)| ec2::Tag::builder().key(key).value(value).build())
        .collect()
}
