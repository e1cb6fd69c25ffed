use super::*;
use maplit::btreemap;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn net(s: &str) -> Ipv4Net {
    s.parse().expect("valid IPv4 network")
}

fn net6(s: &str) -> Ipv6Net {
    s.parse().expect("valid IPv6 network")
}

#[test]
fn expand_yields_one_rule_per_source() {
    let rule = IngressRule::tcp("Kubernetes API", 6443)
        .with_cidr_blocks([net("10.0.0.0/16"), net("10.1.0.0/16")])
        .with_ipv6_cidr_blocks(Some(net6("2001:db8::/56")))
        .with_source_groups(["sg-1", "sg-2"]);

    let expanded = rule.expand();
    assert_eq!(expanded.len(), 5);
    assert!(expanded
        .iter()
        .all(|r| r.description == "Kubernetes API" && r.from_port == 6443 && r.to_port == 6443));
    assert_eq!(
        expanded.iter().map(|r| r.source.clone()).collect::<Vec<_>>(),
        vec![
            Some(Source::Cidr(net("10.0.0.0/16"))),
            Some(Source::Cidr(net("10.1.0.0/16"))),
            Some(Source::Ipv6Cidr(net6("2001:db8::/56"))),
            Some(Source::Group("sg-1".to_string())),
            Some(Source::Group("sg-2".to_string())),
        ]
    );
}

#[test]
fn expand_sourceless_rule() {
    let expanded = IngressRule::tcp("bgp", 179).expand();
    assert_eq!(expanded.len(), 1);
    assert_eq!(expanded[0].source, None);
}

#[test]
fn identity_ignores_description() {
    let a = IngressRule::tcp("SSH", 22).with_cidr_blocks(Some(net("10.0.0.0/8")));
    let b = IngressRule::tcp("ssh access", 22).with_cidr_blocks(Some(net("10.0.0.0/8")));
    assert_eq!(rule_set::expand([&a]), rule_set::expand([&b]));
}

#[test]
fn identity_ignores_ports_without_port_semantics() {
    let a = IngressRule::new("ip-in-ip", Protocol::IpInIp, -1, 65535).with_source_groups(["sg-1"]);
    let b = IngressRule::new("ip-in-ip", Protocol::IpInIp, 0, 0).with_source_groups(["sg-1"]);
    assert_eq!(rule_set::expand([&a]), rule_set::expand([&b]));

    let a = IngressRule::new("dns", Protocol::Udp, 53, 53).with_source_groups(["sg-1"]);
    let b = IngressRule::new("dns", Protocol::Udp, 54, 54).with_source_groups(["sg-1"]);
    assert_ne!(rule_set::expand([&a]), rule_set::expand([&b]));
}

#[test]
fn rule_set_deduplicates_in_insertion_order() {
    let a = IngressRule::tcp("a", 1).with_source_groups(["sg-1", "sg-2"]);
    let b = IngressRule::tcp("b", 1).with_source_groups(["sg-2", "sg-3"]);
    let set = rule_set::expand([&a, &b]);
    assert_eq!(set.len(), 3);
    assert_eq!(
        set.iter().map(|r| r.description.as_str()).collect::<Vec<_>>(),
        vec!["a", "a", "b"]
    );
}

#[test]
fn difference_and_intersection_partition() {
    let desired = rule_set::expand([&IngressRule::tcp("x", 80).with_source_groups(["sg-1", "sg-2"])]);
    let observed = rule_set::expand([&IngressRule::tcp("x", 80).with_source_groups(["sg-2", "sg-3"])]);

    let to_authorize = desired.difference(&observed);
    let to_revoke = observed.difference(&desired);
    let kept = desired.intersection(&observed);

    assert_eq!(to_authorize.len(), 1);
    assert_eq!(to_revoke.len(), 1);
    assert_eq!(kept.len(), 1);
    assert!(to_authorize.intersection(&observed).is_empty());
    assert!(to_revoke.intersection(&desired).is_empty());
    assert_eq!(kept.union(&to_authorize), desired);
}

#[test]
fn converged_sets_have_no_diff() {
    let rules = [
        IngressRule::tcp("SSH", 22).with_cidr_blocks(Some(any_ipv4())),
        IngressRule::tcp("Kubelet API", 10250).with_source_groups(["sg-1", "sg-2"]),
    ];
    let desired = rule_set::expand(&rules);
    let observed = rule_set::expand(rules.iter().rev());
    assert!(desired.difference(&observed).is_empty());
    assert!(observed.difference(&desired).is_empty());
}

#[test]
fn rule_round_trips_through_ingress_rule() {
    let rule = IngressRule::tcp("etcd", 2379)
        .with_source_groups(["sg-1"])
        .expand()
        .remove(0);
    let back = IngressRule::from(rule.clone()).expand();
    assert_eq!(back, vec![rule]);
}

#[rstest]
#[case::all("-1", Protocol::All)]
#[case::ip_in_ip("4", Protocol::IpInIp)]
#[case::tcp("tcp", Protocol::Tcp)]
#[case::tcp_number("6", Protocol::Tcp)]
#[case::udp("udp", Protocol::Udp)]
#[case::icmp("icmp", Protocol::Icmp)]
#[case::icmpv6("58", Protocol::Icmpv6)]
#[case::esp("50", Protocol::Esp)]
fn protocol_parses(#[case] s: &str, #[case] expected: Protocol) {
    assert_eq!(s.parse::<Protocol>().expect("protocol must parse"), expected);
}

#[test]
fn protocol_rejects_unknown() {
    assert!(matches!(
        "gre".parse::<Protocol>(),
        Err(Error::InvalidProtocol(s)) if s == "gre"
    ));
}

#[rstest]
#[case::bastion(Role::Bastion, "bastion")]
#[case::node(Role::Node, "node")]
#[case::eks_node_additional(Role::EksNodeAdditional, "node-eks-additional")]
#[case::control_plane(Role::ControlPlane, "control-plane")]
#[case::apiserver_lb(Role::ApiServerLb, "apiserver-lb")]
#[case::lb(Role::Lb, "lb")]
fn role_names(#[case] role: Role, #[case] name: &str) {
    assert_eq!(role.to_string(), name);
    assert_eq!(name.parse::<Role>().expect("role must parse"), role);
    assert_eq!(tags::group_name("test", role), format!("test-{name}"));
}

#[test]
fn group_name_is_never_an_id() {
    assert_eq!(tags::group_name("sg-cluster", Role::Node), "@sg-cluster-node");
    for role in Role::ALL {
        assert!(!tags::group_name("sg-cluster", role).starts_with("sg-"));
    }
}

#[test]
fn role_names_are_unique() {
    let names = Role::ALL
        .iter()
        .map(|role| tags::group_name("c", *role))
        .collect::<std::collections::BTreeSet<_>>();
    assert_eq!(names.len(), Role::ALL.len());
}

#[test]
fn only_lb_carries_cloud_provider_tag() {
    let input = ClusterInput {
        cluster_name: "test".to_string(),
        kubernetes_cluster_name: Some("k8s-test".to_string()),
        additional_tags: btreemap! {
            "team".to_string() => "infra".to_string(),
            "kubernetes.io/cluster/k8s-test".to_string() => "shared".to_string(),
        },
        ..Default::default()
    };

    for role in Role::ALL {
        let name = tags::group_name(&input.cluster_name, role);
        let tags = tags::build(&input, &name, role);
        assert_eq!(
            tags::has_cloud_provider_owned(&tags, "k8s-test"),
            role == Role::Lb,
            "{role}"
        );
        if role != Role::Lb {
            assert!(!tags.contains_key("kubernetes.io/cluster/k8s-test"));
        }
        assert_eq!(tags.get("team").map(String::as_str), Some("infra"));
        assert_eq!(tags.get("Name"), Some(&name));
        assert_eq!(
            tags.get(tags::ROLE_TAG_KEY).map(String::as_str),
            Some(role.as_str())
        );
        assert_eq!(
            tags.get("sigs.k8s.io/cluster-api-provider-aws/cluster/test")
                .map(String::as_str),
            Some("owned")
        );
    }
}

#[test]
fn missing_tags() {
    let current = btreemap! {
        "a".to_string() => "1".to_string(),
        "b".to_string() => "2".to_string(),
        "extra".to_string() => "x".to_string(),
    };
    let desired = btreemap! {
        "a".to_string() => "1".to_string(),
        "b".to_string() => "3".to_string(),
        "c".to_string() => "4".to_string(),
    };
    assert_eq!(
        tags::missing(&current, &desired),
        btreemap! {
            "b".to_string() => "3".to_string(),
            "c".to_string() => "4".to_string(),
        }
    );
}
