use super::*;
use crate::Error;
use maplit::btreemap;
use pretty_assertions::assert_eq;
use sg_controller_core::{
    api::{GroupPair, IpRange, GROUP_NOT_FOUND},
    rule_set, ConditionReason, IngressRule, LoadBalancerInput, LoadBalancerType, RuleSet,
};

const ROLES: [Role; 3] = [Role::ControlPlane, Role::Node, Role::ApiServerLb];

fn tcp_from(port: i32, cidr: &str) -> IpPermission {
    IpPermission {
        protocol: "tcp".to_string(),
        from_port: Some(port),
        to_port: Some(port),
        ip_ranges: vec![IpRange {
            cidr: cidr.to_string(),
            description: None,
        }],
        ..Default::default()
    }
}

fn owned_group(id: &str, name: &str) -> CloudSecurityGroup {
    CloudSecurityGroup {
        id: id.to_string(),
        name: name.to_string(),
        vpc_id: Some(VPC.to_string()),
        tags: btreemap! {
            tags::cluster_tag_key("test") => "owned".to_string(),
        },
        ..Default::default()
    }
}

fn authorized(calls: &[Call], group: &str) -> Vec<Vec<IpPermission>> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::Authorize { group: g, permissions } if g == group => Some(permissions.clone()),
            _ => None,
        })
        .collect()
}

fn revokes(calls: &[Call]) -> Vec<&Call> {
    calls
        .iter()
        .filter(|call| matches!(call, Call::RevokeIngress { .. }))
        .collect()
}

fn as_rule_set(permissions: &[IpPermission]) -> RuleSet {
    permissions
        .iter()
        .flat_map(|p| p.rules().expect("permission must be valid"))
        .collect()
}

#[tokio::test]
async fn creates_groups_and_authorizes_rules() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    let input = input(ROLES);
    let mut state = ClusterState::default();

    reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");

    let cp = api.group_named("test-control-plane");
    let node = api.group_named("test-node");
    let lb = api.group_named("test-apiserver-lb");
    assert_eq!(
        cp.tags.get(tags::ROLE_TAG_KEY).map(String::as_str),
        Some("control-plane")
    );

    let calls = api.calls();
    let creates = calls
        .iter()
        .filter(|call| matches!(call, Call::Create { .. }))
        .count();
    assert_eq!(creates, 3);
    assert!(revokes(&calls).is_empty());

    let cp_authorized = authorized(&calls, &cp.id);
    assert_eq!(cp_authorized.len(), 1, "one authorize call for the control plane");
    let expected = rule_set::expand(&[
        IngressRule::tcp("Kubernetes API", 6443).with_source_groups([&lb.id, &cp.id, &node.id]),
        IngressRule::tcp("etcd", 2379).with_source_groups([&cp.id]),
        IngressRule::tcp("etcd peer", 2380).with_source_groups([&cp.id]),
    ]);
    assert_eq!(cp_authorized[0].len(), 5);
    assert_eq!(as_rule_set(&cp_authorized[0]), expected);

    assert_eq!(
        state.security_groups.keys().copied().collect::<Vec<_>>(),
        vec![Role::Node, Role::ControlPlane, Role::ApiServerLb]
    );
    assert_eq!(state.group_id(Role::ControlPlane), Some(cp.id.as_str()));
    assert_eq!(state.security_groups[&Role::ControlPlane].ingress_rules, expected);
    assert!(state.condition.as_ref().is_some_and(|c| c.ready));
    assert!(recorder
        .reasons()
        .contains(&"SuccessfulAuthorizeSecurityGroupIngressRules"));
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    let input = input(ROLES);
    let reconciler = reconciler(&api);

    let mut state = ClusterState::default();
    reconciler
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");
    api.take_calls();

    let mut state = ClusterState::default();
    reconciler
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");
    assert_eq!(FakeApi::mutations(&api.calls()), Vec::<&Call>::new());
}

#[tokio::test]
async fn revokes_stale_rule() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    let input = input(ROLES);
    let reconciler = reconciler(&api);

    let mut state = ClusterState::default();
    reconciler
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");

    let cp = api.group_named("test-control-plane").id;
    let stale = tcp_from(22, "0.0.0.0/0");
    api.0
        .lock()
        .groups
        .get_mut(&cp)
        .expect("group must exist")
        .ingress
        .push(stale.clone());
    api.take_calls();

    reconciler
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");
    let calls = api.take_calls();
    assert_eq!(
        FakeApi::mutations(&calls),
        vec![&Call::RevokeIngress {
            group: cp.clone(),
            permissions: vec![stale],
        }]
    );
    assert_eq!(api.group(&cp).ingress.len(), 5);
}

fn count_calls(api: &FakeApi, matches: impl Fn(&Call) -> bool) -> usize {
    api.calls().iter().filter(|call| matches(call)).count()
}

#[tokio::test(start_paused = true)]
async fn retries_authorizing_on_a_group_not_yet_visible() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    api.fail_next("authorize", GROUP_NOT_FOUND);

    let input = input([Role::Bastion]);
    let mut state = ClusterState::default();
    reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");

    assert_eq!(count_calls(&api, |c| matches!(c, Call::Authorize { .. })), 2);
    assert_eq!(api.group_named("test-bastion").ingress.len(), 1);
    assert!(state.condition.expect("condition must be set").ready);
}

#[tokio::test(start_paused = true)]
async fn retries_revoking_on_a_group_not_yet_visible() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    let input = input([Role::Bastion]);
    let reconciler = reconciler(&api);

    let mut state = ClusterState::default();
    reconciler
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");

    let id = api.group_named("test-bastion").id;
    api.0
        .lock()
        .groups
        .get_mut(&id)
        .expect("group must exist")
        .ingress
        .push(tcp_from(80, "0.0.0.0/0"));
    api.take_calls();
    api.fail_next("revoke_ingress", GROUP_NOT_FOUND);

    reconciler
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");

    assert_eq!(count_calls(&api, |c| matches!(c, Call::RevokeIngress { .. })), 2);
    assert_eq!(api.group(&id).ingress.len(), 1);
}

#[tokio::test]
async fn rule_changes_fail_on_other_errors() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    api.fail_next("authorize", "UnauthorizedOperation");

    let input = input([Role::Bastion]);
    let mut state = ClusterState::default();
    let error = reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect_err("authorizing must fail");

    assert!(matches!(error, Error::Api { op: "authorize ingress on", .. }));
    assert_eq!(count_calls(&api, |c| matches!(c, Call::Authorize { .. })), 1);
    assert!(recorder.reasons().contains(&"FailedAuthorizeSecurityGroupIngressRules"));
    let condition = state.condition.expect("condition must be set");
    assert!(!condition.ready);
    assert_eq!(condition.reason, Some(ConditionReason::ReconciliationFailed));
}

#[tokio::test]
async fn overrides_are_never_created_or_modified() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    api.add_group(CloudSecurityGroup {
        id: "sg-custom".to_string(),
        name: "custom-nodes".to_string(),
        vpc_id: Some(VPC.to_string()),
        ingress: vec![tcp_from(8080, "1.2.3.4/32")],
        ..Default::default()
    });

    let mut input = input(ROLES);
    input.vpc.managed = false;
    input.security_group_overrides = btreemap! { Role::Node => "sg-custom".to_string() };
    let mut state = ClusterState::default();

    reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");

    let calls = api.calls();
    for call in FakeApi::mutations(&calls) {
        match call {
            Call::Create { name } => assert_ne!(name, "test-node"),
            Call::Authorize { group, .. }
            | Call::RevokeIngress { group, .. }
            | Call::CreateTags { group, .. } => assert_ne!(group, "sg-custom"),
            call => panic!("unexpected call: {call:?}"),
        }
    }
    assert_eq!(state.group_id(Role::Node), Some("sg-custom"));
    assert_eq!(api.group("sg-custom").ingress, vec![tcp_from(8080, "1.2.3.4/32")]);

    // The override is still used as a peer.
    let cp = api.group_named("test-control-plane");
    assert!(cp
        .ingress
        .iter()
        .any(|p| p.group_pairs.iter().any(|g| g.group_id == "sg-custom")));
}

#[tokio::test]
async fn overrides_require_unmanaged_vpc() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    let mut input = input(ROLES);
    input.security_group_overrides = btreemap! { Role::Node => "sg-custom".to_string() };
    let mut state = ClusterState::default();

    let error = reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect_err("overrides are not allowed");
    assert!(matches!(
        error,
        Error::Config(sg_controller_core::Error::OverridesForManagedVpc(ref vpc)) if vpc == VPC
    ));
    assert!(!error.is_not_ready());
    assert!(FakeApi::mutations(&api.calls()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn retries_tagging_a_group_not_yet_visible() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    api.add_group(owned_group("sg-bastion", "test-bastion"));
    api.fail_next("create_tags", GROUP_NOT_FOUND);

    let input = input([Role::Bastion]);
    let mut state = ClusterState::default();
    reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");

    let tag_calls = api
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::CreateTags { .. }))
        .count();
    assert_eq!(tag_calls, 2);
    let sg = api.group("sg-bastion");
    assert_eq!(sg.tags.get("Name").map(String::as_str), Some("test-bastion"));
    assert_eq!(
        state.security_groups[&Role::Bastion].tags.get(tags::ROLE_TAG_KEY),
        Some(&"bastion".to_string())
    );
}

#[tokio::test]
async fn tagging_fails_on_other_errors() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    api.add_group(owned_group("sg-bastion", "test-bastion"));
    api.fail_next("create_tags", "UnauthorizedOperation");

    let input = input([Role::Bastion]);
    let mut state = ClusterState::default();
    let error = reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect_err("tagging must fail");

    assert!(matches!(error, Error::Api { op: "tag", ref group, .. } if group == "sg-bastion"));
    let condition = state.condition.expect("condition must be set");
    assert!(!condition.ready);
    assert_eq!(condition.reason, Some(ConditionReason::ReconciliationFailed));
    assert!(recorder.reasons().contains(&"FailedTagSecurityGroup"));
    assert_eq!(
        api.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::CreateTags { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn nat_sourced_rule_is_not_ready() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    let mut input = input(ROLES);
    input.control_plane_load_balancers = vec![LoadBalancerInput {
        ingress_rules: vec![IngressRule {
            nat_gateways_ips_source: true,
            ..IngressRule::tcp("from NAT", 6443)
        }],
        ..Default::default()
    }];
    let mut state = ClusterState::default();

    let error = reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect_err("NAT IPs are not known");
    assert!(error.is_not_ready());

    let condition = state.condition.expect("condition must be set");
    assert_eq!(condition.reason, Some(ConditionReason::ReconciliationFailed));
    assert!(condition
        .message
        .is_some_and(|m| m.contains("NAT gateway IPs")));

    let lb = api.group_named("test-apiserver-lb");
    assert!(authorized(&api.calls(), &lb.id).is_empty());
}

#[tokio::test]
async fn cloud_provider_rules_are_kept() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    let mut input = input([Role::ControlPlane, Role::Node, Role::ApiServerLb, Role::Lb]);
    let reconciler = reconciler(&api);

    let mut state = ClusterState::default();
    reconciler
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");
    let lb = api.group_named("test-lb");
    assert!(tags::has_cloud_provider_owned(&lb.tags, "test"));
    assert!(authorized(&api.take_calls(), &lb.id).is_empty());

    // The cloud provider opens a port for a service.
    api.0
        .lock()
        .groups
        .get_mut(&lb.id)
        .expect("group must exist")
        .ingress
        .push(tcp_from(443, "0.0.0.0/0"));

    input.control_plane_load_balancers = vec![LoadBalancerInput {
        load_balancer_type: LoadBalancerType::Nlb,
        ..Default::default()
    }];
    reconciler
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");

    let calls = api.take_calls();
    assert!(revokes(&calls).is_empty());
    let mut expected = tcp_from(6443, "10.0.0.0/16");
    expected.ip_ranges[0].description = Some("Kubernetes API".to_string());
    assert_eq!(authorized(&calls, &lb.id), vec![vec![expected]]);
    assert_eq!(api.group(&lb.id).ingress.len(), 2);
}

#[tokio::test]
async fn eks_owned_groups_are_left_alone() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    let mut eks = owned_group("sg-eks", "test-node");
    eks.tags
        .insert(tags::EKS_CLUSTER_NAME_TAG_KEY.to_string(), "test".to_string());
    eks.ingress = vec![tcp_from(9999, "0.0.0.0/0")];
    api.add_group(eks);

    let input = input(ROLES);
    let mut state = ClusterState::default();
    reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect("reconcile must succeed");

    assert_eq!(state.group_id(Role::Node), Some("sg-eks"));
    for call in FakeApi::mutations(&api.calls()) {
        match call {
            Call::Create { name } => assert_ne!(name, "test-node"),
            Call::Authorize { group, .. }
            | Call::RevokeIngress { group, .. }
            | Call::CreateTags { group, .. } => assert_ne!(group, "sg-eks"),
            call => panic!("unexpected call: {call:?}"),
        }
    }
}

#[tokio::test]
async fn hardens_default_group_once() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    api.add_group(CloudSecurityGroup {
        id: "sg-default".to_string(),
        name: "default".to_string(),
        vpc_id: Some(VPC.to_string()),
        ingress: vec![IpPermission {
            protocol: "-1".to_string(),
            group_pairs: vec![GroupPair {
                group_id: "sg-default".to_string(),
                description: None,
            }],
            ..Default::default()
        }],
        egress: vec![IpPermission {
            protocol: "-1".to_string(),
            ip_ranges: vec![IpRange {
                cidr: "0.0.0.0/0".to_string(),
                description: None,
            }],
            ..Default::default()
        }],
        ..Default::default()
    });

    let mut input = input([Role::Bastion]);
    input.vpc.empty_routes_default_security_group = true;
    let reconciler = reconciler(&api);

    let mut state = ClusterState::default();
    for _ in 0..2 {
        reconciler
            .reconcile(&input, &mut state, &recorder)
            .await
            .expect("reconcile must succeed");
    }

    let default = api.group("sg-default");
    assert!(default.ingress.is_empty());
    assert!(default.egress.is_empty());
    assert_eq!(
        recorder
            .reasons()
            .into_iter()
            .filter(|r| *r == "SuccessfulRevokeDefaultSecurityGroupRules")
            .count(),
        1
    );
    assert!(!state.security_groups.values().any(|sg| sg.id == "sg-default"));
}

#[tokio::test]
async fn requires_vpc() {
    let api = FakeApi::default();
    let recorder = TestRecorder::default();
    let mut input = input(ROLES);
    input.vpc.id = None;
    let mut state = ClusterState::default();

    let error = reconciler(&api)
        .reconcile(&input, &mut state, &recorder)
        .await
        .expect_err("VPC is not known");
    assert!(error.is_not_ready());
    assert!(api.calls().is_empty());
}
