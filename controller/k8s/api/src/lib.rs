#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cluster_security_groups;

pub use self::cluster_security_groups::{
    BastionSpec, ClusterSecurityGroups, ClusterSecurityGroupsSpec, ClusterSecurityGroupsStatus,
    CniIngressRuleSpec, IngressRuleSpec, ListenerSpec, LoadBalancerSpec, SecurityGroupStatus,
    VpcSpec,
};
pub use k8s_openapi::{
    api::{self, apps::v1::Deployment, coordination::v1::Lease},
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
};
pub use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, ResourceExt},
    runtime::watcher,
    Client, Error, Resource,
};
