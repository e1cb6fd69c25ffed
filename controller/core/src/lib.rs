#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod api;
pub mod desired;
mod error;
mod input;
pub mod peers;
mod role;
mod rule;
pub mod rule_set;
mod state;
pub mod tags;

pub use self::{
    api::{ApiError, SecurityGroupApi},
    desired::Desired,
    error::Error,
    input::{
        BastionInput, ClusterInput, Listener, ListenerProtocol, LoadBalancerInput,
        LoadBalancerScheme, LoadBalancerType, VpcInput, DEFAULT_API_SERVER_PORT,
    },
    role::Role,
    rule::{any_ipv4, any_ipv6, CniIngressRule, IngressRule, Protocol, Rule, RuleKey, Source},
    rule_set::RuleSet,
    state::{ClusterState, Condition, ConditionReason, SecurityGroup, SECURITY_GROUPS_READY},
    tags::Tags,
};
pub use ipnet::{Ipv4Net, Ipv6Net};

#[cfg(test)]
mod tests;
