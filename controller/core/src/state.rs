use crate::{RuleSet, Role, Tags};
use std::{collections::BTreeMap, fmt};

/// The condition type describing the cluster's security groups.
pub const SECURITY_GROUPS_READY: &str = "ClusterSecurityGroupsReady";

/// A security group as the engine sees it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityGroup {
    /// Empty until the group is created.
    pub id: String,
    pub name: String,
    pub tags: Tags,

    /// The observed ingress rules, expanded to a single source each.
    pub ingress_rules: RuleSet,
}

/// Everything a reconciliation writes. Owned by the caller and passed into
/// each run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterState {
    pub security_groups: BTreeMap<Role, SecurityGroup>,
    pub condition: Option<Condition>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub ready: bool,
    pub reason: Option<ConditionReason>,
    pub message: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConditionReason {
    ReconciliationFailed,
    Deleting,
    DeletionFailed,
    Deleted,
}

// === impl SecurityGroup ===

impl fmt::Display for SecurityGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id={}/name={}", self.id, self.name)
    }
}

// === impl ClusterState ===

impl ClusterState {
    pub fn group_id(&self, role: Role) -> Option<&str> {
        self.security_groups
            .get(&role)
            .map(|sg| sg.id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn mark_ready(&mut self) {
        self.condition = Some(Condition {
            ready: true,
            reason: None,
            message: None,
        });
    }

    pub fn mark_not_ready(&mut self, reason: ConditionReason, message: Option<String>) {
        self.condition = Some(Condition {
            ready: false,
            reason: Some(reason),
            message,
        });
    }
}

// === impl ConditionReason ===

impl ConditionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReconciliationFailed => "SecurityGroupReconciliationFailed",
            Self::Deleting => "Deleting",
            Self::DeletionFailed => "DeletingFailed",
            Self::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}
