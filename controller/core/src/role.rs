use crate::Error;
use std::fmt;

/// Identifies the logical purpose of a managed security group.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// An SSH bastion host.
    Bastion,

    /// Kubernetes workload nodes.
    Node,

    /// An extra group attached to EKS-managed nodes.
    EksNodeAdditional,

    /// Kubernetes control plane nodes.
    ControlPlane,

    /// The Kubernetes API server load balancer.
    ApiServerLb,

    /// A group handed to the in-cluster cloud provider for the load balancers it provisions.
    Lb,
}

// === impl Role ===

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Bastion,
        Role::Node,
        Role::EksNodeAdditional,
        Role::ControlPlane,
        Role::ApiServerLb,
        Role::Lb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bastion => "bastion",
            Self::Node => "node",
            Self::EksNodeAdditional => "node-eks-additional",
            Self::ControlPlane => "control-plane",
            Self::ApiServerLb => "apiserver-lb",
            Self::Lb => "lb",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| Error::InvalidRole(s.to_string()))
    }
}
