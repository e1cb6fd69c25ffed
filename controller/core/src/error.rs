use crate::Role;

/// Errors in the reconciliation input.
///
/// None of these are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("security group overrides provided for managed vpc {0:?}")]
    OverridesForManagedVpc(String),

    /// The NAT gateways have not been provisioned yet. The caller should
    /// try again later.
    #[error("ingress rule {0:?} uses NAT gateway IPs as source, but no NAT gateway IPs are available yet")]
    NatGatewayIpsNotReady(String),

    #[error("no security group has been reconciled for role {0}")]
    MissingSecurityGroup(Role),

    #[error("the VPC ID is not known")]
    MissingVpcId,

    #[error("the VPC CIDR block is not known")]
    MissingVpcCidr,

    #[error("invalid protocol: {0:?}")]
    InvalidProtocol(String),

    #[error("invalid security group role: {0:?}")]
    InvalidRole(String),

    #[error("invalid CIDR block: {0:?}")]
    InvalidCidr(String),
}

// === impl Error ===

impl Error {
    /// Whether the error resolves itself once some external resource
    /// becomes available.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NatGatewayIpsNotReady(_) | Self::MissingVpcId | Self::MissingVpcCidr)
    }
}
