use crate::{Error, Protocol, Rule, Source, Tags};
use ipnet::{Ipv4Net, Ipv6Net};

pub const GROUP_NOT_FOUND: &str = "InvalidGroup.NotFound";
pub const PERMISSION_NOT_FOUND: &str = "InvalidPermission.NotFound";
pub const DEPENDENCY_VIOLATION: &str = "DependencyViolation";

/// Models the cloud's security group API.
///
/// Implementations return groups with their rules as the cloud reports them;
/// no caching is expected.
#[async_trait::async_trait]
pub trait SecurityGroupApi: Send + Sync {
    async fn describe_security_groups(
        &self,
        filter: DescribeFilter,
    ) -> Result<Vec<CloudSecurityGroup>, ApiError>;

    /// Creates a group and returns its ID.
    async fn create_security_group(
        &self,
        vpc_id: &str,
        name: &str,
        description: &str,
        tags: &Tags,
    ) -> Result<String, ApiError>;

    async fn delete_security_group(&self, group_id: &str) -> Result<(), ApiError>;

    async fn authorize_ingress(
        &self,
        group_id: &str,
        permissions: Vec<IpPermission>,
    ) -> Result<(), ApiError>;

    async fn revoke_ingress(
        &self,
        group_id: &str,
        permissions: Vec<IpPermission>,
    ) -> Result<(), ApiError>;

    async fn revoke_egress(
        &self,
        group_id: &str,
        permissions: Vec<IpPermission>,
    ) -> Result<(), ApiError>;

    /// Adds or overwrites tags. Tags not named are left untouched.
    async fn create_tags(&self, resource_id: &str, tags: &Tags) -> Result<(), ApiError>;
}

/// Selects the groups to describe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescribeFilter {
    /// Groups in a VPC with one of the given names.
    Names { vpc_id: String, names: Vec<String> },

    /// Groups tagged as owned by a cluster, optionally limited to a VPC.
    ClusterOwned {
        vpc_id: Option<String>,
        cluster_name: String,
    },

    Ids(Vec<String>),
}

/// A group as described by the cloud.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloudSecurityGroup {
    pub id: String,
    pub name: String,
    pub vpc_id: Option<String>,
    pub tags: Tags,
    pub ingress: Vec<IpPermission>,
    pub egress: Vec<IpPermission>,
}

/// A permission as the cloud represents it, with any number of sources.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpPermission {
    pub protocol: String,
    pub from_port: Option<i32>,
    pub to_port: Option<i32>,
    pub ip_ranges: Vec<IpRange>,
    pub ipv6_ranges: Vec<Ipv6Range>,
    pub group_pairs: Vec<GroupPair>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpRange {
    pub cidr: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ipv6Range {
    pub cidr: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupPair {
    pub group_id: String,
    pub description: Option<String>,
}

/// An error returned by the cloud API.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    code: Option<String>,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

// === impl IpPermission ===

impl IpPermission {
    /// Returns one rule per source of this permission.
    pub fn rules(&self) -> Result<Vec<Rule>, Error> {
        let protocol = self.protocol.parse::<Protocol>()?;
        let rule = |description: &Option<String>, source| Rule {
            description: description.clone().unwrap_or_default(),
            protocol,
            from_port: self.from_port.unwrap_or(0),
            to_port: self.to_port.unwrap_or(0),
            source: Some(source),
        };

        let mut rules = Vec::with_capacity(
            self.ip_ranges.len() + self.ipv6_ranges.len() + self.group_pairs.len(),
        );
        for range in &self.ip_ranges {
            let net = range
                .cidr
                .parse::<Ipv4Net>()
                .map_err(|_| Error::InvalidCidr(range.cidr.clone()))?;
            rules.push(rule(&range.description, Source::Cidr(net)));
        }
        for range in &self.ipv6_ranges {
            let net = range
                .cidr
                .parse::<Ipv6Net>()
                .map_err(|_| Error::InvalidCidr(range.cidr.clone()))?;
            rules.push(rule(&range.description, Source::Ipv6Cidr(net)));
        }
        for pair in &self.group_pairs {
            rules.push(rule(&pair.description, Source::Group(pair.group_id.clone())));
        }
        Ok(rules)
    }
}

impl From<&Rule> for IpPermission {
    fn from(rule: &Rule) -> Self {
        let description = Some(rule.description.clone()).filter(|d| !d.is_empty());
        let has_ports = rule.protocol.has_ports();
        let mut permission = IpPermission {
            protocol: rule.protocol.as_str().to_string(),
            from_port: has_ports.then_some(rule.from_port),
            to_port: has_ports.then_some(rule.to_port),
            ..Default::default()
        };
        match &rule.source {
            None => {}
            Some(Source::Cidr(net)) => permission.ip_ranges.push(IpRange {
                cidr: net.to_string(),
                description,
            }),
            Some(Source::Ipv6Cidr(net)) => permission.ipv6_ranges.push(Ipv6Range {
                cidr: net.to_string(),
                description,
            }),
            Some(Source::Group(id)) => permission.group_pairs.push(GroupPair {
                group_id: id.clone(),
                description,
            }),
        }
        permission
    }
}

// === impl ApiError ===

impl ApiError {
    pub fn new(code: impl ToString, message: impl ToString) -> Self {
        Self {
            message: format!("{}: {}", code.to_string(), message.to_string()),
            code: Some(code.to_string()),
            source: None,
        }
    }

    /// Wraps a failure that carries no service error code, like a transport
    /// error.
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            code: None,
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn is_group_not_found(&self) -> bool {
        self.code() == Some(GROUP_NOT_FOUND)
    }

    pub fn is_permission_not_found(&self) -> bool {
        self.code() == Some(PERMISSION_NOT_FOUND)
    }

    pub fn is_dependency_violation(&self) -> bool {
        self.code() == Some(DEPENDENCY_VIOLATION)
    }

    /// Errors that mean the thing being removed is already gone.
    pub fn is_ignorable_security_group_error(&self) -> bool {
        self.is_group_not_found() || self.is_permission_not_found()
    }
}
