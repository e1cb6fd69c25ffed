use crate::{Error, Role};
use ipnet::{Ipv4Net, Ipv6Net};
use std::fmt;

/// The IP protocol a permission applies to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    All,
    IpInIp,
    #[default]
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Esp,
}

/// The single source of an expanded rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Cidr(Ipv4Net),
    Ipv6Cidr(Ipv6Net),
    Group(String),
}

/// An ingress permission as configured or computed, possibly naming several
/// sources at once.
///
/// Source roles and the NAT gateway flag are symbolic and must be resolved to
/// concrete sources before the rule is expanded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngressRule {
    pub description: String,
    pub protocol: Protocol,
    pub from_port: i32,
    pub to_port: i32,

    pub cidr_blocks: Vec<Ipv4Net>,
    pub ipv6_cidr_blocks: Vec<Ipv6Net>,
    pub source_security_group_ids: Vec<String>,
    pub source_security_group_roles: Vec<Role>,
    pub nat_gateways_ips_source: bool,
}

/// A CNI requirement. Its sources are always the control plane and node groups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CniIngressRule {
    pub description: String,
    pub protocol: Protocol,
    pub from_port: i32,
    pub to_port: i32,
}

/// A single-source ingress permission.
///
/// Rules compare by [`RuleKey`]; the description is carried for readability
/// only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub description: String,
    pub protocol: Protocol,
    pub from_port: i32,
    pub to_port: i32,
    pub source: Option<Source>,
}

/// The identity of a [`Rule`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RuleKey {
    protocol: Protocol,
    ports: Option<(i32, i32)>,
    source: Option<Source>,
}

/// `0.0.0.0/0`
pub fn any_ipv4() -> Ipv4Net {
    match Ipv4Net::new(std::net::Ipv4Addr::UNSPECIFIED, 0) {
        Ok(net) => net,
        Err(_) => unreachable!("a zero prefix length is always valid"),
    }
}

/// `::/0`
pub fn any_ipv6() -> Ipv6Net {
    match Ipv6Net::new(std::net::Ipv6Addr::UNSPECIFIED, 0) {
        Ok(net) => net,
        Err(_) => unreachable!("a zero prefix length is always valid"),
    }
}

// === impl Protocol ===

impl Protocol {
    /// The protocol as the cloud API spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "-1",
            Self::IpInIp => "4",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Icmpv6 => "58",
            Self::Esp => "50",
        }
    }

    /// Whether from/to ports are meaningful for this protocol.
    pub fn has_ports(&self) -> bool {
        matches!(self, Self::Tcp | Self::Udp | Self::Icmp | Self::Icmpv6)
    }
}

impl std::str::FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "-1" | "all" => Ok(Self::All),
            "4" | "ipip" | "ip-in-ip" => Ok(Self::IpInIp),
            "6" | "tcp" => Ok(Self::Tcp),
            "17" | "udp" => Ok(Self::Udp),
            "1" | "icmp" => Ok(Self::Icmp),
            "58" | "icmpv6" => Ok(Self::Icmpv6),
            "50" | "esp" => Ok(Self::Esp),
            _ => Err(Error::InvalidProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl Source ===

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cidr(net) => net.fmt(f),
            Self::Ipv6Cidr(net) => net.fmt(f),
            Self::Group(id) => id.fmt(f),
        }
    }
}

// === impl IngressRule ===

impl IngressRule {
    pub fn new(description: impl ToString, protocol: Protocol, from_port: i32, to_port: i32) -> Self {
        Self {
            description: description.to_string(),
            protocol,
            from_port,
            to_port,
            ..Default::default()
        }
    }

    pub fn tcp(description: impl ToString, port: i32) -> Self {
        Self::new(description, Protocol::Tcp, port, port)
    }

    pub fn with_cidr_blocks(mut self, nets: impl IntoIterator<Item = Ipv4Net>) -> Self {
        self.cidr_blocks.extend(nets);
        self
    }

    pub fn with_ipv6_cidr_blocks(mut self, nets: impl IntoIterator<Item = Ipv6Net>) -> Self {
        self.ipv6_cidr_blocks.extend(nets);
        self
    }

    pub fn with_source_groups<S: ToString>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.source_security_group_ids
            .extend(ids.into_iter().map(|id| id.to_string()));
        self
    }

    pub fn has_cidr_blocks(&self) -> bool {
        !self.cidr_blocks.is_empty() || !self.ipv6_cidr_blocks.is_empty()
    }

    /// Splits the rule into one single-source rule per CIDR, IPv6 CIDR and
    /// source group. A rule without any source yields a single sourceless
    /// rule.
    pub fn expand(&self) -> Vec<Rule> {
        let sources = self
            .cidr_blocks
            .iter()
            .map(|net| Source::Cidr(*net))
            .chain(self.ipv6_cidr_blocks.iter().map(|net| Source::Ipv6Cidr(*net)))
            .chain(
                self.source_security_group_ids
                    .iter()
                    .map(|id| Source::Group(id.clone())),
            )
            .map(Some)
            .collect::<Vec<_>>();

        if sources.is_empty() {
            return vec![self.with_source(None)];
        }
        sources
            .into_iter()
            .map(|source| self.with_source(source))
            .collect()
    }

    fn with_source(&self, source: Option<Source>) -> Rule {
        Rule {
            description: self.description.clone(),
            protocol: self.protocol,
            from_port: self.from_port,
            to_port: self.to_port,
            source,
        }
    }
}

impl From<Rule> for IngressRule {
    fn from(rule: Rule) -> Self {
        let Rule {
            description,
            protocol,
            from_port,
            to_port,
            source,
        } = rule;
        let rule = IngressRule::new(description, protocol, from_port, to_port);
        match source {
            None => rule,
            Some(Source::Cidr(net)) => rule.with_cidr_blocks(Some(net)),
            Some(Source::Ipv6Cidr(net)) => rule.with_ipv6_cidr_blocks(Some(net)),
            Some(Source::Group(id)) => rule.with_source_groups(Some(id)),
        }
    }
}

impl fmt::Display for IngressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "protocol={}/range=[{}-{}]/description={}",
            self.protocol, self.from_port, self.to_port, self.description
        )
    }
}

// === impl CniIngressRule ===

impl CniIngressRule {
    /// The rules applied when no CNI requirements are configured.
    pub fn calico_defaults() -> Vec<Self> {
        vec![
            Self {
                description: "bgp (calico)".to_string(),
                protocol: Protocol::Tcp,
                from_port: 179,
                to_port: 179,
            },
            Self {
                description: "IP-in-IP (calico)".to_string(),
                protocol: Protocol::IpInIp,
                from_port: -1,
                to_port: 65535,
            },
        ]
    }
}

// === impl Rule ===

impl Rule {
    pub fn key(&self) -> RuleKey {
        RuleKey {
            protocol: self.protocol,
            ports: self
                .protocol
                .has_ports()
                .then_some((self.from_port, self.to_port)),
            source: self.source.clone(),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol={}", self.protocol)?;
        if self.protocol.has_ports() {
            write!(f, "/range=[{}-{}]", self.from_port, self.to_port)?;
        }
        if let Some(source) = &self.source {
            write!(f, "/source={source}")?;
        }
        Ok(())
    }
}
