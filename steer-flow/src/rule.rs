use std::{fmt, net::IpAddr};

use crate::ip::Subnet;

/// A flow table number in the switch pipeline.
pub type TableId = u8;

/// The first table of the pipeline. Resubmitting here restarts classification.
pub const PIPELINE_START: TableId = 0;

/// IP protocol number for TCP.
pub const IPPROTO_TCP: u8 = 6;

/// Mask that makes a cookie match exact.
pub const COOKIE_EXACT: u64 = u64::MAX;

/// A switch port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortNo(pub u32);

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The identifier of a policy rule. Also used as the cookie of every flow the rule installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u32);

impl RuleId {
    pub fn cookie(self) -> u64 {
        u64::from(self.0)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Rule priority. Higher values win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(pub u16);

impl Priority {
    /// Table-miss tier, used by the per-table default flows.
    pub const TABLE_MISS: Self = Self(0);
    /// Lowest tier for subscriber flows.
    pub const MINIMUM: Self = Self(10);
    pub const MEDIUM: Self = Self(100);
    pub const DEFAULT: Self = Self(1000);

    pub const fn raise(self, by: u16) -> Self {
        Self(self.0.saturating_add(by))
    }
}

/// The traffic direction tag carried in packet metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Network to subscriber (downlink).
    In,
    /// Subscriber to network (uplink).
    Out,
}

/// Metadata tag marking packets that already went through the enrichment proxy.
///
/// A packet is steered to the proxy only while its tag is [`ProxyTag::Unset`]. The rule that
/// brings it back from the proxy sets [`ProxyTag::Returning`], and a second rule clears the tag
/// again once the packet re-enters the pipeline. Without both legs the packet would be sent to
/// the proxy on every resubmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxyTag {
    #[default]
    Unset,
    Returning,
}

impl ProxyTag {
    /// The register value stored in packet metadata.
    pub const fn value(self) -> u32 {
        match self {
            Self::Unset => 0,
            Self::Returning => 1,
        }
    }
}

/// Ethernet type of the matched traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EtherType {
    Ipv4,
    Ipv6,
}

impl EtherType {
    pub fn of(address: IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }

    pub const fn value(self) -> u16 {
        match self {
            Self::Ipv4 => 0x0800,
            Self::Ipv6 => 0x86DD,
        }
    }
}

/// A match predicate. `None` fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub in_port: Option<PortNo>,
    pub eth_type: Option<EtherType>,
    pub ip_src: Option<Subnet>,
    pub ip_dst: Option<Subnet>,
    pub ip_proto: Option<u8>,
    pub tcp_src: Option<u16>,
    pub tcp_dst: Option<u16>,
    pub proxy_tag: Option<ProxyTag>,
}

impl FlowMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_in_port(mut self, port: PortNo) -> Self {
        self.in_port = Some(port);
        self
    }

    pub fn with_eth_type(mut self, eth_type: EtherType) -> Self {
        self.eth_type = Some(eth_type);
        self
    }

    pub fn with_ip_src(mut self, src: impl Into<Subnet>) -> Self {
        self.ip_src = Some(src.into());
        self
    }

    pub fn with_ip_dst(mut self, dst: impl Into<Subnet>) -> Self {
        self.ip_dst = Some(dst.into());
        self
    }

    pub fn with_ip_proto(mut self, proto: u8) -> Self {
        self.ip_proto = Some(proto);
        self
    }

    pub fn with_tcp_src(mut self, port: u16) -> Self {
        self.tcp_src = Some(port);
        self
    }

    pub fn with_tcp_dst(mut self, port: u16) -> Self {
        self.tcp_dst = Some(port);
        self
    }

    pub fn with_proxy_tag(mut self, tag: ProxyTag) -> Self {
        self.proxy_tag = Some(tag);
        self
    }

    /// Returns `true` if every packet matched by `other` is also matched by `self`.
    ///
    /// This is the non-strict comparison a switch uses when deleting flows by match: a delete
    /// request removes every rule whose predicate is at least as specific as the request's.
    pub fn covers(&self, other: &Self) -> bool {
        fn field<T: PartialEq>(ours: &Option<T>, theirs: &Option<T>) -> bool {
            match (ours, theirs) {
                (None, _) => true,
                (Some(a), Some(b)) => a == b,
                (Some(_), None) => false,
            }
        }

        let subnet = |ours: &Option<Subnet>, theirs: &Option<Subnet>| match (ours, theirs) {
            (None, _) => true,
            (Some(a), Some(b)) => a.contains(b),
            (Some(_), None) => false,
        };

        field(&self.in_port, &other.in_port)
            && field(&self.eth_type, &other.eth_type)
            && subnet(&self.ip_src, &other.ip_src)
            && subnet(&self.ip_dst, &other.ip_dst)
            && field(&self.ip_proto, &other.ip_proto)
            && field(&self.tcp_src, &other.tcp_src)
            && field(&self.tcp_dst, &other.tcp_dst)
            && field(&self.proxy_tag, &other.proxy_tag)
    }
}

/// An action applied to packets matching a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Load the direction tag.
    SetDirection(Direction),
    /// Mark the packet so enforcement stages let it pass untouched.
    SetPassthrough,
    /// Load the proxy tag. Setting [`ProxyTag::Unset`] clears it.
    SetProxyTag(ProxyTag),
    /// Rewrite the ingress port, so the rest of the pipeline sees the packet as coming from
    /// `port`.
    SetInPort(PortNo),
    /// Set the tunnel id used to reach the subscriber session.
    SetTunnelId(u64),
    /// Load the subscriber identity tag.
    SetSubscriberId(String),
}

/// A single flow table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowRule {
    pub table: TableId,
    pub matcher: FlowMatch,
    pub priority: Priority,
    pub actions: Vec<Action>,
    /// The table the packet continues in once the actions ran. `None` drops the packet.
    pub resubmit: Option<TableId>,
    pub cookie: u64,
}

impl FlowRule {
    pub fn new(table: TableId, matcher: FlowMatch, priority: Priority) -> Self {
        Self { table, matcher, priority, actions: Vec::new(), resubmit: None, cookie: 0 }
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_resubmit(mut self, table: TableId) -> Self {
        self.resubmit = Some(table);
        self
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    /// Returns `true` if this rule drops matching packets.
    pub fn is_drop(&self) -> bool {
        self.resubmit.is_none()
    }
}
