//! An in-process flow table.
//!
//! [`MemoryFlowTable`] implements [`FlowBackend`] with the same add/delete semantics as a
//! switch: installing a rule with an identical predicate and priority replaces the old one,
//! match deletes are non-strict and cookie deletes honour the mask. It also classifies
//! [`PacketMeta`] so a rule set can be walked packet by packet.

use std::net::IpAddr;

use crate::{
    ip::Subnet, Action, Direction, EtherType, FlowBackend, FlowError, FlowMatch, FlowRule, PortNo,
    ProxyTag, TableId,
};

/// The header fields and metadata registers of a packet traversing the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketMeta {
    pub in_port: PortNo,
    pub ip_src: IpAddr,
    pub ip_dst: IpAddr,
    pub ip_proto: u8,
    pub tcp_src: u16,
    pub tcp_dst: u16,
    pub proxy_tag: ProxyTag,
    pub direction: Option<Direction>,
    pub passthrough: bool,
    pub tunnel_id: Option<u64>,
    pub subscriber_id: Option<String>,
}

impl PacketMeta {
    /// A fresh TCP packet with empty metadata registers.
    pub fn tcp(in_port: PortNo, src: (IpAddr, u16), dst: (IpAddr, u16)) -> Self {
        Self {
            in_port,
            ip_src: src.0,
            ip_dst: dst.0,
            ip_proto: crate::IPPROTO_TCP,
            tcp_src: src.1,
            tcp_dst: dst.1,
            proxy_tag: ProxyTag::Unset,
            direction: None,
            passthrough: false,
            tunnel_id: None,
            subscriber_id: None,
        }
    }

    /// Applies a rule's actions to the packet.
    pub fn apply(&mut self, actions: &[Action]) {
        for action in actions {
            match action {
                Action::SetDirection(direction) => self.direction = Some(*direction),
                Action::SetPassthrough => self.passthrough = true,
                Action::SetProxyTag(tag) => self.proxy_tag = *tag,
                Action::SetInPort(port) => self.in_port = *port,
                Action::SetTunnelId(id) => self.tunnel_id = Some(*id),
                Action::SetSubscriberId(id) => self.subscriber_id = Some(id.clone()),
            }
        }
    }
}

impl FlowMatch {
    /// Returns `true` if the packet satisfies every non-wildcard field.
    pub fn matches(&self, packet: &PacketMeta) -> bool {
        let addr = |subnet: &Option<Subnet>, ip: IpAddr| {
            subnet.map_or(true, |s| s.contains(&Subnet::host(ip)))
        };

        self.in_port.map_or(true, |p| p == packet.in_port)
            && self.eth_type.map_or(true, |e| e == EtherType::of(packet.ip_src))
            && addr(&self.ip_src, packet.ip_src)
            && addr(&self.ip_dst, packet.ip_dst)
            && self.ip_proto.map_or(true, |p| p == packet.ip_proto)
            && self.tcp_src.map_or(true, |p| p == packet.tcp_src)
            && self.tcp_dst.map_or(true, |p| p == packet.tcp_dst)
            && self.proxy_tag.map_or(true, |t| t == packet.proxy_tag)
    }
}

/// A flow table held in memory.
#[derive(Debug, Default)]
pub struct MemoryFlowTable {
    rules: Vec<FlowRule>,
    /// Maximum number of rules per table, if bounded.
    capacity: Option<usize>,
}

impl MemoryFlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds every table to `capacity` rules. Installs beyond it fail with
    /// [`FlowError::TableFull`].
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn rules(&self) -> &[FlowRule] {
        &self.rules
    }

    pub fn rules_in(&self, table: TableId) -> impl Iterator<Item = &FlowRule> {
        self.rules.iter().filter(move |r| r.table == table)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the highest priority rule in `table` matching the packet.
    pub fn lookup(&self, table: TableId, packet: &PacketMeta) -> Option<&FlowRule> {
        self.rules_in(table)
            .filter(|r| r.matcher.matches(packet))
            .max_by_key(|r| r.priority)
    }

    fn count_in(&self, table: TableId) -> usize {
        self.rules_in(table).count()
    }
}

impl FlowBackend for MemoryFlowTable {
    fn install_rules(&mut self, rules: &[FlowRule]) -> Result<(), FlowError> {
        if let Some(capacity) = self.capacity {
            for rule in rules {
                let pending = rules.iter().filter(|r| r.table == rule.table).count();
                if self.count_in(rule.table) + pending > capacity {
                    return Err(FlowError::TableFull(rule.table));
                }
            }
        }

        for rule in rules {
            self.rules.retain(|r| {
                !(r.table == rule.table && r.priority == rule.priority && r.matcher == rule.matcher)
            });
            self.rules.push(rule.clone());
        }

        tracing::trace!(count = rules.len(), total = self.rules.len(), "installed rules");
        Ok(())
    }

    fn delete_rules_by_match(
        &mut self,
        table: TableId,
        matcher: &FlowMatch,
    ) -> Result<(), FlowError> {
        self.rules.retain(|r| !(r.table == table && matcher.covers(&r.matcher)));
        Ok(())
    }

    fn delete_rules_by_cookie(
        &mut self,
        table: TableId,
        cookie: u64,
        mask: u64,
    ) -> Result<(), FlowError> {
        self.rules.retain(|r| !(r.table == table && r.cookie & mask == cookie & mask));
        Ok(())
    }

    fn delete_all_rules_in_table(&mut self, table: TableId) -> Result<(), FlowError> {
        self.rules.retain(|r| r.table != table);
        Ok(())
    }
}
