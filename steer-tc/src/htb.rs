//! HTB class requests.
//!
//! A queue is an HTB class with a committed rate and a ceiling, either directly under the root
//! qdisc or under another queue's class.

use rtnetlink::packet_core::{
    NetlinkMessage, NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST,
};
use rtnetlink::packet_route::{
    tc::{TcAttribute, TcMessage},
    RouteNetlinkMessage,
};

use crate::handle::TcRequestInner;
use crate::nla::{build_nested_options, build_nla};
use crate::psched::{default_burst, xmit_ticks};

// HTB class attributes (linux/pkt_sched.h).
const TCA_HTB_PARMS: u16 = 1;
const TCA_HTB_CTAB: u16 = 3;
const TCA_HTB_RTAB: u16 = 4;
const TCA_HTB_RATE64: u16 = 6;
const TCA_HTB_CEIL64: u16 = 7;

const TC_LINKLAYER_ETHERNET: u8 = 1;

/// Zeroed rate table. The kernel computes transmission times itself and only inspects the
/// table to detect the link layer, where a leading zero means Ethernet.
const DEFAULT_RATE_TABLE: [u8; 1024] = [0u8; 1024];

/// The kernel's `tc_ratespec`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateSpec {
    pub cell_log: u8,
    pub linklayer: u8,
    pub overhead: u16,
    pub cell_align: i16,
    pub mpu: u16,
    /// Bytes per second, saturated at `u32::MAX`. Faster rates go in a separate 64 bit
    /// attribute.
    pub rate: u32,
}

impl RateSpec {
    pub fn ethernet(rate_bytes: u64) -> Self {
        Self {
            linklayer: TC_LINKLAYER_ETHERNET,
            cell_align: -1,
            rate: u32::try_from(rate_bytes).unwrap_or(u32::MAX),
            ..Default::default()
        }
    }

    pub fn to_bytes(self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0] = self.cell_log;
        buf[1] = self.linklayer;
        buf[2..4].copy_from_slice(&self.overhead.to_ne_bytes());
        buf[4..6].copy_from_slice(&self.cell_align.to_ne_bytes());
        buf[6..8].copy_from_slice(&self.mpu.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.rate.to_ne_bytes());
        buf
    }
}

/// The kernel's `tc_htb_opt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HtbOpt {
    rate: RateSpec,
    ceil: RateSpec,
    /// Burst at `rate`, in ticks.
    buffer: u32,
    /// Burst at `ceil`, in ticks.
    cbuffer: u32,
    /// 0 lets the kernel derive it from the rate.
    quantum: u32,
    level: u32,
    prio: u32,
}

impl HtbOpt {
    fn as_bytes(self) -> Vec<u8> {
        let mut vec = Vec::with_capacity(44);
        vec.extend_from_slice(&self.rate.to_bytes());
        vec.extend_from_slice(&self.ceil.to_bytes());
        for field in [self.buffer, self.cbuffer, self.quantum, self.level, self.prio] {
            vec.extend_from_slice(&field.to_ne_bytes());
        }
        vec
    }
}

/// Builder for a new HTB class.
///
/// Rates are in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtbClassRequest {
    pub inner: TcRequestInner,
    pub rate: u64,
    pub ceil: u64,
    pub prio: u32,
}

impl HtbClassRequest {
    pub fn new(inner: TcRequestInner, rate: u64, ceil: u64) -> Self {
        Self { inner, rate, ceil, prio: 0 }
    }

    pub fn with_prio(mut self, prio: u32) -> Self {
        self.prio = prio;
        self
    }

    fn options(&self) -> Vec<u8> {
        let opt = HtbOpt {
            rate: RateSpec::ethernet(self.rate),
            ceil: RateSpec::ethernet(self.ceil),
            buffer: xmit_ticks(self.rate, default_burst(self.rate)),
            cbuffer: xmit_ticks(self.ceil, default_burst(self.ceil)),
            quantum: 0,
            level: 0,
            prio: self.prio,
        };

        let mut attrs = build_nla(TCA_HTB_PARMS, &opt.as_bytes());
        if self.rate > u64::from(u32::MAX) {
            attrs.extend(build_nla(TCA_HTB_RATE64, &self.rate.to_ne_bytes()));
        }
        if self.ceil > u64::from(u32::MAX) {
            attrs.extend(build_nla(TCA_HTB_CEIL64, &self.ceil.to_ne_bytes()));
        }
        attrs.extend(build_nla(TCA_HTB_RTAB, &DEFAULT_RATE_TABLE));
        attrs.extend(build_nla(TCA_HTB_CTAB, &DEFAULT_RATE_TABLE));
        attrs
    }

    /// Builds the request. It fails if the class already exists.
    pub fn build(self) -> NetlinkMessage<RouteNetlinkMessage> {
        let mut tc_message = TcMessage::with_index(self.inner.interface_index);
        tc_message.header.parent = self.inner.parent;
        tc_message.header.handle = self.inner.handle;

        tc_message.attributes.push(TcAttribute::Kind("htb".to_string()));
        tc_message.attributes.push(TcAttribute::Other(build_nested_options(self.options())));

        let mut nl_req = NetlinkMessage::from(RouteNetlinkMessage::NewTrafficClass(tc_message));
        nl_req.header.flags = NLM_F_CREATE | NLM_F_EXCL | NLM_F_REQUEST | NLM_F_ACK;

        nl_req
    }
}

/// Builder for deleting a class by handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteClassRequest {
    pub inner: TcRequestInner,
}

impl DeleteClassRequest {
    pub fn new(inner: TcRequestInner) -> Self {
        Self { inner }
    }

    pub fn build(self) -> NetlinkMessage<RouteNetlinkMessage> {
        let mut tc_message = TcMessage::with_index(self.inner.interface_index);
        tc_message.header.handle = self.inner.handle;

        let mut nl_req = NetlinkMessage::from(RouteNetlinkMessage::DelTrafficClass(tc_message));
        nl_req.header.flags = NLM_F_REQUEST | NLM_F_ACK;

        nl_req
    }
}
