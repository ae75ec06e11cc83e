//! `fw` filter requests.
//!
//! A `fw` filter sends packets whose firewall mark equals the filter handle to a class. The
//! mark is set upstream by the flow pipeline, so every queue gets one filter keyed by its id.

use rtnetlink::packet_core::{
    NetlinkMessage, NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST,
};
use rtnetlink::packet_route::{
    tc::{TcAttribute, TcMessage},
    RouteNetlinkMessage,
};

use crate::handle::TcRequestInner;
use crate::nla::{build_nested_options, build_nla};

/// Class id attribute of the `fw` classifier (linux/pkt_cls.h).
const TCA_FW_CLASSID: u16 = 1;

/// Matches every protocol.
pub const ETH_P_ALL: u16 = nix::libc::ETH_P_ALL as u16;

/// Builder for a `fw` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwFilterRequest {
    /// Parent is the qdisc the filter attaches to; handle is the mark.
    pub inner: TcRequestInner,
    pub class_id: u32,
    pub prio: u16,
    pub protocol: u16,
}

impl FwFilterRequest {
    pub fn new(inner: TcRequestInner, class_id: u32) -> Self {
        Self { inner, class_id, prio: 1, protocol: ETH_P_ALL }
    }

    pub fn with_prio(mut self, prio: u16) -> Self {
        self.prio = prio;
        self
    }

    pub fn with_protocol(mut self, protocol: u16) -> Self {
        self.protocol = protocol;
        self
    }

    fn message(&self) -> TcMessage {
        let mut tc_msg = TcMessage::with_index(self.inner.interface_index);
        tc_msg.header.parent = self.inner.parent;
        tc_msg.header.handle = self.inner.handle;
        // Priority in the upper half, protocol in network byte order in the lower half.
        tc_msg.header.info = u32::from(self.prio) << 16 | u32::from(self.protocol.to_be());
        tc_msg.attributes.push(TcAttribute::Kind("fw".to_string()));
        tc_msg
    }

    /// Builds the request adding the filter. It fails if the filter already exists.
    pub fn build(self) -> NetlinkMessage<RouteNetlinkMessage> {
        let mut tc_msg = self.message();
        let class_id = build_nla(TCA_FW_CLASSID, &self.class_id.to_ne_bytes());
        tc_msg.attributes.push(TcAttribute::Other(build_nested_options(class_id)));

        let mut nl_req = NetlinkMessage::from(RouteNetlinkMessage::NewTrafficFilter(tc_msg));
        nl_req.header.flags = NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL;

        nl_req
    }

    /// Builds the request deleting the filter.
    pub fn build_delete(self) -> NetlinkMessage<RouteNetlinkMessage> {
        let mut nl_req =
            NetlinkMessage::from(RouteNetlinkMessage::DelTrafficFilter(self.message()));
        nl_req.header.flags = NLM_F_REQUEST | NLM_F_ACK;

        nl_req
    }
}
