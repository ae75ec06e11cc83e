//! Queue ids and TC handles.
//!
//! Every queue lives under the root HTB qdisc `1:0`. Queue `qid` is the class `1:qid`, and its
//! filter matches packets carrying the firewall mark `qid`. Queue ids and handles are written
//! in hex, like `tc` does.

use rtnetlink::packet_route::tc::TcHandle;

/// Major number of the root qdisc every queue hangs off.
pub const ROOT_MAJOR: u16 = 1;

/// The root qdisc, `1:0`.
pub const ROOT_QDISC: u32 = (ROOT_MAJOR as u32) << 16;

/// Addressing shared by every class and filter request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcRequestInner {
    /// The network interface index, as returned by `if_nametoindex`.
    pub interface_index: i32,
    /// The handle the object attaches to.
    pub parent: TcHandle,
    /// The object's own handle.
    pub handle: TcHandle,
}

impl TcRequestInner {
    /// A request on `index` attached to the root qdisc.
    pub fn new(index: u32) -> Self {
        Self {
            interface_index: index as i32,
            parent: TcHandle::from(ROOT_QDISC),
            handle: TcHandle::default(),
        }
    }

    pub fn with_parent(mut self, parent: u32) -> Self {
        self.parent = TcHandle::from(parent);
        self
    }

    pub fn with_handle(mut self, handle: u32) -> Self {
        self.handle = TcHandle::from(handle);
        self
    }
}

/// Parses a queue id: a hex number with or without `0x`, fitting a class minor.
pub fn parse_queue_id(qid: &str) -> Option<u16> {
    let qid = qid.trim();
    let digits = qid.strip_prefix("0x").or_else(|| qid.strip_prefix("0X")).unwrap_or(qid);
    if digits.is_empty() {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

/// Parses a `major:minor` handle in hex, such as `1:fffe`. An empty minor means 0.
pub fn parse_handle(handle: &str) -> Option<u32> {
    let (major, minor) = handle.trim().split_once(':')?;
    let major = parse_queue_id(major)?;
    let minor = if minor.is_empty() { 0 } else { parse_queue_id(minor)? };
    Some(u32::from(major) << 16 | u32::from(minor))
}

/// The class handle of queue `qid`, `1:qid`.
pub const fn class_handle(qid: u16) -> u32 {
    ROOT_QDISC | qid as u32
}

/// Formats a handle the way `tc` prints it.
pub fn display_handle(handle: u32) -> String {
    format!("{:x}:{:x}", handle >> 16, handle & 0xffff)
}
