//! Raw netlink attributes for the kind specific `TCA_OPTIONS` payloads that `rtnetlink` has no
//! typed representation for.

use nix::libc::TCA_OPTIONS;
use rtnetlink::packet_core::{DefaultNla, NLA_HEADER_SIZE};

/// Encodes a single attribute: `u16 length | u16 type | value`, padded to 4 bytes. The length
/// covers the header and the unpadded value. Both header fields are in host byte order.
pub(crate) fn build_nla(nla_type: u16, value: &[u8]) -> Vec<u8> {
    let len = NLA_HEADER_SIZE + value.len();
    let mut buf = Vec::with_capacity((len + 3) & !3);

    buf.extend_from_slice(&(len as u16).to_ne_bytes());
    buf.extend_from_slice(&nla_type.to_ne_bytes());
    buf.extend_from_slice(value);
    buf.resize((len + 3) & !3, 0);

    buf
}

/// Wraps already encoded attributes in a `TCA_OPTIONS` container.
pub(crate) fn build_nested_options(attrs: Vec<u8>) -> DefaultNla {
    DefaultNla::new(TCA_OPTIONS, attrs)
}
