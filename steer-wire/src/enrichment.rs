use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// The ID of the enrichment codec on the wire.
const WIRE_ID: u8 = 0x05;

/// Header name carrying the subscriber IMSI.
pub const IMSI_HEADER: &str = "imsi";
/// Header name carrying the subscriber MSISDN.
pub const MSISDN_HEADER: &str = "msisdn";

/// Response code for a request that was applied by the proxy controller.
pub const CODE_OK: u32 = 0;

/// Largest payload the decoder accepts.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

const FAMILY_V4: u8 = 4;
const FAMILY_V6: u8 = 6;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Invalid wire ID: {0}")]
    WireId(u8),
    #[error("Unknown message kind: {0}")]
    UnknownKind(u8),
    #[error("Malformed payload: {0}")]
    Malformed(&'static str),
}

/// The kind of a frame, which determines how its payload is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    /// [`AddUeHeaderEnrichment`] request.
    AddUeHeaderEnrichment = 1,
    /// [`DeactivateUeHeaderEnrichment`] request.
    DeactivateUeHeaderEnrichment = 2,
    /// [`Response`] to either request.
    Response = 3,
}

impl TryFrom<u8> for Kind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::AddUeHeaderEnrichment),
            2 => Ok(Self::DeactivateUeHeaderEnrichment),
            3 => Ok(Self::Response),
            other => Err(Error::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub(crate) kind: Kind,
    /// The request ID. Responses echo the ID of the request they answer.
    pub(crate) id: u32,
    /// The size of the payload. Max 4GiB.
    pub(crate) size: u32,
}

impl Header {
    /// Returns the length of the header in bytes.
    #[inline]
    pub const fn len() -> usize {
        1 + 1 + 4 + 4
    }
}

/// A single frame on the wire.
#[derive(Debug, Clone)]
pub struct Message {
    header: Header,
    payload: Bytes,
}

impl Message {
    pub fn new(kind: Kind, id: u32, payload: Bytes) -> Self {
        Self { header: Header { kind, id, size: payload.len() as u32 }, payload }
    }

    pub fn kind(&self) -> Kind {
        self.header.kind
    }

    pub fn id(&self) -> u32 {
        self.header.id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// A single HTTP header the proxy should inject into enriched requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// Asks the proxy controller to start enriching requests from `ue_ip` towards `websites`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddUeHeaderEnrichment {
    pub ue_ip: IpAddr,
    pub websites: Vec<String>,
    pub headers: Vec<HeaderField>,
}

impl AddUeHeaderEnrichment {
    pub fn encode(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        put_ip(&mut buf, self.ue_ip);
        put_str_list(&mut buf, self.websites.iter().map(String::as_str))?;

        let count = u16::try_from(self.headers.len())
            .map_err(|_| Error::Malformed("too many headers"))?;
        buf.put_u16(count);
        for header in &self.headers {
            put_str(&mut buf, &header.name)?;
            put_str(&mut buf, &header.value)?;
        }

        Ok(buf.freeze())
    }

    pub fn decode(mut src: Bytes) -> Result<Self, Error> {
        let ue_ip = get_ip(&mut src)?;
        let websites = get_str_list(&mut src)?;

        let count = get_u16(&mut src)?;
        let mut headers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = get_str(&mut src)?;
            let value = get_str(&mut src)?;
            headers.push(HeaderField { name, value });
        }

        Ok(Self { ue_ip, websites, headers })
    }
}

/// Asks the proxy controller to stop enriching requests from `ue_ip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeactivateUeHeaderEnrichment {
    pub ue_ip: IpAddr,
}

impl DeactivateUeHeaderEnrichment {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(17);
        put_ip(&mut buf, self.ue_ip);
        buf.freeze()
    }

    pub fn decode(mut src: Bytes) -> Result<Self, Error> {
        Ok(Self { ue_ip: get_ip(&mut src)? })
    }
}

/// The proxy controller's answer. A `code` of [`CODE_OK`] means success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u32,
    pub message: String,
}

impl Response {
    pub fn ok() -> Self {
        Self { code: CODE_OK, message: String::new() }
    }

    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    pub fn encode(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::with_capacity(4 + 2 + self.message.len());
        buf.put_u32(self.code);
        put_str(&mut buf, &self.message)?;
        Ok(buf.freeze())
    }

    pub fn decode(mut src: Bytes) -> Result<Self, Error> {
        if src.remaining() < 4 {
            return Err(Error::Malformed("response code"));
        }
        let code = src.get_u32();
        let message = get_str(&mut src)?;
        Ok(Self { code, message })
    }
}

fn put_ip(dst: &mut BytesMut, ip: IpAddr) {
    match ip {
        IpAddr::V4(v4) => {
            dst.put_u8(FAMILY_V4);
            dst.put_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            dst.put_u8(FAMILY_V6);
            dst.put_slice(&v6.octets());
        }
    }
}

fn get_ip(src: &mut Bytes) -> Result<IpAddr, Error> {
    if !src.has_remaining() {
        return Err(Error::Malformed("address family"));
    }

    match src.get_u8() {
        FAMILY_V4 => {
            if src.remaining() < 4 {
                return Err(Error::Malformed("ipv4 address"));
            }
            let mut octets = [0u8; 4];
            src.copy_to_slice(&mut octets);
            Ok(Ipv4Addr::from(octets).into())
        }
        FAMILY_V6 => {
            if src.remaining() < 16 {
                return Err(Error::Malformed("ipv6 address"));
            }
            let mut octets = [0u8; 16];
            src.copy_to_slice(&mut octets);
            Ok(Ipv6Addr::from(octets).into())
        }
        _ => Err(Error::Malformed("address family")),
    }
}

fn put_str(dst: &mut BytesMut, s: &str) -> Result<(), Error> {
    let len = u16::try_from(s.len()).map_err(|_| Error::Malformed("string too long"))?;
    dst.put_u16(len);
    dst.put_slice(s.as_bytes());
    Ok(())
}

fn get_u16(src: &mut Bytes) -> Result<u16, Error> {
    if src.remaining() < 2 {
        return Err(Error::Malformed("length prefix"));
    }
    Ok(src.get_u16())
}

fn get_str(src: &mut Bytes) -> Result<String, Error> {
    let len = get_u16(src)? as usize;
    if src.remaining() < len {
        return Err(Error::Malformed("string body"));
    }
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| Error::Malformed("string is not utf-8"))
}

fn put_str_list<'a>(
    dst: &mut BytesMut,
    items: impl ExactSizeIterator<Item = &'a str>,
) -> Result<(), Error> {
    let count = u16::try_from(items.len()).map_err(|_| Error::Malformed("too many items"))?;
    dst.put_u16(count);
    for item in items {
        put_str(dst, item)?;
    }
    Ok(())
}

fn get_str_list(src: &mut Bytes) -> Result<Vec<String>, Error> {
    let count = get_u16(src)?;
    (0..count).map(|_| get_str(src)).collect()
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Header,
    Payload(Header),
}

/// Enrichment RPC codec. The same codec is used on both ends of the connection.
#[derive(Debug, Default)]
pub struct Codec {
    /// The current state of the decoder.
    state: State,
}

impl Codec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for Codec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Header => {
                    if src.len() < Header::len() {
                        return Ok(None);
                    }

                    // Wire ID check (without advancing the cursor)
                    let wire_id = src[0];
                    if wire_id != WIRE_ID {
                        return Err(Error::WireId(wire_id));
                    }

                    src.advance(1);
                    let kind = Kind::try_from(src.get_u8())?;
                    let header = Header { kind, id: src.get_u32(), size: src.get_u32() };
                    if header.size > MAX_FRAME_SIZE {
                        return Err(Error::Malformed("frame too large"));
                    }

                    tracing::trace!(?kind, id = header.id, size = header.size, "decoded header");

                    self.state = State::Payload(header);
                }
                State::Payload(header) => {
                    if src.len() < header.size as usize {
                        src.reserve(header.size as usize - src.len());
                        return Ok(None);
                    }

                    let payload = src.split_to(header.size as usize).freeze();

                    self.state = State::Header;
                    return Ok(Some(Message { header, payload }));
                }
            }
        }
    }
}

impl Encoder<Message> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(Header::len() + item.payload.len());

        dst.put_u8(WIRE_ID);
        dst.put_u8(item.header.kind as u8);
        dst.put_u32(item.header.id);
        dst.put_u32(item.header.size);
        dst.put(item.payload);

        Ok(())
    }
}
