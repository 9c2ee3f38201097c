// SPDX-License-Identifier: MPL-2.0

//! Netlink attributes.
//!
//! Each attribute consists of a [`CAttrHeader`] followed by its payload.
//! The payload is either a primitive value, a string, or a sequence of
//! nested attributes. Both the header and payload are aligned to
//! [`NLMSG_ALIGN`]:
//!
//! ┌────────┬─────────┬─────────┐
//! │ Header │ Payload │ Padding │
//! └────────┴─────────┴─────────┘
//!
//! Requests are decoded into typed attribute enums ([`IpsetAttr`],
//! [`DataAttr`]), while replies are encoded incrementally through
//! [`AttrWriter`], since dump replies must stop at the message size limit.

use std::net::IpAddr;

use align_ext::AlignExt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::NLMSG_ALIGN;
use crate::{prelude::*, util::BoundedWriter, util::SliceReader};

mod data;
mod ipset;

pub use data::{AdtAttrClass, CadtAttrClass, CreateAttrClass, DataAttr, DataKind};
pub use ipset::{IpsetAttr, IpsetAttrClass};

/// Netlink attribute header.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netlink.h#L229>.
//
// The layout of the `type_` field is structured as follows:
// ┌────────┬───────────────┬──────────┐
// │ Nested │ Net Byteorder │ Payload  │
// └────────┴───────────────┴──────────┘
//   bit 15      bit 14       bits 13-0
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct CAttrHeader {
    len: u16,
    type_: u16,
}

pub(crate) const IS_NESTED_MASK: u16 = 1u16 << 15;
pub(crate) const IS_NET_BYTEORDER_MASK: u16 = 1u16 << 14;
const ATTRIBUTE_TYPE_MASK: u16 = !(IS_NESTED_MASK | IS_NET_BYTEORDER_MASK);

pub(crate) const ATTR_HEADER_LEN: usize = size_of::<CAttrHeader>();

impl CAttrHeader {
    pub fn new(type_: u16, payload_len: usize) -> Self {
        Self {
            len: (ATTR_HEADER_LEN + payload_len) as u16,
            type_,
        }
    }

    pub fn type_(&self) -> u16 {
        self.type_ & ATTRIBUTE_TYPE_MASK
    }

    pub fn is_nested(&self) -> bool {
        self.type_ & IS_NESTED_MASK != 0
    }

    pub fn is_net_byteorder(&self) -> bool {
        self.type_ & IS_NET_BYTEORDER_MASK != 0
    }

    pub fn payload_len(&self) -> usize {
        (self.len as usize).saturating_sub(ATTR_HEADER_LEN)
    }

    /// Reads the next attribute header, validating its length.
    pub(crate) fn read_from(reader: &mut SliceReader) -> Result<Self> {
        let header = reader.read_val::<Self>()?;
        if (header.len as usize) < ATTR_HEADER_LEN || header.payload_len() > reader.remain() {
            return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "invalid attribute length");
        }
        Ok(header)
    }
}

/// A typed netlink attribute that can be decoded from a request.
pub trait Attribute: Debug + Sized {
    /// Reads the attribute payload described by `header` from the `reader`.
    ///
    /// Unknown attributes are skipped and reported as `None`.
    fn read_from(header: &CAttrHeader, reader: &mut SliceReader) -> Result<Option<Self>>;

    /// Reads all attributes until the reader is exhausted.
    fn read_all_from(reader: &mut SliceReader) -> Result<Vec<Self>> {
        let mut res = Vec::new();

        while reader.remain() >= ATTR_HEADER_LEN {
            let header = CAttrHeader::read_from(reader)?;
            let start = reader.pos();

            if let Some(attr) = Self::read_from(&header, reader)? {
                res.push(attr);
            }

            // Skip the rest of the payload and the padding bytes.
            let consumed = reader.pos() - start;
            let padded_len = header.payload_len().align_up(NLMSG_ALIGN);
            reader.skip_some(padded_len - consumed.min(padded_len));
        }

        Ok(res)
    }
}

/// An attribute kept in its encoded form.
///
/// Nested blocks whose interpretation depends on the command are kept raw
/// until the handler knows how to decode them.
#[derive(Debug, Clone)]
pub struct RawAttr {
    header: CAttrHeader,
    payload: Vec<u8>,
}

impl RawAttr {
    pub(crate) fn read_from(header: &CAttrHeader, reader: &mut SliceReader) -> Result<Self> {
        let payload = reader.read_bytes(header.payload_len())?.to_vec();
        Ok(Self {
            header: *header,
            payload,
        })
    }

    pub fn header(&self) -> &CAttrHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Splits a nested payload into its child attributes.
    pub fn children(&self) -> Result<Vec<RawAttr>> {
        let mut reader = SliceReader::new(&self.payload);
        let mut res = Vec::new();

        while reader.remain() >= ATTR_HEADER_LEN {
            let header = CAttrHeader::read_from(&mut reader)?;
            let child = RawAttr::read_from(&header, &mut reader)?;
            let padding_len = child.payload.len().align_up(NLMSG_ALIGN) - child.payload.len();
            reader.skip_some(padding_len);
            res.push(child);
        }

        Ok(res)
    }
}

/// Reads an IP address wrapped in a nested `IPSET_ATTR_IPADDR_*` attribute.
pub(crate) fn read_nested_ip(header: &CAttrHeader, reader: &mut SliceReader) -> Result<IpAddr> {
    if !header.is_nested() {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the address is not nested");
    }

    let inner = CAttrHeader::read_from(reader)?;
    match (IpAddrAttrClass::try_from(inner.type_()), inner.payload_len()) {
        (Ok(IpAddrAttrClass::IPV4), 4) => {
            let octets = reader.read_val::<[u8; 4]>()?;
            Ok(IpAddr::from(octets))
        }
        (Ok(IpAddrAttrClass::IPV6), 16) => {
            let octets = reader.read_val::<[u8; 16]>()?;
            Ok(IpAddr::from(octets))
        }
        (Ok(IpAddrAttrClass::IPV4), _) => {
            return_errno_with_message!(Errno::IPSET_ERR_IPADDR_IPV4, "invalid IPv4 address")
        }
        (Ok(IpAddrAttrClass::IPV6), _) => {
            return_errno_with_message!(Errno::IPSET_ERR_IPADDR_IPV6, "invalid IPv6 address")
        }
        _ => return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "unknown address attribute"),
    }
}

/// Address attributes nested in `IPSET_ATTR_IP` and friends.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter/ipset/ip_set.h#L152>.
#[derive(Debug, Clone, Copy, TryFromInt)]
#[repr(u16)]
#[expect(clippy::upper_case_acronyms)]
enum IpAddrAttrClass {
    IPV4 = 1,
    IPV6 = 2,
}

/// A position in an [`AttrWriter`] where a nested attribute starts.
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct NestMark(usize);

/// Encodes attributes into a size-limited message buffer.
///
/// Every `put_*` method either writes the whole attribute or fails
/// with [`Errno::EMSGSIZE`] without writing anything.
#[derive(Debug)]
pub struct AttrWriter {
    buf: BoundedWriter,
}

impl AttrWriter {
    pub(crate) fn new(buf: BoundedWriter) -> Self {
        Self { buf }
    }

    pub(crate) fn buf(&mut self) -> &mut BoundedWriter {
        &mut self.buf
    }

    pub(crate) fn into_inner(self) -> BoundedWriter {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn put_bytes(&mut self, type_: u16, payload: &[u8]) -> Result<()> {
        let padded_len = payload.len().align_up(NLMSG_ALIGN);
        if ATTR_HEADER_LEN + padded_len > self.buf.avail() {
            return_errno_with_message!(Errno::EMSGSIZE, "the message buffer is full");
        }

        self.buf
            .write_val(&CAttrHeader::new(type_, payload.len()))?;
        self.buf.write_bytes(payload)?;
        self.buf.write_zeros(padded_len - payload.len())
    }

    pub fn put_u8(&mut self, type_: u16, val: u8) -> Result<()> {
        self.put_bytes(type_, &[val])
    }

    /// Writes a host-order 32-bit value.
    pub fn put_u32(&mut self, type_: u16, val: u32) -> Result<()> {
        self.put_bytes(type_, val.as_bytes())
    }

    pub fn put_be16(&mut self, type_: u16, val: u16) -> Result<()> {
        self.put_bytes(type_ | IS_NET_BYTEORDER_MASK, &val.to_be_bytes())
    }

    pub fn put_be32(&mut self, type_: u16, val: u32) -> Result<()> {
        self.put_bytes(type_ | IS_NET_BYTEORDER_MASK, &val.to_be_bytes())
    }

    /// Writes a NUL-terminated string.
    pub fn put_string(&mut self, type_: u16, val: &str) -> Result<()> {
        let mut payload = Vec::with_capacity(val.len() + 1);
        payload.extend_from_slice(val.as_bytes());
        payload.push(0);
        self.put_bytes(type_, &payload)
    }

    /// Writes an address wrapped in a nested `IPSET_ATTR_IPADDR_*` attribute.
    pub fn put_ip(&mut self, type_: u16, addr: &IpAddr) -> Result<()> {
        let mark = self.nest_start(type_)?;
        let res = match addr {
            IpAddr::V4(addr) => self.put_bytes(
                IpAddrAttrClass::IPV4 as u16 | IS_NET_BYTEORDER_MASK,
                &addr.octets(),
            ),
            IpAddr::V6(addr) => self.put_bytes(
                IpAddrAttrClass::IPV6 as u16 | IS_NET_BYTEORDER_MASK,
                &addr.octets(),
            ),
        };
        if let Err(err) = res {
            self.nest_cancel(mark);
            return Err(err);
        }
        self.nest_end(mark);
        Ok(())
    }

    /// Starts a nested attribute whose length is fixed up by [`Self::nest_end`].
    pub fn nest_start(&mut self, type_: u16) -> Result<NestMark> {
        let offset = self.buf.len();
        self.buf
            .write_val(&CAttrHeader::new(type_ | IS_NESTED_MASK, 0))?;
        Ok(NestMark(offset))
    }

    pub fn nest_end(&mut self, mark: NestMark) {
        let NestMark(offset) = mark;
        let len = (self.buf.len() - offset) as u16;
        self.buf.patch_val(offset, &len);
    }

    /// Drops the nested attribute and everything written after it.
    pub fn nest_cancel(&mut self, mark: NestMark) {
        let NestMark(offset) = mark;
        self.buf.truncate(offset);
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct AnyAttr(u16, Vec<u8>);

    impl Attribute for AnyAttr {
        fn read_from(header: &CAttrHeader, reader: &mut SliceReader) -> Result<Option<Self>> {
            if header.type_() == 99 {
                reader.skip_some(header.payload_len());
                return Ok(None);
            }
            let payload = reader.read_bytes(header.payload_len())?.to_vec();
            Ok(Some(Self(header.type_(), payload)))
        }
    }

    #[test]
    fn write_then_read_with_padding() {
        let mut writer = AttrWriter::new(BoundedWriter::new(64));
        writer.put_u8(1, 6).unwrap();
        writer.put_bytes(99, &[1, 2, 3]).unwrap();
        writer.put_string(2, "abc").unwrap();
        assert_eq!(writer.len(), 24);

        let bytes = writer.into_inner().into_vec();
        let attrs = AnyAttr::read_all_from(&mut SliceReader::new(&bytes)).unwrap();
        assert_eq!(
            attrs,
            vec![AnyAttr(1, vec![6]), AnyAttr(2, b"abc\0".to_vec())]
        );
    }

    #[test]
    fn nested_ip() {
        let addr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7));
        let mut writer = AttrWriter::new(BoundedWriter::new(64));
        writer.put_ip(1, &addr).unwrap();

        let bytes = writer.into_inner().into_vec();
        let mut reader = SliceReader::new(&bytes);
        let header = CAttrHeader::read_from(&mut reader).unwrap();
        assert!(header.is_nested());
        assert_eq!(header.payload_len(), 8);
        assert_eq!(read_nested_ip(&header, &mut reader).unwrap(), addr);
    }

    #[test]
    fn nest_cancel_on_overflow() {
        let mut writer = AttrWriter::new(BoundedWriter::new(12));
        writer.put_u8(1, 1).unwrap();
        let error = writer
            .put_ip(2, &IpAddr::V4(Ipv4Addr::LOCALHOST))
            .unwrap_err();
        assert_eq!(error.error(), Errno::EMSGSIZE);
        assert_eq!(writer.len(), 8);
    }

    #[test]
    fn truncated_attribute() {
        let bytes = [8u8, 0, 1, 0, 0];
        let error = AnyAttr::read_all_from(&mut SliceReader::new(&bytes)).unwrap_err();
        assert_eq!(error.error(), Errno::IPSET_ERR_PROTOCOL);
    }
}
