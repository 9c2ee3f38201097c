// SPDX-License-Identifier: MPL-2.0

use std::net::IpAddr;

use align_ext::AlignExt;

use super::{read_nested_ip, CAttrHeader, RawAttr, ATTR_HEADER_LEN};
use crate::{
    family::{SetName, IPSET_MAXNAMELEN},
    netlink::NLMSG_ALIGN,
    prelude::*,
    util::SliceReader,
};

/// Attributes shared by create and add/del/test data blocks.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter/ipset/ip_set.h#L91>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[repr(u16)]
#[expect(non_camel_case_types)]
#[expect(clippy::upper_case_acronyms)]
pub enum CadtAttrClass {
    UNSPEC = 0,
    IP = 1,
    IP_TO = 2,
    CIDR = 3,
    PORT = 4,
    PORT_TO = 5,
    TIMEOUT = 6,
    PROTO = 7,
    CADT_FLAGS = 8,
    CADT_LINENO = 9,
}

/// The last attribute number shared by create and add/del/test data.
const IPSET_ATTR_CADT_MAX: u16 = 16;

/// Attributes only meaningful in create data and in set headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[repr(u16)]
#[expect(clippy::upper_case_acronyms)]
pub enum CreateAttrClass {
    GC = 17,
    HASHSIZE = 18,
    MAXELEM = 19,
    NETMASK = 20,
    PROBES = 21,
    RESIZE = 22,
    SIZE = 23,
    /// Only reported in set headers
    ELEMENTS = 24,
    /// Only reported in set headers
    REFERENCES = 25,
    /// Only reported in set headers
    MEMSIZE = 26,
}

/// Attributes only meaningful in add/del/test data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[repr(u16)]
#[expect(clippy::upper_case_acronyms)]
pub enum AdtAttrClass {
    ETHER = 17,
    NAME = 18,
    NAMEREF = 19,
    IP2 = 20,
    CIDR2 = 21,
}

/// Which command a data block belongs to.
///
/// The attribute numbers above [`IPSET_ATTR_CADT_MAX`] are reused
/// with different meanings by create and add/del/test data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Create,
    Adt,
}

/// A decoded attribute of a data block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataAttr {
    Ip(IpAddr),
    IpTo(IpAddr),
    Cidr(u8),
    Port(u16),
    PortTo(u16),
    Timeout(u32),
    Proto(u8),
    CadtFlags(u32),
    LineNo(u32),

    Gc(u32),
    HashSize(u32),
    MaxElem(u32),
    Netmask(u8),
    Probes(u8),
    Resize(u8),
    Size(u32),

    Ether([u8; 6]),
    Name(SetName),
    NameRef(SetName),
    Ip2(IpAddr),
    Cidr2(u8),
}

impl DataAttr {
    /// Decodes every attribute of the nested data block `raw`.
    pub fn read_all(raw: &RawAttr, kind: DataKind) -> Result<Vec<Self>> {
        if !raw.header().is_nested() {
            return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the data is not nested");
        }

        let mut reader = SliceReader::new(raw.payload());
        let mut res = Vec::new();

        while reader.remain() >= ATTR_HEADER_LEN {
            let header = CAttrHeader::read_from(&mut reader)?;
            let start = reader.pos();

            if let Some(attr) = Self::read_from(&header, &mut reader, kind)? {
                res.push(attr);
            }

            let consumed = reader.pos() - start;
            let padded_len = header.payload_len().align_up(NLMSG_ALIGN);
            reader.skip_some(padded_len - consumed.min(padded_len));
        }

        Ok(res)
    }

    fn read_from(
        header: &CAttrHeader,
        reader: &mut SliceReader,
        kind: DataKind,
    ) -> Result<Option<Self>> {
        let type_ = header.type_();

        if type_ <= IPSET_ATTR_CADT_MAX {
            let Ok(class) = CadtAttrClass::try_from(type_) else {
                reader.skip_some(header.payload_len());
                return Ok(None);
            };
            return Self::read_cadt(class, header, reader).map(Some);
        }

        match kind {
            DataKind::Create => {
                let Ok(class) = CreateAttrClass::try_from(type_) else {
                    reader.skip_some(header.payload_len());
                    return Ok(None);
                };
                Self::read_create(class, header, reader)
            }
            DataKind::Adt => {
                let Ok(class) = AdtAttrClass::try_from(type_) else {
                    reader.skip_some(header.payload_len());
                    return Ok(None);
                };
                Self::read_adt(class, header, reader).map(Some)
            }
        }
    }

    fn read_cadt(
        class: CadtAttrClass,
        header: &CAttrHeader,
        reader: &mut SliceReader,
    ) -> Result<Self> {
        let res = match (class, header.payload_len()) {
            (CadtAttrClass::IP, _) => Self::Ip(read_nested_ip(header, reader)?),
            (CadtAttrClass::IP_TO, _) => Self::IpTo(read_nested_ip(header, reader)?),
            (CadtAttrClass::CIDR, 1) => Self::Cidr(reader.read_val()?),
            (CadtAttrClass::PORT, 2) => Self::Port(read_be16(header, reader)?),
            (CadtAttrClass::PORT_TO, 2) => Self::PortTo(read_be16(header, reader)?),
            (CadtAttrClass::TIMEOUT, 4) => Self::Timeout(read_be32(header, reader)?),
            (CadtAttrClass::PROTO, 1) => Self::Proto(reader.read_val()?),
            (CadtAttrClass::CADT_FLAGS, 4) => Self::CadtFlags(read_be32(header, reader)?),
            (CadtAttrClass::CADT_LINENO, 4) => Self::LineNo(reader.read_val()?),
            (class, payload_len) => return invalid_payload(class, payload_len),
        };
        Ok(res)
    }

    fn read_create(
        class: CreateAttrClass,
        header: &CAttrHeader,
        reader: &mut SliceReader,
    ) -> Result<Option<Self>> {
        let res = match (class, header.payload_len()) {
            (CreateAttrClass::GC, 4) => Self::Gc(read_be32(header, reader)?),
            (CreateAttrClass::HASHSIZE, 4) => Self::HashSize(read_be32(header, reader)?),
            (CreateAttrClass::MAXELEM, 4) => Self::MaxElem(read_be32(header, reader)?),
            (CreateAttrClass::NETMASK, 1) => Self::Netmask(reader.read_val()?),
            (CreateAttrClass::PROBES, 1) => Self::Probes(reader.read_val()?),
            (CreateAttrClass::RESIZE, 1) => Self::Resize(reader.read_val()?),
            (CreateAttrClass::SIZE, 4) => Self::Size(read_be32(header, reader)?),
            // Reported by the kernel only.
            (
                CreateAttrClass::ELEMENTS | CreateAttrClass::REFERENCES | CreateAttrClass::MEMSIZE,
                payload_len,
            ) => {
                reader.skip_some(payload_len);
                return Ok(None);
            }
            (class, payload_len) => return invalid_payload(class, payload_len),
        };
        Ok(Some(res))
    }

    fn read_adt(
        class: AdtAttrClass,
        header: &CAttrHeader,
        reader: &mut SliceReader,
    ) -> Result<Self> {
        let res = match (class, header.payload_len()) {
            (AdtAttrClass::ETHER, 6) => Self::Ether(reader.read_val()?),
            (AdtAttrClass::NAME, 1..=IPSET_MAXNAMELEN) => {
                Self::Name(read_name(reader, header.payload_len())?)
            }
            (AdtAttrClass::NAMEREF, 1..=IPSET_MAXNAMELEN) => {
                Self::NameRef(read_name(reader, header.payload_len())?)
            }
            (AdtAttrClass::IP2, _) => Self::Ip2(read_nested_ip(header, reader)?),
            (AdtAttrClass::CIDR2, 1) => Self::Cidr2(reader.read_val()?),
            (class, payload_len) => return invalid_payload(class, payload_len),
        };
        Ok(res)
    }
}

fn invalid_payload<C: Debug, T>(class: C, payload_len: usize) -> Result<T> {
    warn!(
        "ipset data attribute `{:?}` contains invalid payload length {}",
        class, payload_len
    );
    return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "invalid attribute length")
}

fn read_be16(header: &CAttrHeader, reader: &mut SliceReader) -> Result<u16> {
    if !header.is_net_byteorder() {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the value is not in network order");
    }
    Ok(u16::from_be_bytes(reader.read_val()?))
}

fn read_be32(header: &CAttrHeader, reader: &mut SliceReader) -> Result<u32> {
    if !header.is_net_byteorder() {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the value is not in network order");
    }
    Ok(u32::from_be_bytes(reader.read_val()?))
}

fn read_name(reader: &mut SliceReader, payload_len: usize) -> Result<SetName> {
    let bytes = reader.read_bytes(payload_len)?;
    SetName::from_c_bytes(bytes)
        .map_err(|_| Error::with_message(Errno::IPSET_ERR_PROTOCOL, "invalid set name"))
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::{netlink::attr::AttrWriter, util::BoundedWriter};

    fn data_block(kind_writer: impl FnOnce(&mut AttrWriter)) -> RawAttr {
        let mut writer = AttrWriter::new(BoundedWriter::new(256));
        let mark = writer.nest_start(7).unwrap();
        kind_writer(&mut writer);
        writer.nest_end(mark);

        let bytes = writer.into_inner().into_vec();
        let mut reader = SliceReader::new(&bytes);
        let header = CAttrHeader::read_from(&mut reader).unwrap();
        RawAttr::read_from(&header, &mut reader).unwrap()
    }

    #[test]
    fn create_and_adt_share_numbers() {
        let raw = data_block(|writer| {
            writer.put_be32(CreateAttrClass::HASHSIZE as u16, 64).unwrap();
            writer.put_string(AdtAttrClass::NAME as u16, "x").unwrap();
        });

        assert_eq!(
            DataAttr::read_all(&raw, DataKind::Create).unwrap_err().error(),
            Errno::IPSET_ERR_PROTOCOL
        );

        let raw = data_block(|writer| {
            writer.put_be32(CreateAttrClass::HASHSIZE as u16, 64).unwrap();
            writer.put_u8(CreateAttrClass::NETMASK as u16, 24).unwrap();
        });
        assert_eq!(
            DataAttr::read_all(&raw, DataKind::Create).unwrap(),
            vec![DataAttr::HashSize(64), DataAttr::Netmask(24)]
        );
    }

    #[test]
    fn adt_element() {
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let raw = data_block(|writer| {
            writer.put_ip(CadtAttrClass::IP as u16, &addr).unwrap();
            writer.put_be16(CadtAttrClass::PORT as u16, 80).unwrap();
            writer.put_u32(CadtAttrClass::CADT_LINENO as u16, 3).unwrap();
            writer.put_string(AdtAttrClass::NAME as u16, "members").unwrap();
        });

        assert_eq!(
            DataAttr::read_all(&raw, DataKind::Adt).unwrap(),
            vec![
                DataAttr::Ip(addr),
                DataAttr::Port(80),
                DataAttr::LineNo(3),
                DataAttr::Name(SetName::new("members").unwrap()),
            ]
        );
    }

    #[test]
    fn host_order_port_is_rejected() {
        let raw = data_block(|writer| {
            writer
                .put_bytes(CadtAttrClass::PORT as u16, &80u16.to_be_bytes())
                .unwrap();
        });
        assert_eq!(
            DataAttr::read_all(&raw, DataKind::Adt).unwrap_err().error(),
            Errno::IPSET_ERR_PROTOCOL
        );
    }
}
