// SPDX-License-Identifier: MPL-2.0

use super::{Attribute, CAttrHeader, RawAttr};
use crate::{
    family::{SetName, IPSET_MAXNAMELEN},
    prelude::*,
    util::SliceReader,
};

/// Command-level attributes.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter/ipset/ip_set.h#L43>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[repr(u16)]
#[expect(non_camel_case_types)]
#[expect(clippy::upper_case_acronyms)]
pub enum IpsetAttrClass {
    UNSPEC = 0,
    /// Protocol version
    PROTOCOL = 1,
    SETNAME = 2,
    TYPENAME = 3,
    REVISION = 4,
    FAMILY = 5,
    FLAGS = 6,
    /// Nested attributes
    DATA = 7,
    /// Multiple data containers
    ADT = 8,
    /// Restore lineno
    LINENO = 9,
    REVISION_MIN = 10,
}

impl IpsetAttrClass {
    /// The second set name of rename and swap shares the type name slot.
    pub const SETNAME2: Self = Self::TYPENAME;
    /// The minimal supported protocol shares the minimal revision slot.
    pub const PROTOCOL_MIN: Self = Self::REVISION_MIN;
}

#[derive(Debug, Clone)]
pub enum IpsetAttr {
    Protocol(u8),
    SetName(SetName),
    /// The type name, or the second set name of rename and swap.
    TypeName(SetName),
    Revision(u8),
    Family(u8),
    Flags(u32),
    Data(RawAttr),
    Adt(RawAttr),
    LineNo(u32),
    RevisionMin(u8),
}

impl IpsetAttr {
    fn class(&self) -> IpsetAttrClass {
        match self {
            IpsetAttr::Protocol(_) => IpsetAttrClass::PROTOCOL,
            IpsetAttr::SetName(_) => IpsetAttrClass::SETNAME,
            IpsetAttr::TypeName(_) => IpsetAttrClass::TYPENAME,
            IpsetAttr::Revision(_) => IpsetAttrClass::REVISION,
            IpsetAttr::Family(_) => IpsetAttrClass::FAMILY,
            IpsetAttr::Flags(_) => IpsetAttrClass::FLAGS,
            IpsetAttr::Data(_) => IpsetAttrClass::DATA,
            IpsetAttr::Adt(_) => IpsetAttrClass::ADT,
            IpsetAttr::LineNo(_) => IpsetAttrClass::LINENO,
            IpsetAttr::RevisionMin(_) => IpsetAttrClass::REVISION_MIN,
        }
    }

    pub fn type_(&self) -> u16 {
        self.class() as u16
    }
}

impl Attribute for IpsetAttr {
    fn read_from(header: &CAttrHeader, reader: &mut SliceReader) -> Result<Option<Self>> {
        let payload_len = header.payload_len();

        let Ok(class) = IpsetAttrClass::try_from(header.type_()) else {
            // Unknown attributes should be ignored.
            // Reference: <https://docs.kernel.org/userspace-api/netlink/intro.html#unknown-attributes>.
            reader.skip_some(payload_len);
            return Ok(None);
        };

        let res = match (class, payload_len) {
            (IpsetAttrClass::PROTOCOL, 1) => Self::Protocol(reader.read_val()?),
            (IpsetAttrClass::SETNAME, 1..=IPSET_MAXNAMELEN) => {
                Self::SetName(read_name(reader, payload_len)?)
            }
            (IpsetAttrClass::TYPENAME, 1..=IPSET_MAXNAMELEN) => {
                Self::TypeName(read_name(reader, payload_len)?)
            }
            (IpsetAttrClass::REVISION, 1) => Self::Revision(reader.read_val()?),
            (IpsetAttrClass::FAMILY, 1) => Self::Family(reader.read_val()?),
            (IpsetAttrClass::FLAGS, 4) => Self::Flags(reader.read_val()?),
            (IpsetAttrClass::DATA, _) => Self::Data(RawAttr::read_from(header, reader)?),
            (IpsetAttrClass::ADT, _) => Self::Adt(RawAttr::read_from(header, reader)?),
            (IpsetAttrClass::LINENO, 4) => Self::LineNo(reader.read_val()?),
            (IpsetAttrClass::REVISION_MIN, 1) => Self::RevisionMin(reader.read_val()?),
            (IpsetAttrClass::UNSPEC, _) => {
                reader.skip_some(payload_len);
                return Ok(None);
            }
            (class, payload_len) => {
                warn!(
                    "ipset attribute `{:?}` contains invalid payload length {}",
                    class, payload_len
                );
                return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "invalid attribute length");
            }
        };

        Ok(Some(res))
    }
}

fn read_name(reader: &mut SliceReader, payload_len: usize) -> Result<SetName> {
    let bytes = reader.read_bytes(payload_len)?;
    if !bytes.contains(&0) {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the name is not NUL-terminated");
    }
    SetName::from_c_bytes(bytes)
        .map_err(|_| Error::with_message(Errno::IPSET_ERR_PROTOCOL, "invalid name"))
}
