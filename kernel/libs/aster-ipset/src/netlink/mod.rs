// SPDX-License-Identifier: MPL-2.0

//! The nfnetlink control protocol of the set engine.
//!
//! User space manages sets by sending [`IpsetSegment`] requests to the
//! kernel side of an [`IpsetNetlinkSocket`]. Each request carries one of the
//! [`IpsetCmd`] commands and a list of attributes; replies use the same
//! framing, terminated by an acknowledgement or, for dumps, a `NLMSG_DONE`.

use crate::prelude::*;

pub mod attr;
mod dump;
mod kernel;
mod segment;
mod socket;

pub use attr::{
    AdtAttrClass, AttrWriter, CAttrHeader, CadtAttrClass, CreateAttrClass, DataAttr, DataKind,
    IpsetAttr, IpsetAttrClass, RawAttr,
};
pub use dump::{DumpCursor, DumpMode};
pub use kernel::{RequestCtx, Response};
pub(crate) use kernel::{handle_request, start_dump};
pub use segment::{
    CMsgSegHdr, CNfGenMsg, CSegmentType, ErrorSegment, IpsetSegment, NewRequestFlags, NlSegment,
    ReplyWriter, SegHdrCommonFlags,
};
pub use socket::IpsetNetlinkSocket;

/// The alignment of netlink headers and attributes.
pub const NLMSG_ALIGN: usize = 4;

/// The nfnetlink subsystem of the set engine.
pub const NFNL_SUBSYS_IPSET: u8 = 6;

/// The nfnetlink message version.
pub const NFNETLINK_V0: u8 = 0;

/// The commands of the control protocol.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter/ipset/ip_set.h#L21>.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[expect(clippy::upper_case_acronyms)]
pub enum IpsetCmd {
    /// Return protocol version
    PROTOCOL = 1,
    /// Create a new (empty) set
    CREATE = 2,
    /// Destroy a (empty) set
    DESTROY = 3,
    /// Remove all elements from a set
    FLUSH = 4,
    /// Rename a set
    RENAME = 5,
    /// Swap two sets
    SWAP = 6,
    /// List sets
    LIST = 7,
    /// Save sets
    SAVE = 8,
    /// Add an element to a set
    ADD = 9,
    /// Delete an element from a set
    DEL = 10,
    /// Test an element in a set
    TEST = 11,
    /// Get set header data only
    HEADER = 12,
    /// Get set type
    TYPE = 13,
}

impl IpsetCmd {
    /// Returns the netlink message type carrying this command.
    pub fn segment_type(self) -> u16 {
        ((NFNL_SUBSYS_IPSET as u16) << 8) | self as u16
    }

    /// Returns whether the command is answered by a dump.
    pub fn is_dump(self) -> bool {
        matches!(self, IpsetCmd::LIST | IpsetCmd::SAVE)
    }

    /// Decodes the command from a netlink message type.
    pub fn from_segment_type(type_: u16) -> Result<Self> {
        if (type_ >> 8) as u8 != NFNL_SUBSYS_IPSET {
            return_errno_with_message!(Errno::EINVAL, "the message is not for the ipset subsystem");
        }
        IpsetCmd::try_from((type_ & 0xff) as u8)
            .map_err(|_| Error::with_message(Errno::EOPNOTSUPP, "unknown ipset command"))
    }
}
