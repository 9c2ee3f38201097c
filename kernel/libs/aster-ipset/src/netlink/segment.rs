// SPDX-License-Identifier: MPL-2.0

//! Netlink segments of the control protocol.
//!
//! Every ipset segment is laid out as follows:
//!
//! ┌────────────┬───────────┬────────────┐
//! │ CMsgSegHdr │ CNfGenMsg │ Attributes │
//! └────────────┴───────────┴────────────┘

use align_ext::AlignExt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{
    attr::{Attribute, AttrWriter, CAttrHeader, IpsetAttr, IpsetAttrClass, RawAttr, ATTR_HEADER_LEN},
    IpsetCmd, NFNETLINK_V0, NLMSG_ALIGN,
};
use crate::{
    family::{NfProto, SetName},
    prelude::*,
    util::{BoundedWriter, SliceReader},
};

/// Netlink segment header.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netlink.h#L52>.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct CMsgSegHdr {
    /// Length of the segment, including the header
    pub len: u32,
    /// Type of the segment
    pub type_: u16,
    /// Flags
    pub flags: u16,
    /// Sequence number
    pub seq: u32,
    /// Sending process port ID
    pub pid: u32,
}

pub(crate) const SEG_HEADER_LEN: usize = size_of::<CMsgSegHdr>();

/// The nfnetlink message body.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter/nfnetlink.h#L31>.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct CNfGenMsg {
    /// Address family
    pub family: u8,
    /// nfnetlink version
    pub version: u8,
    /// Resource ID, in network byte order
    pub res_id: u16,
}

const NFGEN_MSG_LEN: usize = size_of::<CNfGenMsg>();

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[expect(clippy::upper_case_acronyms)]
pub enum CSegmentType {
    NOOP = 1,
    ERROR = 2,
    DONE = 3,
    OVERRUN = 4,
}

bitflags! {
    /// Common flags used in [`CMsgSegHdr`].
    ///
    /// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netlink.h#L62>.
    pub struct SegHdrCommonFlags: u16 {
        /// Indicates a request message
        const REQUEST = 0x01;
        /// Multipart message, terminated by NLMSG_DONE
        const MULTI = 0x02;
        /// Reply with an acknowledgment, with zero or an error code
        const ACK = 0x04;
        /// Echo this request
        const ECHO = 0x08;
        /// Dump was inconsistent due to sequence change
        const DUMP_INTR = 0x10;
        /// Dump was filtered as requested
        const DUMP_FILTERED = 0x20;
    }
}

bitflags! {
    /// Modifiers for NEW requests.
    ///
    /// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netlink.h#L78>.
    pub struct NewRequestFlags: u16 {
        /// Override existing
        const REPLACE = 0x100;
        /// Do not touch, if it exists
        const EXCL = 0x200;
        /// Create, if it does not exist
        const CREATE = 0x400;
        /// Add to end of list
        const APPEND = 0x800;
    }
}

/// A request or reply of the ipset subsystem.
#[derive(Debug, Clone)]
pub struct IpsetSegment {
    header: CMsgSegHdr,
    body: CNfGenMsg,
    cmd: IpsetCmd,
    attrs: Vec<IpsetAttr>,
    /// The segment as received, echoed back by error acknowledgements.
    raw: Vec<u8>,
}

impl IpsetSegment {
    /// Reads the segment whose header has already been consumed.
    pub(crate) fn read_from(header: CMsgSegHdr, reader: &mut SliceReader) -> Result<Self> {
        let start = reader.pos();
        let cmd = IpsetCmd::from_segment_type(header.type_)?;
        let payload = reader.read_bytes(payload_len(&header)?)?;

        let mut raw = Vec::with_capacity(header.len as usize);
        raw.extend_from_slice(header.as_bytes());
        raw.extend_from_slice(payload);

        let mut payload_reader = SliceReader::new(payload);
        let body = payload_reader.read_val::<CNfGenMsg>().map_err(|_| {
            Error::with_message(Errno::IPSET_ERR_PROTOCOL, "the nfnetlink header is missing")
        })?;
        let attrs = IpsetAttr::read_all_from(&mut payload_reader)?;

        skip_padding(reader, reader.pos() - start);

        Ok(Self {
            header,
            body,
            cmd,
            attrs,
            raw,
        })
    }

    pub fn header(&self) -> &CMsgSegHdr {
        &self.header
    }

    pub fn body(&self) -> &CNfGenMsg {
        &self.body
    }

    pub fn cmd(&self) -> IpsetCmd {
        self.cmd
    }

    pub fn attrs(&self) -> &[IpsetAttr] {
        &self.attrs
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn flags(&self) -> SegHdrCommonFlags {
        SegHdrCommonFlags::from_bits_truncate(self.header.flags)
    }

    /// Returns whether an existing object should be silently accepted.
    ///
    /// User space asks for exclusivity with `NLM_F_EXCL`;
    /// without it, the exist flag is set.
    pub fn exist_ok(&self) -> bool {
        !NewRequestFlags::from_bits_truncate(self.header.flags).contains(NewRequestFlags::EXCL)
    }

    pub fn protocol(&self) -> Option<u8> {
        self.attrs.iter().find_map(|attr| match attr {
            IpsetAttr::Protocol(protocol) => Some(*protocol),
            _ => None,
        })
    }

    pub fn setname(&self) -> Option<&SetName> {
        self.attrs.iter().find_map(|attr| match attr {
            IpsetAttr::SetName(name) => Some(name),
            _ => None,
        })
    }

    /// Returns the type name, which is also the second set name of rename and swap.
    pub fn typename(&self) -> Option<&SetName> {
        self.attrs.iter().find_map(|attr| match attr {
            IpsetAttr::TypeName(name) => Some(name),
            _ => None,
        })
    }

    pub fn revision(&self) -> Option<u8> {
        self.attrs.iter().find_map(|attr| match attr {
            IpsetAttr::Revision(revision) => Some(*revision),
            _ => None,
        })
    }

    pub fn family(&self) -> Option<u8> {
        self.attrs.iter().find_map(|attr| match attr {
            IpsetAttr::Family(family) => Some(*family),
            _ => None,
        })
    }

    pub fn revision_min(&self) -> Option<u8> {
        self.attrs.iter().find_map(|attr| match attr {
            IpsetAttr::RevisionMin(revision) => Some(*revision),
            _ => None,
        })
    }

    pub fn data(&self) -> Option<&RawAttr> {
        self.attrs.iter().find_map(|attr| match attr {
            IpsetAttr::Data(data) => Some(data),
            _ => None,
        })
    }

    pub fn adt(&self) -> Option<&RawAttr> {
        self.attrs.iter().find_map(|attr| match attr {
            IpsetAttr::Adt(adt) => Some(adt),
            _ => None,
        })
    }

    pub fn lineno(&self) -> Option<u32> {
        self.attrs.iter().find_map(|attr| match attr {
            IpsetAttr::LineNo(lineno) => Some(*lineno),
            _ => None,
        })
    }

    /// Writes the failing line number into the `LINENO` attribute of the request,
    /// so that the error acknowledgement carries it back.
    pub(crate) fn patch_lineno(&mut self, lineno: u32) {
        for attr in self.attrs.iter_mut() {
            if let IpsetAttr::LineNo(old) = attr {
                *old = lineno;
            }
        }

        let mut reader = SliceReader::new(&self.raw[SEG_HEADER_LEN + NFGEN_MSG_LEN..]);
        while reader.remain() >= ATTR_HEADER_LEN {
            let Ok(header) = CAttrHeader::read_from(&mut reader) else {
                return;
            };
            if header.type_() == IpsetAttrClass::LINENO as u16 && header.payload_len() == 4 {
                let offset = SEG_HEADER_LEN + NFGEN_MSG_LEN + reader.pos();
                self.raw[offset..offset + 4].copy_from_slice(lineno.as_bytes());
                return;
            }
            reader.skip_some(header.payload_len().align_up(NLMSG_ALIGN));
        }
    }
}

/// An error or acknowledgement segment.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netlink.h#L119>.
#[derive(Debug, Clone)]
pub struct ErrorSegment {
    header: CMsgSegHdr,
    /// Zero, or the negated error code
    error: i32,
    /// The offending request; only its header for acknowledgements
    request: Vec<u8>,
}

impl ErrorSegment {
    pub fn new_from_request(request: &IpsetSegment, error: Option<Error>) -> Self {
        Self::new_from_raw(request.header(), request.as_bytes(), error)
    }

    /// Builds the reply to a request that may not have been decoded.
    ///
    /// `raw` is the request as received, starting with its header.
    pub(crate) fn new_from_raw(
        request_header: &CMsgSegHdr,
        raw: &[u8],
        error: Option<Error>,
    ) -> Self {
        let header_len = SEG_HEADER_LEN.min(raw.len());
        let (error, echoed) = match error {
            Some(error) => (-error.code(), raw),
            None => (0, &raw[..header_len]),
        };

        let header = CMsgSegHdr {
            len: (SEG_HEADER_LEN + size_of::<i32>() + echoed.len()) as u32,
            type_: CSegmentType::ERROR as u16,
            flags: 0,
            seq: request_header.seq,
            pid: request_header.pid,
        };

        Self {
            header,
            error,
            request: echoed.to_vec(),
        }
    }

    pub fn header(&self) -> &CMsgSegHdr {
        &self.header
    }

    /// Returns zero or the negated error code.
    pub fn error(&self) -> i32 {
        self.error
    }

    /// Returns the echoed request.
    pub fn request(&self) -> &[u8] {
        &self.request
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.header.len as usize).align_up(NLMSG_ALIGN));
        bytes.extend_from_slice(self.header.as_bytes());
        bytes.extend_from_slice(self.error.as_bytes());
        bytes.extend_from_slice(&self.request);
        bytes.resize(bytes.len().align_up(NLMSG_ALIGN), 0);
        bytes
    }
}

/// Builds the `NLMSG_DONE` segment that terminates a dump.
///
/// `error` is zero, or the negated code of the error that aborted the dump.
pub(crate) fn done_segment(seq: u32, pid: u32, error: i32) -> Vec<u8> {
    let header = CMsgSegHdr {
        len: (SEG_HEADER_LEN + size_of::<i32>()) as u32,
        type_: CSegmentType::DONE as u16,
        flags: SegHdrCommonFlags::MULTI.bits(),
        seq,
        pid,
    };

    let mut bytes = Vec::with_capacity(header.len as usize);
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(error.as_bytes());
    bytes
}

/// Encodes one ipset reply segment.
#[derive(Debug)]
pub struct ReplyWriter {
    attrs: AttrWriter,
}

impl ReplyWriter {
    /// Starts a reply carrying `cmd`, limited to `limit` bytes in total.
    pub fn new(
        limit: usize,
        cmd: IpsetCmd,
        flags: SegHdrCommonFlags,
        seq: u32,
        pid: u32,
    ) -> Result<Self> {
        let header = CMsgSegHdr {
            len: 0,
            type_: cmd.segment_type(),
            flags: flags.bits(),
            seq,
            pid,
        };
        // User space does not interpret the family of replies.
        let body = CNfGenMsg {
            family: NfProto::Ipv4 as u8,
            version: NFNETLINK_V0,
            res_id: 0,
        };

        let mut buf = BoundedWriter::new(limit);
        buf.write_val(&header)?;
        buf.write_val(&body)?;

        Ok(Self {
            attrs: AttrWriter::new(buf),
        })
    }

    pub fn attrs(&mut self) -> &mut AttrWriter {
        &mut self.attrs
    }

    /// Returns whether no attribute has been written yet.
    pub fn is_empty(&self) -> bool {
        self.attrs.len() == SEG_HEADER_LEN + NFGEN_MSG_LEN
    }

    pub fn finish(self) -> Vec<u8> {
        let mut buf = self.attrs.into_inner();
        let len = buf.len() as u32;
        buf.patch_val(0, &len);
        buf.into_vec()
    }
}

/// Any segment received by the user-space side of the protocol.
#[derive(Debug, Clone)]
pub enum NlSegment {
    Ipset(IpsetSegment),
    Error(ErrorSegment),
    /// The end of a dump, with zero or the negated error that aborted it.
    Done(CMsgSegHdr, i32),
}

impl NlSegment {
    /// Reads all segments of a message.
    pub fn read_all(bytes: &[u8]) -> Result<Vec<Self>> {
        let mut reader = SliceReader::new(bytes);
        let mut res = Vec::new();

        while reader.remain() >= SEG_HEADER_LEN {
            let header = reader.read_val::<CMsgSegHdr>()?;
            res.push(Self::read_from(header, &mut reader)?);
        }

        Ok(res)
    }

    fn read_from(header: CMsgSegHdr, reader: &mut SliceReader) -> Result<Self> {
        match CSegmentType::try_from(header.type_) {
            Ok(CSegmentType::ERROR) => {
                let start = reader.pos();
                let payload = reader.read_bytes(payload_len(&header)?)?;
                let mut payload_reader = SliceReader::new(payload);
                let error = payload_reader.read_val::<i32>()?;
                let request = payload_reader.read_bytes(payload_reader.remain())?.to_vec();
                skip_padding(reader, reader.pos() - start);
                Ok(Self::Error(ErrorSegment {
                    header,
                    error,
                    request,
                }))
            }
            Ok(CSegmentType::DONE) => {
                let start = reader.pos();
                let payload = reader.read_bytes(payload_len(&header)?)?;
                let error = SliceReader::new(payload).read_val::<i32>().unwrap_or(0);
                skip_padding(reader, reader.pos() - start);
                Ok(Self::Done(header, error))
            }
            _ => Ok(Self::Ipset(IpsetSegment::read_from(header, reader)?)),
        }
    }
}

fn payload_len(header: &CMsgSegHdr) -> Result<usize> {
    let Some(payload_len) = (header.len as usize).checked_sub(SEG_HEADER_LEN) else {
        return_errno_with_message!(Errno::EINVAL, "the segment length is too small");
    };
    Ok(payload_len)
}

fn skip_padding(reader: &mut SliceReader, consumed: usize) {
    let padding_len = consumed.align_up(NLMSG_ALIGN) - consumed;
    reader.skip_some(padding_len);
}
