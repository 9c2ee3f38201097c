// SPDX-License-Identifier: MPL-2.0

//! The kernel side of the control protocol,
//! which is responsible for handling requests from user space.

use super::{
    dump::DumpCursor,
    segment::{ErrorSegment, IpsetSegment, SegHdrCommonFlags},
    IpsetCmd,
};
use crate::{prelude::*, set_type::IPSET_PROTOCOL, IpSetCore};

mod admin;
mod adt;
mod query;

/// The credentials of the sender of a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestCtx {
    /// Whether the sender has `CAP_NET_ADMIN`.
    pub net_admin: bool,
}

impl RequestCtx {
    pub const fn privileged() -> Self {
        Self { net_admin: true }
    }
}

/// What a request produced.
#[derive(Debug)]
pub enum Response {
    /// The reply messages, ending with the acknowledgement if there is one.
    Messages(Vec<Vec<u8>>),
    /// A dump, whose messages are produced by [`IpSetCore::dump_step`].
    Dump(DumpCursor),
}

enum Handled {
    Replies(Vec<Vec<u8>>),
    Dump(DumpCursor),
}

pub(crate) fn handle_request(
    core: &IpSetCore,
    request: &mut IpsetSegment,
    ctx: &RequestCtx,
) -> Response {
    debug!("ipset request: {:?}", request.cmd());

    match dispatch(core, request, ctx) {
        Ok(Handled::Replies(mut replies)) => {
            if request.flags().contains(SegHdrCommonFlags::ACK) {
                replies.push(ErrorSegment::new_from_request(request, None).to_bytes());
            }
            Response::Messages(replies)
        }
        Ok(Handled::Dump(cursor)) => Response::Dump(cursor),
        Err(error) => {
            debug!("ipset request {:?} failed: {}", request.cmd(), error);
            let err_segment = ErrorSegment::new_from_request(request, Some(error));
            Response::Messages(vec![err_segment.to_bytes()])
        }
    }
}

/// Starts a dump without going through the reply queue of a socket.
pub(crate) fn start_dump(
    core: &IpSetCore,
    request: &IpsetSegment,
    ctx: &RequestCtx,
) -> Result<DumpCursor> {
    check_request(request, ctx)?;
    if !request.cmd().is_dump() {
        return_errno_with_message!(Errno::EINVAL, "the command is not a dump");
    }
    DumpCursor::new(core.table(), request)
}

fn dispatch(core: &IpSetCore, request: &mut IpsetSegment, ctx: &RequestCtx) -> Result<Handled> {
    check_request(request, ctx)?;

    let reply = match request.cmd() {
        IpsetCmd::PROTOCOL => Some(query::do_protocol(core, request)?),
        IpsetCmd::CREATE => admin::do_create(core, request).map(|_| None)?,
        IpsetCmd::DESTROY => admin::do_destroy(core, request).map(|_| None)?,
        IpsetCmd::FLUSH => admin::do_flush(core, request).map(|_| None)?,
        IpsetCmd::RENAME => admin::do_rename(core, request).map(|_| None)?,
        IpsetCmd::SWAP => admin::do_swap(core, request).map(|_| None)?,
        IpsetCmd::LIST | IpsetCmd::SAVE => {
            let cursor = DumpCursor::new(core.table(), request)?;
            return Ok(Handled::Dump(cursor));
        }
        IpsetCmd::ADD | IpsetCmd::DEL => adt::do_add_del(core, request).map(|_| None)?,
        IpsetCmd::TEST => adt::do_test(core, request).map(|_| None)?,
        IpsetCmd::HEADER => Some(query::do_header(core, request)?),
        IpsetCmd::TYPE => Some(query::do_type(core, request)?),
    };

    Ok(Handled::Replies(reply.into_iter().collect()))
}

fn check_request(request: &IpsetSegment, ctx: &RequestCtx) -> Result<()> {
    if !ctx.net_admin {
        return_errno_with_message!(Errno::EPERM, "CAP_NET_ADMIN is required");
    }
    check_protocol(request)
}

fn check_protocol(request: &IpsetSegment) -> Result<()> {
    match request.protocol() {
        Some(IPSET_PROTOCOL) => Ok(()),
        Some(protocol) => {
            warn!(
                "ipset request with protocol {} (want {})",
                protocol, IPSET_PROTOCOL
            );
            return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "wrong protocol version")
        }
        None => return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the protocol is missing"),
    }
}

/// Returns the `IPSET_ATTR_SETNAME` attribute, which the command requires.
fn required_setname(request: &IpsetSegment) -> Result<&str> {
    match request.setname() {
        Some(name) => Ok(name.as_str()),
        None => return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the set name is missing"),
    }
}
