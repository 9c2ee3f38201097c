// SPDX-License-Identifier: MPL-2.0

//! The socket option channel.
//!
//! Packet-filter front ends that only need to translate between set names
//! and indices use `getsockopt(SOL_IP, SO_IP_SET)` instead of the netlink
//! protocol. The option buffer holds a request which is overwritten in place
//! by the reply.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    family::{SetName, IPSET_MAXNAMELEN},
    netlink::RequestCtx,
    prelude::*,
    set_type::IPSET_PROTOCOL,
    table::{SetId, SetTable},
};

/// The socket option of the set engine.
pub const SO_IP_SET: i32 = 83;

/// Socket option operations.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter/ipset/ip_set.h#L264>.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromInt)]
#[expect(non_camel_case_types)]
#[expect(clippy::upper_case_acronyms)]
pub enum SockOptOp {
    GET_BYNAME = 0x00000006,
    GET_BYINDEX = 0x00000007,
    VERSION = 0x00000100,
}

/// The request and reply of [`SockOptOp::VERSION`].
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct CReqVersion {
    pub op: u32,
    pub version: u32,
}

/// The request and reply of [`SockOptOp::GET_BYNAME`] and [`SockOptOp::GET_BYINDEX`].
///
/// `set` is a union of the set name and the set index; the index occupies
/// its first two bytes.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct CReqGetSet {
    pub op: u32,
    pub version: u32,
    pub set: [u8; IPSET_MAXNAMELEN],
}

impl CReqGetSet {
    fn index(&self) -> SetId {
        SetId::from_ne_bytes([self.set[0], self.set[1]])
    }

    fn set_index(&mut self, index: SetId) {
        self.set = [0; IPSET_MAXNAMELEN];
        self.set[..2].copy_from_slice(&index.to_ne_bytes());
    }
}

/// Answers a `getsockopt` request held in `buf`.
pub fn getsockopt(table: &SetTable, ctx: &RequestCtx, optname: i32, buf: &mut [u8]) -> Result<()> {
    if !ctx.net_admin {
        return_errno_with_message!(Errno::EPERM, "CAP_NET_ADMIN is required");
    }
    if optname != SO_IP_SET {
        return_errno_with_message!(Errno::EBADF, "unknown socket option");
    }

    let Ok((op, _)) = u32::read_from_prefix(buf) else {
        return_errno_with_message!(Errno::EINVAL, "the option buffer is too short");
    };

    // Every operation below the version query carries the protocol version.
    if op < SockOptOp::VERSION as u32 {
        let Ok((req, _)) = CReqVersion::read_from_prefix(buf) else {
            return_errno_with_message!(Errno::EINVAL, "the option buffer is too short");
        };
        if req.version != IPSET_PROTOCOL as u32 {
            return_errno_with_message!(Errno::EPROTO, "wrong protocol version");
        }
    }

    let Ok(op) = SockOptOp::try_from(op) else {
        return_errno_with_message!(Errno::EBADMSG, "unknown operation");
    };
    debug!("ip_set sockopt: {:?}", op);

    match op {
        SockOptOp::VERSION => {
            let mut req = read_exact::<CReqVersion>(buf)?;
            req.version = IPSET_PROTOCOL as u32;
            buf.copy_from_slice(req.as_bytes());
        }
        SockOptOp::GET_BYNAME => {
            let mut req = read_exact::<CReqGetSet>(buf)?;
            req.set[IPSET_MAXNAMELEN - 1] = 0;
            let index = match SetName::from_c_bytes(&req.set) {
                Ok(name) => table.lock().find_set_id(name.as_str()),
                Err(_) => crate::table::IPSET_INVALID_ID,
            };
            req.set_index(index);
            buf.copy_from_slice(req.as_bytes());
        }
        SockOptOp::GET_BYINDEX => {
            let mut req = read_exact::<CReqGetSet>(buf)?;
            let index = req.index();
            if index as usize >= table.capacity() {
                return_errno_with_message!(Errno::EINVAL, "the index is out of range");
            }
            let name = table.lock().name_by_index(index);
            req.set = name.map(|name| name.to_c_bytes()).unwrap_or([0; IPSET_MAXNAMELEN]);
            buf.copy_from_slice(req.as_bytes());
        }
    }

    Ok(())
}

fn read_exact<T: FromBytes>(buf: &[u8]) -> Result<T> {
    if buf.len() != size_of::<T>() {
        return_errno_with_message!(Errno::EINVAL, "the option buffer has a wrong size");
    }
    let Ok(val) = T::read_from_bytes(buf) else {
        return_errno_with_message!(Errno::EINVAL, "the option buffer has a wrong size");
    };
    Ok(val)
}
