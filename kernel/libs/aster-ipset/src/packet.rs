// SPDX-License-Identifier: MPL-2.0

//! The packet path.
//!
//! A packet filter rule holds a [`SetId`] and tests, adds or deletes the
//! packet it sees through [`SetTable::test`], [`SetTable::add`] and
//! [`SetTable::del`]. These never take the administrative lock; only the lock
//! of the set itself is held while the storage is consulted.

use std::net::IpAddr;

use crate::{
    family::NfProto,
    prelude::*,
    table::{SetId, SetTable},
};

bitflags! {
    /// Selects the source or destination part of the packet for each dimension.
    pub struct DimFlags: u8 {
        const ONE_SRC = 1 << 0;
        const TWO_SRC = 1 << 1;
        const THREE_SRC = 1 << 2;
    }
}

/// The fields of a packet that sets can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    pub src: IpAddr,
    pub dst: IpAddr,
    /// The L4 protocol number.
    pub proto: u8,
    pub sport: u16,
    pub dport: u16,
    pub src_mac: Option<[u8; 6]>,
}

impl PacketInfo {
    pub fn family(&self) -> NfProto {
        NfProto::of(&self.src)
    }

    /// Returns the address used by dimension `dim`, counted from one.
    pub fn addr(&self, dim: u8, flags: DimFlags) -> IpAddr {
        if is_src(dim, flags) {
            self.src
        } else {
            self.dst
        }
    }

    /// Returns the port used by dimension `dim`, counted from one.
    pub fn port(&self, dim: u8, flags: DimFlags) -> u16 {
        if is_src(dim, flags) {
            self.sport
        } else {
            self.dport
        }
    }
}

fn is_src(dim: u8, flags: DimFlags) -> bool {
    match dim {
        1 => flags.contains(DimFlags::ONE_SRC),
        2 => flags.contains(DimFlags::TWO_SRC),
        3 => flags.contains(DimFlags::THREE_SRC),
        _ => false,
    }
}

/// The arguments of the packet-path operations of [`SetVariant`].
///
/// [`SetVariant`]: crate::set_type::SetVariant
#[derive(Debug)]
pub struct KadtArgs<'a> {
    pub pkt: &'a PacketInfo,
    pub family: NfProto,
    /// How many dimensions the caller supplies.
    pub dim: u8,
    pub flags: DimFlags,
    pub table: &'a SetTable,
}

impl SetTable {
    /// Tests whether the packet matches set `id`.
    ///
    /// Errors of the storage count as no match.
    pub fn test(
        &self,
        id: SetId,
        pkt: &PacketInfo,
        family: NfProto,
        dim: u8,
        flags: DimFlags,
    ) -> bool {
        let Some(set) = self.set_by_id(id) else {
            return false;
        };
        if !set.accepts(family, dim) {
            return false;
        }

        let args = KadtArgs {
            pkt,
            family,
            dim,
            flags,
            table: self,
        };

        let res = set.read_variant().ktest(&args);
        match res {
            Ok(matched) => matched,
            Err(err) if err.error() == Errno::EAGAIN => {
                // Matched, and the element must be materialized.
                if let Err(err) = set.write_variant().kadd(&args) {
                    debug!("ip_set: completing a match failed: {}", err);
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Adds the packet to set `id`.
    pub fn add(
        &self,
        id: SetId,
        pkt: &PacketInfo,
        family: NfProto,
        dim: u8,
        flags: DimFlags,
    ) -> Result<()> {
        let Some(set) = self.set_by_id(id) else {
            return_errno_with_message!(Errno::ENOENT, "the set does not exist");
        };
        if !set.accepts(family, dim) {
            return Ok(());
        }

        let args = KadtArgs {
            pkt,
            family,
            dim,
            flags,
            table: self,
        };
        set.write_variant().kadd(&args)
    }

    /// Deletes the packet from set `id`.
    pub fn del(
        &self,
        id: SetId,
        pkt: &PacketInfo,
        family: NfProto,
        dim: u8,
        flags: DimFlags,
    ) -> Result<()> {
        let Some(set) = self.set_by_id(id) else {
            return_errno_with_message!(Errno::ENOENT, "the set does not exist");
        };
        if !set.accepts(family, dim) {
            return Ok(());
        }

        let args = KadtArgs {
            pkt,
            family,
            dim,
            flags,
            table: self,
        };
        set.write_variant().kdel(&args)
    }
}
