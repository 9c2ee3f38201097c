// SPDX-License-Identifier: MPL-2.0

//! The `hash:ip` set type: a set of IPv4 or IPv6 addresses.

use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

use hashbrown::HashMap;

use super::HashError;
use crate::{
    family::NfProto,
    netlink::{AttrWriter, CadtAttrClass, CreateAttrClass, DataAttr, IpsetAttrClass},
    packet::KadtArgs,
    prelude::*,
    set_type::{CreateParams, ListProgress, SetFeatures, SetType, SetVariant},
    table::{SetTable, SetTableGuard},
};

pub const TYPE_NAME: &str = "hash:ip";

const DEFAULT_HASHSIZE: u32 = 1024;
const MIN_HASHSIZE: u32 = 64;
const MAX_HASHSIZE: u32 = 1 << 31;
const DEFAULT_MAXELEM: u32 = 65536;
/// An upper bound on the elements reserved at creation; the table grows on demand past it.
const MAX_INITIAL_RESERVE: u32 = DEFAULT_HASHSIZE;

pub fn set_type() -> SetType {
    SetType::new(
        TYPE_NAME,
        NfProto::Unspec,
        0,
        1,
        SetFeatures::TYPE_IP,
        HashIp::create,
    )
}

#[derive(Debug)]
pub struct HashIp {
    family: NfProto,
    /// Maps each element to its insertion sequence number.
    elements: HashMap<IpAddr, usize>,
    /// The elements in insertion order. Listing resumes from a sequence
    /// number, which deletions between two dump messages do not shift.
    order: BTreeMap<usize, IpAddr>,
    next_seq: usize,
    /// The number of elements the table holds before it must be resized.
    hashsize: u32,
    maxelem: u32,
    netmask: Option<u8>,
}

impl HashIp {
    pub fn create(params: &CreateParams<'_>) -> Result<Box<dyn SetVariant>> {
        let max_prefix = match params.family {
            NfProto::Ipv4 => 32,
            NfProto::Ipv6 => 128,
            NfProto::Unspec => {
                return_errno_with_message!(
                    Errno::IPSET_ERR_INVALID_FAMILY,
                    "hash:ip needs an address family"
                )
            }
        };

        let mut hashsize = DEFAULT_HASHSIZE;
        let mut maxelem = DEFAULT_MAXELEM;
        let mut netmask = None;

        for attr in params.data {
            match attr {
                DataAttr::HashSize(size) => hashsize = (*size).max(MIN_HASHSIZE),
                DataAttr::MaxElem(max) => maxelem = *max,
                DataAttr::Netmask(mask) if (1..=max_prefix).contains(mask) => {
                    netmask = (*mask != max_prefix).then_some(*mask)
                }
                DataAttr::Netmask(_) => {
                    return_errno_with_message!(Errno::IPSET_ERR_INVALID_NETMASK, "invalid netmask")
                }
                DataAttr::Timeout(_) => {
                    return_errno_with_message!(Errno::IPSET_ERR_TIMEOUT, "timeouts are not supported")
                }
                _ => {}
            }
        }

        let Some(hashsize) = hashsize.checked_next_power_of_two().filter(|size| *size <= MAX_HASHSIZE)
        else {
            return_errno_with_message!(Errno::EINVAL, "the hash size is too large");
        };

        debug!(
            "create hash:ip hashsize {} maxelem {} netmask {:?}",
            hashsize, maxelem, netmask
        );

        let mut set = Self::new(params.family, hashsize, maxelem, netmask);
        set.reserve(hashsize.min(maxelem).min(MAX_INITIAL_RESERVE) as usize)?;
        Ok(Box::new(set))
    }

    fn new(family: NfProto, hashsize: u32, maxelem: u32, netmask: Option<u8>) -> Self {
        Self {
            family,
            elements: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            hashsize,
            maxelem,
            netmask,
        }
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        if self.elements.try_reserve(additional).is_err() {
            return_errno_with_message!(Errno::ENOMEM, "cannot allocate the hash table");
        }
        Ok(())
    }

    /// Validates the family of `addr` and applies the netmask.
    fn element(&self, addr: IpAddr) -> Result<IpAddr> {
        match (self.family, addr) {
            (NfProto::Ipv4, IpAddr::V4(addr)) => {
                let mask = prefix_mask_v4(self.netmask.unwrap_or(32));
                Ok(IpAddr::V4(Ipv4Addr::from(addr.to_bits() & mask)))
            }
            (NfProto::Ipv6, IpAddr::V6(addr)) => {
                let mask = prefix_mask_v6(self.netmask.unwrap_or(128));
                Ok(IpAddr::V6(Ipv6Addr::from(addr.to_bits() & mask)))
            }
            (NfProto::Ipv4, _) => {
                return_errno_with_message!(Errno::IPSET_ERR_IPADDR_IPV4, "expect an IPv4 address")
            }
            _ => return_errno_with_message!(Errno::IPSET_ERR_IPADDR_IPV6, "expect an IPv6 address"),
        }
    }

    fn element_from_data(&self, data: &[DataAttr]) -> Result<IpAddr> {
        let mut ip = None;

        for attr in data {
            match attr {
                DataAttr::Ip(addr) => ip = Some(*addr),
                DataAttr::IpTo(_) => return Err(HashError::RangeUnsupported.into()),
                DataAttr::Cidr(cidr) if Some(*cidr) != self.full_prefix() => {
                    return Err(HashError::RangeUnsupported.into());
                }
                DataAttr::Timeout(_) => {
                    return_errno_with_message!(Errno::IPSET_ERR_TIMEOUT, "timeouts are not supported")
                }
                _ => {}
            }
        }

        let Some(ip) = ip else {
            return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the address is missing");
        };
        self.element(ip)
    }

    fn full_prefix(&self) -> Option<u8> {
        match self.family {
            NfProto::Ipv4 => Some(32),
            NfProto::Ipv6 => Some(128),
            NfProto::Unspec => None,
        }
    }

    fn insert(&mut self, elem: IpAddr) -> Result<()> {
        if self.elements.contains_key(&elem) {
            return_errno_with_message!(Errno::IPSET_ERR_EXIST, "the element already exists");
        }
        if self.elements.len() >= self.maxelem as usize {
            return Err(HashError::Full.into());
        }
        if self.elements.len() >= self.hashsize as usize {
            return_errno_with_message!(Errno::EAGAIN, "the hash table must be resized");
        }
        self.reserve(1)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.elements.insert(elem, seq);
        self.order.insert(seq, elem);
        Ok(())
    }

    fn remove(&mut self, elem: &IpAddr) -> Result<()> {
        let Some(seq) = self.elements.remove(elem) else {
            return_errno_with_message!(Errno::IPSET_ERR_EXIST, "the element does not exist");
        };
        self.order.remove(&seq);
        Ok(())
    }

    fn contains(&self, elem: &IpAddr) -> bool {
        self.elements.contains_key(elem)
    }

    fn memsize(&self) -> usize {
        size_of::<Self>()
            + self.elements.capacity() * size_of::<(IpAddr, usize)>()
            + self.order.len() * size_of::<(usize, IpAddr)>()
    }
}

fn prefix_mask_v4(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - prefix as u32).unwrap_or(0)
}

fn prefix_mask_v6(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - prefix as u32).unwrap_or(0)
}

impl SetVariant for HashIp {
    fn ktest(&self, args: &KadtArgs<'_>) -> Result<bool> {
        let elem = self.element(args.pkt.addr(1, args.flags))?;
        Ok(self.contains(&elem))
    }

    fn kadd(&mut self, args: &KadtArgs<'_>) -> Result<()> {
        let elem = self.element(args.pkt.addr(1, args.flags))?;
        self.insert(elem)
    }

    fn kdel(&mut self, args: &KadtArgs<'_>) -> Result<()> {
        let elem = self.element(args.pkt.addr(1, args.flags))?;
        self.remove(&elem)
    }

    fn utest(&self, data: &[DataAttr], _table: &SetTableGuard<'_>) -> Result<bool> {
        let elem = self.element_from_data(data)?;
        Ok(self.contains(&elem))
    }

    fn uadd(&mut self, data: &[DataAttr], _table: &SetTableGuard<'_>) -> Result<()> {
        let elem = self.element_from_data(data)?;
        self.insert(elem)
    }

    fn udel(&mut self, data: &[DataAttr], _table: &SetTableGuard<'_>) -> Result<()> {
        let elem = self.element_from_data(data)?;
        self.remove(&elem)
    }

    fn flush(&mut self, _table: &SetTableGuard<'_>) {
        self.elements.clear();
        self.order.clear();
    }

    fn destroy(&mut self, _table: &SetTableGuard<'_>) {
        self.elements = HashMap::new();
        self.order = BTreeMap::new();
    }

    fn head(&self, writer: &mut AttrWriter) -> Result<()> {
        writer.put_be32(CreateAttrClass::HASHSIZE as u16, self.hashsize)?;
        writer.put_be32(CreateAttrClass::MAXELEM as u16, self.maxelem)?;
        if let Some(netmask) = self.netmask {
            writer.put_u8(CreateAttrClass::NETMASK as u16, netmask)?;
        }
        writer.put_be32(CreateAttrClass::ELEMENTS as u16, self.elements.len() as u32)?;
        writer.put_be32(CreateAttrClass::MEMSIZE as u16, self.memsize() as u32)
    }

    fn list(
        &self,
        writer: &mut AttrWriter,
        cursor: &mut usize,
        _table: &SetTable,
    ) -> Result<ListProgress> {
        // `cursor` is the sequence number of the next element to list.
        for (seq, elem) in self.order.range(*cursor..) {
            let Ok(mark) = writer.nest_start(IpsetAttrClass::DATA as u16) else {
                return Ok(ListProgress::More);
            };
            if writer.put_ip(CadtAttrClass::IP as u16, elem).is_err() {
                writer.nest_cancel(mark);
                return Ok(ListProgress::More);
            }
            writer.nest_end(mark);
            *cursor = seq + 1;
        }

        Ok(ListProgress::Done)
    }

    fn resize(&mut self, retried: bool) -> Result<()> {
        let factor = if retried { 4 } else { 2 };
        let Some(hashsize) = self
            .hashsize
            .checked_mul(factor)
            .filter(|size| *size <= MAX_HASHSIZE)
        else {
            return Err(HashError::Full.into());
        };

        // Memory is taken element by element; only the limit grows here.
        debug!("hash:ip resize from {} to {}", self.hashsize, hashsize);
        self.hashsize = hashsize;
        Ok(())
    }

    fn same_set(&self, other: &dyn SetVariant) -> bool {
        let Some(other) = other.as_any().downcast_ref::<Self>() else {
            return false;
        };
        self.hashsize == other.hashsize
            && self.maxelem == other.maxelem
            && self.netmask == other.netmask
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
