// SPDX-License-Identifier: MPL-2.0

//! The `list:set` set type: an ordered list of other sets.
//!
//! Every member is held by a reference on its table slot, so a member can
//! be neither destroyed nor renamed while it is listed. Packet-path
//! operations are forwarded to the members in order.

use crate::{
    family::{NfProto, SetName},
    netlink::{AdtAttrClass, AttrWriter, CreateAttrClass, DataAttr, IpsetAttrClass},
    packet::KadtArgs,
    prelude::*,
    set_type::{CreateParams, ListProgress, SetFeatures, SetType, SetVariant},
    table::{SetId, SetTable, SetTableGuard, IPSET_INVALID_ID},
};

pub const TYPE_NAME: &str = "list:set";

const DEFAULT_SIZE: u32 = 8;
const MIN_SIZE: u32 = 4;

/// Insert before the reference member instead of after it.
const IPSET_FLAG_BEFORE: u32 = 1 << 0;

pub fn set_type() -> SetType {
    SetType::new(
        TYPE_NAME,
        NfProto::Unspec,
        0,
        1,
        SetFeatures::TYPE_NAME | SetFeatures::DUMP_LAST,
        ListSet::create,
    )
}

/// Errors private to `list:set`.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter/ipset/ip_set_list.h#L8>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListError {
    Name = 0,
    Loop = 1,
    Before = 2,
    NameRef = 3,
    ListFull = 4,
    RefExist = 5,
}

impl From<ListError> for Error {
    fn from(err: ListError) -> Self {
        let msg = match err {
            ListError::Name => "the member set does not exist",
            ListError::Loop => "a list cannot contain a list",
            ListError::Before => "the reference set is missing",
            ListError::NameRef => "the reference set does not exist",
            ListError::ListFull => "the list is full",
            ListError::RefExist => "the reference set is not a member",
        };
        Error::type_specific(err as u8, msg)
    }
}

#[derive(Debug)]
pub struct ListSet {
    size: u32,
    members: Vec<SetId>,
}

/// The decoded data of an add, del or test request.
struct Element {
    name: SetName,
    before: bool,
    nameref: Option<SetName>,
}

impl Element {
    fn parse(data: &[DataAttr]) -> Result<Self> {
        let mut name = None;
        let mut nameref = None;
        let mut before = false;

        for attr in data {
            match attr {
                DataAttr::Name(set) => name = Some(set.clone()),
                DataAttr::NameRef(set) => nameref = Some(set.clone()),
                DataAttr::CadtFlags(flags) => before = flags & IPSET_FLAG_BEFORE != 0,
                DataAttr::Timeout(_) => {
                    return_errno_with_message!(Errno::IPSET_ERR_TIMEOUT, "timeouts are not supported")
                }
                _ => {}
            }
        }

        let Some(name) = name else {
            return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the member name is missing");
        };
        if before && nameref.is_none() {
            return Err(ListError::Before.into());
        }

        Ok(Self {
            name,
            before,
            nameref,
        })
    }
}

impl ListSet {
    pub fn create(params: &CreateParams<'_>) -> Result<Box<dyn SetVariant>> {
        let size = params
            .data
            .iter()
            .find_map(|attr| match attr {
                DataAttr::Size(size) => Some(*size),
                _ => None,
            })
            .unwrap_or(DEFAULT_SIZE)
            .max(MIN_SIZE);

        Ok(Box::new(Self {
            size,
            members: Vec::with_capacity(size as usize),
        }))
    }

    fn position(&self, id: SetId) -> Option<usize> {
        self.members.iter().position(|member| *member == id)
    }

    /// Finds the insertion point of an element, relative to its reference member.
    fn insert_pos(&self, elem: &Element, table: &SetTableGuard<'_>) -> Result<usize> {
        let Some(nameref) = elem.nameref.as_ref() else {
            return Ok(self.members.len());
        };

        let ref_id = table.find_set_id(nameref.as_str());
        if ref_id == IPSET_INVALID_ID {
            return Err(ListError::NameRef.into());
        }
        let Some(pos) = self.position(ref_id) else {
            return Err(ListError::RefExist.into());
        };

        Ok(if elem.before { pos } else { pos + 1 })
    }

    fn add_member(&mut self, elem: &Element, id: SetId, table: &SetTableGuard<'_>) -> Result<()> {
        let Some(set) = table.table().set_by_id(id) else {
            return Err(ListError::Name.into());
        };
        if set.set_type().features().contains(SetFeatures::DUMP_LAST) {
            return Err(ListError::Loop.into());
        }
        if self.position(id).is_some() {
            return_errno_with_message!(Errno::IPSET_ERR_EXIST, "the set is already a member");
        }

        let pos = self.insert_pos(elem, table)?;
        if self.members.len() >= self.size as usize {
            return Err(ListError::ListFull.into());
        }

        self.members.insert(pos, id);
        Ok(())
    }

    fn release_all(&mut self, table: &SetTableGuard<'_>) {
        for id in self.members.drain(..) {
            table.put(id);
        }
    }
}

impl SetVariant for ListSet {
    fn ktest(&self, args: &KadtArgs<'_>) -> Result<bool> {
        Ok(self
            .members
            .iter()
            .any(|id| args.table.test(*id, args.pkt, args.family, args.dim, args.flags)))
    }

    fn kadd(&mut self, args: &KadtArgs<'_>) -> Result<()> {
        for id in self.members.iter() {
            if args
                .table
                .add(*id, args.pkt, args.family, args.dim, args.flags)
                .is_ok()
            {
                return Ok(());
            }
        }
        return_errno_with_message!(Errno::EINVAL, "no member accepts the packet");
    }

    fn kdel(&mut self, args: &KadtArgs<'_>) -> Result<()> {
        for id in self.members.iter() {
            if args
                .table
                .del(*id, args.pkt, args.family, args.dim, args.flags)
                .is_ok()
            {
                return Ok(());
            }
        }
        return_errno_with_message!(Errno::EINVAL, "no member accepts the packet");
    }

    fn utest(&self, data: &[DataAttr], table: &SetTableGuard<'_>) -> Result<bool> {
        let elem = Element::parse(data)?;
        let id = table.find_set_id(elem.name.as_str());
        if id == IPSET_INVALID_ID {
            return Err(ListError::Name.into());
        }

        let Some(pos) = self.position(id) else {
            return Ok(false);
        };
        let Some(nameref) = elem.nameref.as_ref() else {
            return Ok(true);
        };

        // The member must sit right next to the reference set.
        let neighbour = if elem.before {
            self.members.get(pos + 1)
        } else {
            pos.checked_sub(1).and_then(|pos| self.members.get(pos))
        };
        Ok(neighbour.is_some_and(|id| table.find_set_id(nameref.as_str()) == *id))
    }

    fn uadd(&mut self, data: &[DataAttr], table: &SetTableGuard<'_>) -> Result<()> {
        let elem = Element::parse(data)?;
        let Some(id) = table.get_by_name(elem.name.as_str()) else {
            return Err(ListError::Name.into());
        };

        let res = self.add_member(&elem, id, table);
        if res.is_err() {
            table.put(id);
        }
        res
    }

    fn udel(&mut self, data: &[DataAttr], table: &SetTableGuard<'_>) -> Result<()> {
        let elem = Element::parse(data)?;
        let id = table.find_set_id(elem.name.as_str());
        if id == IPSET_INVALID_ID {
            return Err(ListError::Name.into());
        }
        let Some(pos) = self.position(id) else {
            return_errno_with_message!(Errno::IPSET_ERR_EXIST, "the set is not a member");
        };

        if let Some(nameref) = elem.nameref.as_ref() {
            let ref_id = table.find_set_id(nameref.as_str());
            if ref_id == IPSET_INVALID_ID {
                return Err(ListError::NameRef.into());
            }
            let neighbour = if elem.before {
                self.members.get(pos + 1)
            } else {
                pos.checked_sub(1).and_then(|pos| self.members.get(pos))
            };
            if neighbour != Some(&ref_id) {
                return_errno_with_message!(Errno::IPSET_ERR_EXIST, "the set is not a member");
            }
        }

        self.members.remove(pos);
        table.put(id);
        Ok(())
    }

    fn flush(&mut self, table: &SetTableGuard<'_>) {
        self.release_all(table);
    }

    fn destroy(&mut self, table: &SetTableGuard<'_>) {
        self.release_all(table);
    }

    fn head(&self, writer: &mut AttrWriter) -> Result<()> {
        writer.put_be32(CreateAttrClass::SIZE as u16, self.size)?;
        let memsize = size_of::<Self>() + self.members.capacity() * size_of::<SetId>();
        writer.put_be32(CreateAttrClass::MEMSIZE as u16, memsize as u32)
    }

    fn list(
        &self,
        writer: &mut AttrWriter,
        cursor: &mut usize,
        table: &SetTable,
    ) -> Result<ListProgress> {
        for id in self.members.iter().skip(*cursor) {
            let Some(set) = table.set_by_id(*id) else {
                *cursor += 1;
                continue;
            };

            let Ok(mark) = writer.nest_start(IpsetAttrClass::DATA as u16) else {
                return Ok(ListProgress::More);
            };
            if writer
                .put_string(AdtAttrClass::NAME as u16, set.name().as_str())
                .is_err()
            {
                writer.nest_cancel(mark);
                return Ok(ListProgress::More);
            }
            writer.nest_end(mark);
            *cursor += 1;
        }

        Ok(ListProgress::Done)
    }

    fn same_set(&self, other: &dyn SetVariant) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.size == other.size)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
