// SPDX-License-Identifier: MPL-2.0

//! Listing sets over several messages.
//!
//! A dump answers `IPSET_CMD_LIST` and `IPSET_CMD_SAVE`. Each call to
//! [`DumpCursor::step`] produces at most one message, which describes a
//! single set. The first message of a set carries its header; the following
//! ones continue with its elements. While a set is being listed, the cursor
//! holds a reference to it, which [`DumpCursor::release`] drops if the dump
//! is abandoned.

use super::{
    attr::{AttrWriter, CreateAttrClass, IpsetAttrClass},
    segment::{done_segment, IpsetSegment, ReplyWriter, SegHdrCommonFlags},
    IpsetCmd,
};
use crate::{
    prelude::*,
    set::IpSet,
    set_type::{ListProgress, SetFeatures, IPSET_PROTOCOL},
    table::{SetId, SetTable, SetTableGuard},
};

/// Which sets a dump visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    /// The first pass over all sets, skipping those listed last.
    All,
    /// The second pass over all sets, visiting only those listed last.
    Last,
    /// A single set.
    One,
}

#[derive(Debug)]
pub struct DumpCursor {
    mode: DumpMode,
    index: usize,
    /// The element cursor of the set at `index`.
    ///
    /// `Some` once the header of the set has been sent, which is also when
    /// the reference to the set is held.
    elements: Option<usize>,
    seq: u32,
    pid: u32,
    finished: bool,
}

impl DumpCursor {
    /// Starts a dump of the set named by `request`, or of all sets.
    pub(crate) fn new(table: &SetTable, request: &IpsetSegment) -> Result<Self> {
        let (mode, index) = match request.setname() {
            None => (DumpMode::All, 0),
            Some(name) => {
                let Some((id, _)) = table.lock().find(name.as_str()) else {
                    return_errno_with_message!(Errno::ENOENT, "the set does not exist");
                };
                (DumpMode::One, id as usize)
            }
        };

        debug!("dump start: mode {:?}, index {}", mode, index);
        Ok(Self {
            mode,
            index,
            elements: None,
            seq: request.header().seq,
            pid: request.header().pid,
            finished: false,
        })
    }

    pub fn mode(&self) -> DumpMode {
        self.mode
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Produces the next message of the dump.
    ///
    /// The last message is the `NLMSG_DONE` segment; after it, `Ok(None)` is
    /// returned. On error the reference held by the cursor is released and
    /// the dump is over.
    pub(crate) fn step(&mut self, table: &SetTable, limit: usize) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        let guard = table.lock();
        let res = self.step_locked(&guard, limit);
        drop(guard);

        match res {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => {
                self.finished = true;
                debug!("dump done");
                Ok(Some(done_segment(self.seq, self.pid, 0)))
            }
            Err(err) => {
                debug!("dump aborted: {}", err);
                self.release(table);
                self.finished = true;
                Err(err)
            }
        }
    }

    fn step_locked(&mut self, guard: &SetTableGuard<'_>, limit: usize) -> Result<Option<Vec<u8>>> {
        let table = guard.table();

        loop {
            if self.index >= table.capacity() {
                if self.mode == DumpMode::All {
                    self.mode = DumpMode::Last;
                    self.index = 0;
                    continue;
                }
                return Ok(None);
            }

            let Some(set) = table.set_by_id(self.index as SetId) else {
                if self.mode == DumpMode::One {
                    return_errno_with_message!(Errno::ENOENT, "the set has been destroyed");
                }
                self.index += 1;
                continue;
            };

            // Aggregate sets are listed after their members.
            let dump_last = set.set_type().features().contains(SetFeatures::DUMP_LAST);
            if self.mode != DumpMode::One && (self.mode == DumpMode::All) == dump_last {
                self.index += 1;
                continue;
            }

            return self.emit(&set, table, limit).map(Some);
        }
    }

    /// Writes the next message about `set`.
    fn emit(&mut self, set: &IpSet, table: &SetTable, limit: usize) -> Result<Vec<u8>> {
        let first = self.elements.is_none();
        if first {
            set.get();
            self.elements = Some(0);
        }

        let mut reply = ReplyWriter::new(
            limit,
            IpsetCmd::LIST,
            SegHdrCommonFlags::MULTI,
            self.seq,
            self.pid,
        )?;
        let writer = reply.attrs();
        writer.put_u8(IpsetAttrClass::PROTOCOL as u16, IPSET_PROTOCOL)?;
        writer.put_string(IpsetAttrClass::SETNAME as u16, set.name().as_str())?;
        if first {
            write_header(writer, set)?;
        }

        let mut cursor = self.elements.unwrap_or(0);
        let start = cursor;
        let mark = writer.nest_start(IpsetAttrClass::ADT as u16)?;
        let progress = set.read_variant().list(writer, &mut cursor, table)?;
        writer.nest_end(mark);

        match progress {
            ListProgress::Done => {
                set.put();
                self.elements = None;
                self.index = match self.mode {
                    DumpMode::One => table.capacity(),
                    _ => self.index + 1,
                };
            }
            ListProgress::More if !first && cursor == start => {
                return_errno_with_message!(Errno::EMSGSIZE, "an element does not fit in a message");
            }
            ListProgress::More => self.elements = Some(cursor),
        }

        Ok(reply.finish())
    }

    /// Releases the reference held on the set being listed.
    pub(crate) fn release(&mut self, table: &SetTable) {
        if self.elements.take().is_some() {
            debug!("release set at index {}", self.index);
            table.lock().put(self.index as SetId);
        }
    }
}

fn write_header(writer: &mut AttrWriter, set: &IpSet) -> Result<()> {
    writer.put_string(IpsetAttrClass::TYPENAME as u16, set.set_type().name())?;
    writer.put_u8(IpsetAttrClass::FAMILY as u16, set.family() as u8)?;
    writer.put_u8(IpsetAttrClass::REVISION as u16, set.revision())?;

    let mark = writer.nest_start(IpsetAttrClass::DATA as u16)?;
    set.read_variant().head(writer)?;
    // The reference held by the dump itself is not reported.
    writer.put_be32(
        CreateAttrClass::REFERENCES as u16,
        set.ref_count().saturating_sub(1),
    )?;
    writer.nest_end(mark);
    Ok(())
}
