// SPDX-License-Identifier: MPL-2.0

//! Handle requests that add, delete or test elements.

use super::required_setname;
use crate::{
    netlink::{
        attr::{DataAttr, DataKind, IpsetAttrClass, RawAttr},
        segment::IpsetSegment,
        IpsetCmd,
    },
    prelude::*,
    set::IpSet,
    table::SetTableGuard,
    IpSetCore,
};

/// Adds or deletes one element, or a batch of them.
///
/// A batch stops at the first failing element. Its line number is written
/// back into the request so that the error reply carries it.
pub(super) fn do_add_del(core: &IpSetCore, request: &mut IpsetSegment) -> Result<()> {
    let setname = required_setname(request)?;

    let elements = match (request.data(), request.adt()) {
        (Some(data), None) => vec![data.clone()],
        (None, Some(adt)) if adt.header().is_nested() && request.lineno().is_some() => {
            adt.children()?
        }
        _ => {
            return_errno_with_message!(
                Errno::IPSET_ERR_PROTOCOL,
                "expect either one data block or a batch with a line number"
            )
        }
    };

    let guard = core.table().lock();
    let Some((_, set)) = guard.find(setname) else {
        return_errno_with_message!(Errno::ENOENT, "the set does not exist");
    };

    let cmd = request.cmd();
    let exist_ok = request.exist_ok();
    let max_retries = core.config().max_resize_retries;

    for (pos, element) in elements.iter().enumerate() {
        let data = read_element(element)?;
        let lineno = data
            .iter()
            .find_map(|attr| match attr {
                DataAttr::LineNo(lineno) => Some(*lineno),
                _ => None,
            })
            .unwrap_or(pos as u32 + 1);

        let res = match cmd {
            IpsetCmd::ADD => add_with_resize(&set, &data, &guard, max_retries),
            _ => set.write_variant().udel(&data, &guard),
        };

        match res {
            Ok(()) => {}
            Err(err) if exist_ok && err.error() == Errno::IPSET_ERR_EXIST => {}
            Err(err) => {
                drop(guard);
                request.patch_lineno(lineno);
                return Err(err);
            }
        }
    }

    Ok(())
}

/// Tests a single element. A missing element is reported as `IPSET_ERR_EXIST`.
pub(super) fn do_test(core: &IpSetCore, request: &IpsetSegment) -> Result<()> {
    let setname = required_setname(request)?;
    let Some(element) = request.data() else {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the data block is missing");
    };
    let data = DataAttr::read_all(element, DataKind::Adt)?;

    let guard = core.table().lock();
    let Some((_, set)) = guard.find(setname) else {
        return_errno_with_message!(Errno::ENOENT, "the set does not exist");
    };

    let res = set.read_variant().utest(&data, &guard);
    match res {
        Ok(true) => Ok(()),
        // User space cannot complete the element; a generic match is a match.
        Err(err) if err.error() == Errno::EAGAIN => Ok(()),
        Ok(false) => {
            return_errno_with_message!(Errno::IPSET_ERR_EXIST, "the element is not in the set")
        }
        Err(err) => Err(err),
    }
}

fn read_element(element: &RawAttr) -> Result<Vec<DataAttr>> {
    if element.header().type_() != IpsetAttrClass::DATA as u16 {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "a batch entry is not a data block");
    }
    DataAttr::read_all(element, DataKind::Adt)
}

fn add_with_resize(
    set: &IpSet,
    data: &[DataAttr],
    guard: &SetTableGuard<'_>,
    max_retries: u32,
) -> Result<()> {
    let mut retried = 0;

    loop {
        let res = set.write_variant().uadd(data, guard);
        match res {
            Err(err) if err.error() == Errno::EAGAIN && retried < max_retries => {
                debug!("set {} is full, resizing (retry {})", set.name(), retried);
                set.write_variant().resize(retried > 0)?;
                retried += 1;
            }
            res => return res,
        }
    }
}
