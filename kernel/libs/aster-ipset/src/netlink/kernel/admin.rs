// SPDX-License-Identifier: MPL-2.0

//! Handle requests that change the set table.

use super::required_setname;
use crate::{
    family::NfProto,
    netlink::{
        attr::{DataAttr, DataKind},
        segment::IpsetSegment,
    },
    prelude::*,
    table::CreateRequest,
    IpSetCore,
};

pub(super) fn do_create(core: &IpSetCore, request: &IpsetSegment) -> Result<()> {
    let (Some(name), Some(typename), Some(revision), Some(family)) = (
        request.setname(),
        request.typename(),
        request.revision(),
        request.family(),
    ) else {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "a create attribute is missing");
    };

    let Ok(family) = NfProto::try_from(family) else {
        return_errno_with_message!(Errno::IPSET_ERR_INVALID_FAMILY, "unsupported family");
    };

    let data = match request.data() {
        Some(raw) => DataAttr::read_all(raw, DataKind::Create)?,
        None => Vec::new(),
    };

    core.table().create(
        core.registry(),
        &CreateRequest {
            name: name.clone(),
            typename: typename.as_str(),
            family,
            revision,
            data: &data,
            exist_ok: request.exist_ok(),
        },
    )?;
    Ok(())
}

pub(super) fn do_destroy(core: &IpSetCore, request: &IpsetSegment) -> Result<()> {
    core.table()
        .destroy(request.setname().map(|name| name.as_str()))
}

pub(super) fn do_flush(core: &IpSetCore, request: &IpsetSegment) -> Result<()> {
    core.table()
        .flush(request.setname().map(|name| name.as_str()))
}

pub(super) fn do_rename(core: &IpSetCore, request: &IpsetSegment) -> Result<()> {
    let from = required_setname(request)?;
    let Some(to) = request.typename() else {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the new name is missing");
    };

    core.table().rename(from, to)
}

pub(super) fn do_swap(core: &IpSetCore, request: &IpsetSegment) -> Result<()> {
    let from = required_setname(request)?;
    let Some(to) = request.typename() else {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the second set name is missing");
    };

    core.table().swap(from, to.as_str())
}
