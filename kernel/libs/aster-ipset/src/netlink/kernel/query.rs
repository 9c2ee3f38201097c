// SPDX-License-Identifier: MPL-2.0

//! Handle the introspection requests.

use super::required_setname;
use crate::{
    family::NfProto,
    netlink::{
        attr::IpsetAttrClass,
        segment::{IpsetSegment, ReplyWriter, SegHdrCommonFlags},
        IpsetCmd,
    },
    prelude::*,
    set_type::IPSET_PROTOCOL,
    IpSetCore,
};

fn start_reply(core: &IpSetCore, request: &IpsetSegment) -> Result<ReplyWriter> {
    let mut reply = ReplyWriter::new(
        core.config().message_size(),
        request.cmd(),
        SegHdrCommonFlags::empty(),
        request.header().seq,
        request.header().pid,
    )?;
    reply
        .attrs()
        .put_u8(IpsetAttrClass::PROTOCOL as u16, IPSET_PROTOCOL)?;
    Ok(reply)
}

pub(super) fn do_protocol(core: &IpSetCore, request: &IpsetSegment) -> Result<Vec<u8>> {
    Ok(start_reply(core, request)?.finish())
}

/// Reports the type, family and revision of a set.
pub(super) fn do_header(core: &IpSetCore, request: &IpsetSegment) -> Result<Vec<u8>> {
    let setname = required_setname(request)?;

    let Some((_, set)) = core.table().lock().find(setname) else {
        return_errno_with_message!(Errno::ENOENT, "the set does not exist");
    };

    let mut reply = start_reply(core, request)?;
    let writer = reply.attrs();
    writer.put_string(IpsetAttrClass::SETNAME as u16, set.name().as_str())?;
    writer.put_string(IpsetAttrClass::TYPENAME as u16, set.set_type().name())?;
    writer.put_u8(IpsetAttrClass::FAMILY as u16, set.family() as u8)?;
    writer.put_u8(IpsetAttrClass::REVISION as u16, set.revision())?;
    Ok(reply.finish())
}

/// Reports the revisions of a set type, loading the type if needed.
pub(super) fn do_type(core: &IpSetCore, request: &IpsetSegment) -> Result<Vec<u8>> {
    let (Some(typename), Some(family)) = (request.typename(), request.family()) else {
        return_errno_with_message!(Errno::IPSET_ERR_PROTOCOL, "the type or family is missing");
    };
    let Ok(family) = NfProto::try_from(family) else {
        return_errno_with_message!(Errno::IPSET_ERR_INVALID_FAMILY, "unsupported family");
    };

    let Some((min, max)) = core
        .registry()
        .query_revision_range_or_load(typename.as_str(), family)
    else {
        warn!("can't find ip_set type {}, family {:?}", typename, family);
        return_errno_with_message!(Errno::ENOENT, "the set type does not exist");
    };

    let mut reply = start_reply(core, request)?;
    let writer = reply.attrs();
    writer.put_string(IpsetAttrClass::TYPENAME as u16, typename.as_str())?;
    writer.put_u8(IpsetAttrClass::FAMILY as u16, family as u8)?;
    writer.put_u8(IpsetAttrClass::REVISION as u16, max)?;
    writer.put_u8(IpsetAttrClass::REVISION_MIN as u16, min)?;
    Ok(reply.finish())
}

#[cfg(test)]
mod test {
    use crate::{
        netlink::{IpsetCmd, NlSegment},
        test_utils::*,
    };

    #[test]
    fn type_query_loads_on_demand() {
        let core = core();
        let replies = messages(&core, &request(IpsetCmd::TYPE, 0, |attrs| {
            put_protocol(attrs);
            put_typename(attrs, "list:set");
            put_family(attrs, 2);
        }));

        let [reply] = &replies[..] else {
            panic!("expect one reply");
        };
        let NlSegment::Ipset(reply) = NlSegment::read_all(reply).unwrap().remove(0) else {
            panic!("expect an ipset reply");
        };
        assert_eq!(reply.cmd(), IpsetCmd::TYPE);
        assert_eq!(reply.typename().unwrap().as_str(), "list:set");
        assert_eq!(reply.revision(), Some(0));
        assert_eq!(reply.revision_min(), Some(0));
    }

    #[test]
    fn unknown_type() {
        let core = core();
        let replies = messages(&core, &request(IpsetCmd::TYPE, 0, |attrs| {
            put_protocol(attrs);
            put_typename(attrs, "bitmap:port");
            put_family(attrs, 2);
        }));
        assert_eq!(error_code(&replies[0]), Some(-2));
    }

    #[test]
    fn header_and_protocol() {
        let core = core();
        create_hash_ip(core.table(), core.registry(), "a");

        let replies = messages(&core, &request(IpsetCmd::HEADER, 0, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "a");
        }));
        let NlSegment::Ipset(reply) = NlSegment::read_all(&replies[0]).unwrap().remove(0) else {
            panic!("expect an ipset reply");
        };
        assert_eq!(reply.setname().unwrap().as_str(), "a");
        assert_eq!(reply.typename().unwrap().as_str(), "hash:ip");
        assert_eq!(reply.family(), Some(2));
        assert_eq!(reply.revision(), Some(0));

        let replies = messages(&core, &request(IpsetCmd::HEADER, 0, |attrs| {
            put_protocol(attrs);
        }));
        assert_eq!(error_code(&replies[0]), Some(-4097));

        let replies = messages(&core, &request(IpsetCmd::PROTOCOL, 0, |attrs| {
            put_protocol(attrs);
        }));
        let NlSegment::Ipset(reply) = NlSegment::read_all(&replies[0]).unwrap().remove(0) else {
            panic!("expect an ipset reply");
        };
        assert_eq!(reply.protocol(), Some(6));
    }
}
