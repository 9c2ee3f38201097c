// SPDX-License-Identifier: MPL-2.0

//! Helpers shared by the unit tests.

use std::net::IpAddr;

use crate::{
    config::IpSetConfig,
    family::{NfProto, SetName},
    netlink::{
        AttrWriter, IpsetAttrClass, IpsetCmd, IpsetSegment, NlSegment, ReplyWriter, RequestCtx,
        Response, SegHdrCommonFlags,
    },
    packet::{DimFlags, PacketInfo},
    registry::TypeRegistry,
    set_type::IPSET_PROTOCOL,
    table::{CreateRequest, SetId, SetTable},
    IpSetCore,
};

pub(crate) fn ip(addr: &str) -> IpAddr {
    addr.parse().unwrap()
}

/// A TCP packet from and to `addr`.
pub(crate) fn packet(addr: &str) -> PacketInfo {
    PacketInfo {
        src: ip(addr),
        dst: ip(addr),
        proto: 6,
        sport: 1024,
        dport: 80,
        src_mac: None,
    }
}

pub(crate) fn create_hash_ip(table: &SetTable, registry: &TypeRegistry, name: &str) -> SetId {
    table
        .create(
            registry,
            &CreateRequest {
                name: SetName::new(name).unwrap(),
                typename: "hash:ip",
                family: NfProto::Ipv4,
                revision: 0,
                data: &[],
                exist_ok: false,
            },
        )
        .unwrap()
}

pub(crate) fn ip_add(table: &SetTable, id: SetId, addr: &str) {
    table
        .add(id, &packet(addr), NfProto::Ipv4, 1, DimFlags::ONE_SRC)
        .unwrap();
}

pub(crate) fn ip_test(table: &SetTable, id: SetId, addr: &str) -> bool {
    table.test(id, &packet(addr), NfProto::Ipv4, 1, DimFlags::ONE_SRC)
}

/// Returns the error code of a reply, or returns `None` for other messages.
pub(crate) fn error_code(msg: &[u8]) -> Option<i32> {
    match NlSegment::read_all(msg).ok()?.into_iter().next()? {
        NlSegment::Error(err) => Some(err.error()),
        _ => None,
    }
}

pub(crate) const ACK: u16 = 0x4;
pub(crate) const EXCL: u16 = 0x200;

pub(crate) fn core() -> IpSetCore {
    IpSetCore::default()
}

pub(crate) fn core_with_config(config: IpSetConfig) -> IpSetCore {
    IpSetCore::new(config)
}

/// Encodes a request the way user space does.
pub(crate) fn request(cmd: IpsetCmd, flags: u16, build: impl FnOnce(&mut AttrWriter)) -> Vec<u8> {
    let mut writer = ReplyWriter::new(4096, cmd, SegHdrCommonFlags::empty(), 7, 42).unwrap();
    build(writer.attrs());
    let mut bytes = writer.finish();
    let flags = flags | SegHdrCommonFlags::REQUEST.bits();
    bytes[6..8].copy_from_slice(&flags.to_ne_bytes());
    bytes
}

pub(crate) fn parse_request(bytes: &[u8]) -> IpsetSegment {
    match NlSegment::read_all(bytes).unwrap().remove(0) {
        NlSegment::Ipset(segment) => segment,
        other => panic!("unexpected segment {:?}", other),
    }
}

/// Handles a request that is not a dump and returns its replies.
pub(crate) fn messages(core: &IpSetCore, bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut request = parse_request(bytes);
    match core.handle_request(&mut request, &RequestCtx::privileged()) {
        Response::Messages(messages) => messages,
        Response::Dump(_) => panic!("unexpected dump"),
    }
}

pub(crate) fn put_protocol(attrs: &mut AttrWriter) {
    attrs
        .put_u8(IpsetAttrClass::PROTOCOL as u16, IPSET_PROTOCOL)
        .unwrap();
}

pub(crate) fn put_setname(attrs: &mut AttrWriter, name: &str) {
    attrs.put_string(IpsetAttrClass::SETNAME as u16, name).unwrap();
}

pub(crate) fn put_typename(attrs: &mut AttrWriter, name: &str) {
    attrs.put_string(IpsetAttrClass::TYPENAME as u16, name).unwrap();
}

pub(crate) fn put_family(attrs: &mut AttrWriter, family: u8) {
    attrs.put_u8(IpsetAttrClass::FAMILY as u16, family).unwrap();
}

/// Writes an IPv4 create request of set `name`.
pub(crate) fn put_create(attrs: &mut AttrWriter, name: &str, typename: &str) {
    put_create_with(attrs, name, typename, |_| {});
}

pub(crate) fn put_create_with(
    attrs: &mut AttrWriter,
    name: &str,
    typename: &str,
    data: impl FnOnce(&mut AttrWriter),
) {
    put_protocol(attrs);
    put_setname(attrs, name);
    put_typename(attrs, typename);
    attrs.put_u8(IpsetAttrClass::REVISION as u16, 0).unwrap();
    put_family(attrs, NfProto::Ipv4 as u8);

    let mark = attrs.nest_start(IpsetAttrClass::DATA as u16).unwrap();
    data(attrs);
    attrs.nest_end(mark);
}
