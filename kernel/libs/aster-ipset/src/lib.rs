// SPDX-License-Identifier: MPL-2.0

//! _ipset_ is the named set engine of the packet filter.
//!
//! Administrators create named sets of addresses (or of other sets) through
//! the nfnetlink control protocol; packet filter rules then refer to a set by
//! its index and test packets against it, or add and remove them, on the
//! packet path.
//!
//! The engine is made of:
//!  - a [`TypeRegistry`] of the set types that can be instantiated;
//!  - a [`SetTable`] of set instances, addressed by stable [`SetId`]s;
//!  - the packet path ([`SetTable::test`], [`SetTable::add`], [`SetTable::del`]);
//!  - the control protocol handler, reached through an [`IpsetNetlinkSocket`];
//!  - the socket option channel ([`sockopt`]).
//!
//! [`IpSetCore`] owns all of them.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod family;
pub mod netlink;
pub mod packet;
mod prelude;
pub mod registry;
pub mod set;
pub mod set_type;
pub mod sockopt;
pub mod table;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_utils;

pub use config::IpSetConfig;
pub use error::{Errno, Error};
pub use family::{NfProto, SetName};
pub use netlink::{DumpCursor, IpsetNetlinkSocket, IpsetSegment, RequestCtx, Response};
pub use packet::{DimFlags, PacketInfo};
pub use registry::{TypeLoader, TypeRegistry};
pub use set_type::{SetType, SetVariant, IPSET_PROTOCOL};
pub use table::{CreateRequest, SetId, SetTable, IPSET_INVALID_ID};

use crate::{prelude::*, types::BuiltinTypeLoader};

/// The set engine.
#[derive(Debug)]
pub struct IpSetCore {
    config: IpSetConfig,
    registry: TypeRegistry,
    table: SetTable,
}

impl IpSetCore {
    /// Creates the engine with the built-in set types available on demand.
    pub fn new(config: IpSetConfig) -> Self {
        Self::with_loader(config, Some(Box::new(BuiltinTypeLoader)))
    }

    pub fn with_loader(config: IpSetConfig, loader: Option<Box<dyn TypeLoader>>) -> Self {
        info!("ip_set: protocol {}", IPSET_PROTOCOL);
        debug!("ip_set: {:?}", config);

        Self {
            config,
            registry: TypeRegistry::new(loader),
            table: SetTable::new(config.table_capacity()),
        }
    }

    pub fn config(&self) -> &IpSetConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn table(&self) -> &SetTable {
        &self.table
    }

    pub fn create(&self, request: &CreateRequest<'_>) -> Result<SetId> {
        self.table.create(&self.registry, request)
    }

    pub fn destroy(&self, name: Option<&str>) -> Result<()> {
        self.table.destroy(name)
    }

    pub fn flush(&self, name: Option<&str>) -> Result<()> {
        self.table.flush(name)
    }

    pub fn rename(&self, from: &str, to: &SetName) -> Result<()> {
        self.table.rename(from, to)
    }

    pub fn swap(&self, from: &str, to: &str) -> Result<()> {
        self.table.swap(from, to)
    }

    pub fn test(
        &self,
        id: SetId,
        pkt: &PacketInfo,
        family: NfProto,
        dim: u8,
        flags: DimFlags,
    ) -> bool {
        self.table.test(id, pkt, family, dim, flags)
    }

    pub fn add(
        &self,
        id: SetId,
        pkt: &PacketInfo,
        family: NfProto,
        dim: u8,
        flags: DimFlags,
    ) -> Result<()> {
        self.table.add(id, pkt, family, dim, flags)
    }

    pub fn del(
        &self,
        id: SetId,
        pkt: &PacketInfo,
        family: NfProto,
        dim: u8,
        flags: DimFlags,
    ) -> Result<()> {
        self.table.del(id, pkt, family, dim, flags)
    }

    /// Takes a reference to set `name` on behalf of a packet filter rule.
    pub fn nfnl_get(&self, name: &str) -> SetId {
        self.table.nfnl_get(name)
    }

    pub fn nfnl_get_by_index(&self, id: SetId) -> SetId {
        self.table.nfnl_get_by_index(id)
    }

    pub fn nfnl_put(&self, id: SetId) {
        self.table.nfnl_put(id)
    }

    /// Handles a control protocol request.
    ///
    /// The request is mutable because a failing batch records the failing
    /// line number in it.
    pub fn handle_request(&self, request: &mut IpsetSegment, ctx: &RequestCtx) -> Response {
        netlink::handle_request(self, request, ctx)
    }

    /// Starts answering a list or save request.
    pub fn start_dump(&self, request: &IpsetSegment, ctx: &RequestCtx) -> Result<DumpCursor> {
        netlink::start_dump(self, request, ctx)
    }

    /// Produces the next message of a dump, or `None` once it is over.
    pub fn dump_step(&self, cursor: &mut DumpCursor) -> Result<Option<Vec<u8>>> {
        cursor.step(&self.table, self.config.message_size())
    }

    /// Tears down a dump, releasing the set it was listing.
    ///
    /// Must be called for every dump that is abandoned before its end.
    pub fn dump_done(&self, cursor: &mut DumpCursor) {
        cursor.release(&self.table);
    }

    /// Answers a `getsockopt` request on the set engine option.
    pub fn getsockopt(&self, ctx: &RequestCtx, optname: i32, buf: &mut [u8]) -> Result<()> {
        sockopt::getsockopt(&self.table, ctx, optname, buf)
    }
}

impl Default for IpSetCore {
    fn default() -> Self {
        Self::new(IpSetConfig::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::IpAddr;

    use crate::{
        netlink::{AttrWriter, DataAttr, DataKind, IpsetAttrClass, IpsetCmd, NlSegment},
        test_utils::*,
    };

    fn put_ip_data(attrs: &mut AttrWriter, addr: &str, lineno: Option<u32>) {
        let mark = attrs.nest_start(IpsetAttrClass::DATA as u16).unwrap();
        attrs
            .put_ip(netlink::CadtAttrClass::IP as u16, &ip(addr))
            .unwrap();
        if let Some(lineno) = lineno {
            attrs
                .put_u32(netlink::CadtAttrClass::CADT_LINENO as u16, lineno)
                .unwrap();
        }
        attrs.nest_end(mark);
    }

    /// Builds a batch add of `addrs`, where `None` is an element without an address.
    fn batch_add(set: &str, addrs: &[Option<&str>]) -> Vec<u8> {
        request(IpsetCmd::ADD, ACK, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, set);
            attrs.put_u32(IpsetAttrClass::LINENO as u16, 0).unwrap();
            let adt = attrs.nest_start(IpsetAttrClass::ADT as u16).unwrap();
            for addr in addrs {
                match addr {
                    Some(addr) => put_ip_data(attrs, addr, None),
                    None => {
                        let mark = attrs.nest_start(IpsetAttrClass::DATA as u16).unwrap();
                        attrs.nest_end(mark);
                    }
                }
            }
            attrs.nest_end(adt);
        })
    }

    fn error_segment(messages: &[Vec<u8>]) -> netlink::ErrorSegment {
        match NlSegment::read_all(&messages[0]).unwrap().remove(0) {
            NlSegment::Error(err) => err,
            other => panic!("unexpected segment {:?}", other),
        }
    }

    /// Returns the addresses listed in a dump message.
    fn listed_addrs(message: &[u8]) -> Vec<IpAddr> {
        let mut addrs = Vec::new();
        for segment in NlSegment::read_all(message).unwrap() {
            let NlSegment::Ipset(reply) = segment else {
                continue;
            };
            for data in reply.adt().unwrap().children().unwrap() {
                for attr in DataAttr::read_all(&data, DataKind::Adt).unwrap() {
                    if let DataAttr::Ip(addr) = attr {
                        addrs.push(addr);
                    }
                }
            }
        }
        addrs
    }

    fn dump_names(core: &IpSetCore, request_bytes: &[u8]) -> Vec<String> {
        let request = parse_request(request_bytes);
        let mut cursor = core
            .start_dump(&request, &RequestCtx::privileged())
            .unwrap();

        let mut names = Vec::new();
        while let Some(message) = core.dump_step(&mut cursor).unwrap() {
            for segment in NlSegment::read_all(&message).unwrap() {
                if let NlSegment::Ipset(reply) = segment {
                    names.push(reply.setname().unwrap().as_str().to_string());
                }
            }
        }
        names
    }

    #[test]
    fn create_then_destroy_restores_the_table() {
        let core = core();
        let create = request(IpsetCmd::CREATE, ACK | EXCL, |attrs| {
            put_create(attrs, "a", "hash:ip")
        });
        assert_eq!(error_code(&messages(&core, &create)[0]), Some(0));
        assert_eq!(
            error_code(&messages(&core, &create)[0]),
            Some(-(Errno::EEXIST as i32))
        );

        let destroy = request(IpsetCmd::DESTROY, ACK, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "a");
        });
        assert_eq!(error_code(&messages(&core, &destroy)[0]), Some(0));
        assert_eq!(core.table().lock().iter().count(), 0);
        assert_eq!(error_code(&messages(&core, &destroy)[0]), Some(-2));

        assert_eq!(error_code(&messages(&core, &create)[0]), Some(0));
    }

    #[test]
    fn batch_stops_at_the_failing_line() {
        let core = core();
        let id = create_hash_ip(core.table(), core.registry(), "a");

        let replies = messages(
            &core,
            &batch_add("a", &[Some("10.0.0.1"), None, Some("10.0.0.3")]),
        );
        let err = error_segment(&replies);
        assert_eq!(err.error(), -(Errno::IPSET_ERR_PROTOCOL as i32));
        assert_eq!(parse_request(err.request()).lineno(), Some(2));

        assert!(ip_test(core.table(), id, "10.0.0.1"));
        assert!(!ip_test(core.table(), id, "10.0.0.3"));
    }

    #[test]
    fn batch_reports_the_element_line_number() {
        let core = core();
        create_hash_ip(core.table(), core.registry(), "a");
        ip_add(core.table(), 0, "10.0.0.2");

        let bytes = request(IpsetCmd::ADD, ACK | EXCL, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "a");
            attrs.put_u32(IpsetAttrClass::LINENO as u16, 0).unwrap();
            let adt = attrs.nest_start(IpsetAttrClass::ADT as u16).unwrap();
            put_ip_data(attrs, "10.0.0.1", Some(11));
            put_ip_data(attrs, "10.0.0.2", Some(12));
            attrs.nest_end(adt);
        });
        let err = error_segment(&messages(&core, &bytes));
        assert_eq!(err.error(), -(Errno::IPSET_ERR_EXIST as i32));
        assert_eq!(parse_request(err.request()).lineno(), Some(12));

        // Without NLM_F_EXCL, existing elements are accepted.
        let bytes = request(IpsetCmd::ADD, ACK, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "a");
            put_ip_data(attrs, "10.0.0.2", None);
        });
        assert_eq!(error_code(&messages(&core, &bytes)[0]), Some(0));
    }

    #[test]
    fn malformed_add_requests() {
        let core = core();
        create_hash_ip(core.table(), core.registry(), "a");

        // A batch without a line number.
        let bytes = request(IpsetCmd::ADD, ACK, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "a");
            let adt = attrs.nest_start(IpsetAttrClass::ADT as u16).unwrap();
            put_ip_data(attrs, "10.0.0.1", None);
            attrs.nest_end(adt);
        });
        assert_eq!(error_code(&messages(&core, &bytes)[0]), Some(-4097));

        // Neither a data block nor a batch.
        let bytes = request(IpsetCmd::DEL, ACK, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "a");
        });
        assert_eq!(error_code(&messages(&core, &bytes)[0]), Some(-4097));

        // An unknown set.
        let bytes = request(IpsetCmd::ADD, ACK, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "x");
            put_ip_data(attrs, "10.0.0.1", None);
        });
        assert_eq!(error_code(&messages(&core, &bytes)[0]), Some(-2));
    }

    #[test]
    fn add_resizes_the_set() {
        let core = core();
        let bytes = request(IpsetCmd::CREATE, ACK, |attrs| {
            put_create_with(attrs, "a", "hash:ip", |data| {
                data.put_be32(netlink::CreateAttrClass::HASHSIZE as u16, 64)
                    .unwrap();
            })
        });
        assert_eq!(error_code(&messages(&core, &bytes)[0]), Some(0));

        for i in 0..100u32 {
            let addr = format!("10.0.{}.{}", i / 256, i % 256);
            let bytes = request(IpsetCmd::ADD, ACK, |attrs| {
                put_protocol(attrs);
                put_setname(attrs, "a");
                put_ip_data(attrs, &addr, None);
            });
            assert_eq!(error_code(&messages(&core, &bytes)[0]), Some(0));
        }
        assert!(ip_test(core.table(), 0, "10.0.0.99"));
    }

    #[test]
    fn test_command() {
        let core = core();
        create_hash_ip(core.table(), core.registry(), "a");
        ip_add(core.table(), 0, "10.0.0.1");

        let test = |addr: &str| {
            let bytes = request(IpsetCmd::TEST, ACK, |attrs| {
                put_protocol(attrs);
                put_setname(attrs, "a");
                put_ip_data(attrs, addr, None);
            });
            error_code(&messages(&core, &bytes)[0])
        };
        assert_eq!(test("10.0.0.1"), Some(0));
        assert_eq!(test("10.0.0.2"), Some(-(Errno::IPSET_ERR_EXIST as i32)));
    }

    #[test]
    fn protocol_and_privileges_are_checked_first() {
        let core = core();
        let bytes = request(IpsetCmd::DESTROY, ACK, |attrs| {
            attrs.put_u8(IpsetAttrClass::PROTOCOL as u16, 5).unwrap();
        });
        assert_eq!(error_code(&messages(&core, &bytes)[0]), Some(-4097));

        let mut destroy = parse_request(&request(IpsetCmd::DESTROY, ACK, put_protocol));
        let Response::Messages(replies) =
            core.handle_request(&mut destroy, &RequestCtx { net_admin: false })
        else {
            panic!("expect messages");
        };
        assert_eq!(error_code(&replies[0]), Some(-1));

        // Without NLM_F_ACK, success is silent.
        let flush = request(IpsetCmd::FLUSH, 0, put_protocol);
        assert!(messages(&core, &flush).is_empty());
    }

    #[test]
    fn aggregate_sets_are_dumped_last() {
        let core = core();
        let x = request(IpsetCmd::CREATE, 0, |attrs| put_create(attrs, "x", "list:set"));
        messages(&core, &x);
        create_hash_ip(core.table(), core.registry(), "m1");
        create_hash_ip(core.table(), core.registry(), "m2");

        for member in ["m1", "m2"] {
            let bytes = request(IpsetCmd::ADD, ACK, |attrs| {
                put_protocol(attrs);
                put_setname(attrs, "x");
                let mark = attrs.nest_start(IpsetAttrClass::DATA as u16).unwrap();
                attrs
                    .put_string(netlink::AdtAttrClass::NAME as u16, member)
                    .unwrap();
                attrs.nest_end(mark);
            });
            assert_eq!(error_code(&messages(&core, &bytes)[0]), Some(0));
        }

        let names = dump_names(&core, &request(IpsetCmd::LIST, 0, put_protocol));
        assert_eq!(names, vec!["m1", "m2", "x"]);

        let names = dump_names(&core, &request(IpsetCmd::SAVE, 0, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "x");
        }));
        assert_eq!(names, vec!["x"]);

        // The dump released every reference it took.
        assert_eq!(core.table().set_by_id(0).unwrap().ref_count(), 0);
        assert_eq!(core.table().set_by_id(1).unwrap().ref_count(), 1);
    }

    #[test]
    fn dump_resumes_across_messages() {
        let config = IpSetConfig {
            dump_message_size: 512,
            ..IpSetConfig::default()
        };
        let core = core_with_config(config);
        let id = create_hash_ip(core.table(), core.registry(), "a");
        for i in 0..200u32 {
            ip_add(core.table(), id, &format!("10.1.{}.{}", i / 256, i % 256));
        }

        let list = parse_request(&request(IpsetCmd::LIST, 0, put_protocol));
        let mut cursor = core
            .start_dump(&list, &RequestCtx::privileged())
            .unwrap();

        let mut messages = 0;
        let mut elements = 0;
        let mut headers = 0;
        while let Some(message) = core.dump_step(&mut cursor).unwrap() {
            assert!(message.len() <= 512);
            for segment in NlSegment::read_all(&message).unwrap() {
                let NlSegment::Ipset(reply) = segment else {
                    continue;
                };
                messages += 1;
                if reply.typename().is_some() {
                    headers += 1;
                }
                elements += reply.adt().unwrap().children().unwrap().len();
            }
        }

        assert!(messages > 1);
        assert_eq!(headers, 1);
        assert_eq!(elements, 200);
        assert_eq!(core.table().set_by_id(id).unwrap().ref_count(), 0);
    }

    #[test]
    fn dump_done_releases_the_reference() {
        let config = IpSetConfig {
            dump_message_size: 512,
            ..IpSetConfig::default()
        };
        let core = core_with_config(config);
        let id = create_hash_ip(core.table(), core.registry(), "a");
        for i in 0..100u32 {
            ip_add(core.table(), id, &format!("10.2.0.{}", i));
        }

        let list = parse_request(&request(IpsetCmd::LIST, 0, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "a");
        }));
        let mut cursor = core
            .start_dump(&list, &RequestCtx::privileged())
            .unwrap();
        core.dump_step(&mut cursor).unwrap().unwrap();
        assert_eq!(core.table().set_by_id(id).unwrap().ref_count(), 1);

        core.dump_done(&mut cursor);
        assert_eq!(core.table().set_by_id(id).unwrap().ref_count(), 0);
        core.destroy(Some("a")).unwrap();

        let error = core.start_dump(&list, &RequestCtx::privileged()).unwrap_err();
        assert_eq!(error.error(), Errno::ENOENT);
    }

    #[test]
    fn swap_through_the_control_protocol() {
        let core = core();
        let a = create_hash_ip(core.table(), core.registry(), "a");
        create_hash_ip(core.table(), core.registry(), "b");
        ip_add(core.table(), a, "10.0.0.1");
        let held = core.nfnl_get("a");

        let swap = request(IpsetCmd::SWAP, ACK, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "a");
            put_typename(attrs, "b");
        });
        assert_eq!(error_code(&messages(&core, &swap)[0]), Some(0));
        assert!(!ip_test(core.table(), held, "10.0.0.1"));
        assert_eq!(error_code(&messages(&core, &swap)[0]), Some(0));
        assert!(ip_test(core.table(), held, "10.0.0.1"));

        let rename = request(IpsetCmd::RENAME, ACK, |attrs| {
            put_protocol(attrs);
            put_setname(attrs, "a");
            put_typename(attrs, "c");
        });
        assert_eq!(
            error_code(&messages(&core, &rename)[0]),
            Some(-(Errno::IPSET_ERR_REFERENCED as i32))
        );
        core.nfnl_put(held);
        assert_eq!(error_code(&messages(&core, &rename)[0]), Some(0));
    }

    #[test]
    fn retries_are_bounded() {
        let config = IpSetConfig {
            max_resize_retries: 0,
            ..IpSetConfig::default()
        };
        let core = core_with_config(config);
        let bytes = request(IpsetCmd::CREATE, ACK, |attrs| {
            put_create_with(attrs, "a", "hash:ip", |data| {
                data.put_be32(netlink::CreateAttrClass::HASHSIZE as u16, 64)
                    .unwrap();
            })
        });
        assert_eq!(error_code(&messages(&core, &bytes)[0]), Some(0));
        for i in 0..64u32 {
            ip_add(core.table(), 0, &format!("10.0.0.{}", i));
        }

        let replies = messages(&core, &batch_add("a", &[Some("10.0.0.1"), Some("10.0.1.0")]));
        let err = error_segment(&replies);
        assert_eq!(err.error(), -(Errno::EAGAIN as i32));
        assert_eq!(parse_request(err.request()).lineno(), Some(2));
        assert!(!ip_test(core.table(), 0, "10.0.1.0"));
    }

    #[test]
    fn huge_hash_size_is_accepted_lazily() {
        let core = core();
        let bytes = request(IpsetCmd::CREATE, ACK, |attrs| {
            put_create_with(attrs, "a", "hash:ip", |data| {
                data.put_be32(netlink::CreateAttrClass::HASHSIZE as u16, 1 << 31)
                    .unwrap();
            })
        });
        let code = error_code(&messages(&core, &bytes)[0]);
        assert!(code == Some(0) || code == Some(-(Errno::ENOMEM as i32)));

        if code == Some(0) {
            ip_add(core.table(), 0, "10.0.0.1");
            assert!(ip_test(core.table(), 0, "10.0.0.1"));
        }
    }

    #[test]
    fn dump_keeps_elements_deleted_behind_it() {
        let config = IpSetConfig {
            dump_message_size: 512,
            ..IpSetConfig::default()
        };
        let core = core_with_config(config);
        let id = create_hash_ip(core.table(), core.registry(), "a");
        let mut expected: Vec<IpAddr> = (0..200u32)
            .map(|i| ip(&format!("10.1.{}.{}", i / 256, i % 256)))
            .collect();
        for addr in expected.iter() {
            ip_add(core.table(), id, &addr.to_string());
        }

        let list = parse_request(&request(IpsetCmd::LIST, 0, put_protocol));
        let mut cursor = core
            .start_dump(&list, &RequestCtx::privileged())
            .unwrap();
        let first = core.dump_step(&mut cursor).unwrap().unwrap();
        let mut listed = listed_addrs(&first);
        assert!(!listed.is_empty());

        // The packet path deletes an element that has already been listed.
        let deleted = listed[0].to_string();
        core.del(id, &packet(&deleted), NfProto::Ipv4, 1, DimFlags::ONE_SRC)
            .unwrap();

        while let Some(message) = core.dump_step(&mut cursor).unwrap() {
            listed.extend(listed_addrs(&message));
        }
        listed.sort();
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[test]
    fn large_messages_keep_nest_lengths_valid() {
        let config = IpSetConfig {
            dump_message_size: 200_000,
            ..IpSetConfig::default()
        };
        let core = core_with_config(config);
        let id = core
            .create(&CreateRequest {
                name: SetName::new("a").unwrap(),
                typename: "hash:ip",
                family: NfProto::Ipv4,
                revision: 0,
                data: &[DataAttr::HashSize(8192)],
                exist_ok: false,
            })
            .unwrap();
        for i in 0..5000u32 {
            ip_add(core.table(), id, &format!("10.2.{}.{}", i / 256, i % 256));
        }

        let list = parse_request(&request(IpsetCmd::LIST, 0, put_protocol));
        let mut cursor = core
            .start_dump(&list, &RequestCtx::privileged())
            .unwrap();
        let mut listed = Vec::new();
        while let Some(message) = core.dump_step(&mut cursor).unwrap() {
            assert!(message.len() <= u16::MAX as usize);
            listed.extend(listed_addrs(&message));
        }
        assert_eq!(listed.len(), 5000);
    }

    #[test]
    fn swaps_do_not_lose_released_references() {
        let config = IpSetConfig {
            dump_message_size: 512,
            ..IpSetConfig::default()
        };
        let core = core_with_config(config);
        for name in ["a", "b"] {
            let id = create_hash_ip(core.table(), core.registry(), name);
            for i in 0..100u32 {
                ip_add(core.table(), id, &format!("10.3.0.{}", i));
            }
        }
        let list = parse_request(&request(IpsetCmd::LIST, 0, put_protocol));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..1000 {
                    core.swap("a", "b").unwrap();
                }
            });
            for _ in 0..1000 {
                let mut cursor = core
                    .start_dump(&list, &RequestCtx::privileged())
                    .unwrap();
                core.dump_step(&mut cursor).unwrap();
                core.dump_done(&mut cursor);
            }
        });

        for id in 0..2 {
            assert_eq!(core.table().set_by_id(id).unwrap().ref_count(), 0);
        }
        core.destroy(None).unwrap();
    }
}
