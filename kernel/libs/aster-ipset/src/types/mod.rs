// SPDX-License-Identifier: MPL-2.0

//! The set types shipped with the engine.

use crate::{prelude::*, registry::TypeLoader, registry::TypeRegistry, set_type::SetType};

pub mod hash_ip;
pub mod list_set;

/// Errors private to the hash types.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter/ipset/ip_set_hash.h#L13>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HashError {
    Full = 0,
    Elem = 1,
    InvalidProto = 2,
    MissingProto = 3,
    RangeUnsupported = 4,
    Range = 5,
}

impl From<HashError> for Error {
    fn from(err: HashError) -> Self {
        let msg = match err {
            HashError::Full => "the hash is full",
            HashError::Elem => "invalid element",
            HashError::InvalidProto => "invalid protocol",
            HashError::MissingProto => "missing protocol",
            HashError::RangeUnsupported => "ranges are not supported",
            HashError::Range => "invalid range",
        };
        Error::type_specific(err as u8, msg)
    }
}

/// Registers the built-in types when they are first asked for.
#[derive(Debug, Default)]
pub struct BuiltinTypeLoader;

impl BuiltinTypeLoader {
    fn set_type(name: &str) -> Option<SetType> {
        match name {
            hash_ip::TYPE_NAME => Some(hash_ip::set_type()),
            list_set::TYPE_NAME => Some(list_set::set_type()),
            _ => None,
        }
    }
}

impl TypeLoader for BuiltinTypeLoader {
    fn load(&self, registry: &TypeRegistry, name: &str) {
        let Some(set_type) = Self::set_type(name) else {
            return;
        };

        match registry.register(Arc::new(set_type)) {
            Ok(()) => info!("ip_set: loaded type {}", name),
            // Lost a race against a concurrent load.
            Err(err) if err.error() == Errno::EEXIST => {}
            Err(err) => warn!("ip_set: cannot load type {}: {}", name, err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::family::NfProto;

    #[test]
    fn loads_only_known_types() {
        let registry = TypeRegistry::new(Some(Box::new(BuiltinTypeLoader)));
        assert!(registry.lookup("list:set", NfProto::Ipv4, 0).is_none());
        assert!(registry.lookup_or_load("list:set", NfProto::Ipv4, 0).is_some());
        assert!(registry.lookup_or_load("hash:ip", NfProto::Ipv6, 0).is_some());
        assert!(registry.lookup_or_load("bitmap:ip", NfProto::Ipv4, 0).is_none());

        // Loading twice is harmless.
        BuiltinTypeLoader.load(&registry, "hash:ip");
        assert_eq!(registry.query_revision_range("hash:ip", NfProto::Ipv4), Some((0, 0)));
    }

    #[test]
    fn hash_error_codes() {
        let err: Error = HashError::RangeUnsupported.into();
        assert_eq!(err.code(), Errno::IPSET_ERR_TYPE_SPECIFIC as i32 + 4);
    }
}
