// SPDX-License-Identifier: MPL-2.0

//! The registry of set types.
//!
//! Lookups are lock-free: the registered types are published as an immutable
//! list through [`ArcSwap`], and each registration or removal publishes a new
//! list. A removed descriptor stays alive as long as a lookup or a set still
//! holds its [`Arc`], which provides the grace period of the removal.

use arc_swap::ArcSwap;
use spin::Mutex;

use crate::{family::NfProto, prelude::*, set_type::{SetType, IPSET_PROTOCOL}};

/// Loads the implementation of a set type on demand.
pub trait TypeLoader: Send + Sync {
    /// Tries to register the type `name` into `registry`.
    fn load(&self, registry: &TypeRegistry, name: &str);
}

pub struct TypeRegistry {
    types: ArcSwap<Vec<Arc<SetType>>>,
    /// Serializes writers.
    write_lock: Mutex<()>,
    loader: Option<Box<dyn TypeLoader>>,
}

impl TypeRegistry {
    pub fn new(loader: Option<Box<dyn TypeLoader>>) -> Self {
        Self {
            types: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
            loader,
        }
    }

    /// Registers a set type.
    pub fn register(&self, set_type: Arc<SetType>) -> Result<()> {
        if set_type.protocol() != IPSET_PROTOCOL {
            warn!(
                "ip_set type {}, family {:?}, revision {} uses wrong protocol version {} (want {})",
                set_type.name(),
                set_type.family(),
                set_type.revision(),
                set_type.protocol(),
                IPSET_PROTOCOL
            );
            return_errno_with_message!(Errno::EINVAL, "wrong protocol version");
        }

        let _guard = self.write_lock.lock();

        let types = self.types.load();
        if find_type(&types, set_type.name(), set_type.family(), set_type.revision()).is_some() {
            warn!(
                "ip_set type {}, family {:?}, revision {} already registered",
                set_type.name(),
                set_type.family(),
                set_type.revision()
            );
            return_errno_with_message!(Errno::EEXIST, "the set type is already registered");
        }

        let mut new_types = Vec::with_capacity(types.len() + 1);
        new_types.extend(types.iter().cloned());
        new_types.push(set_type.clone());
        self.types.store(Arc::new(new_types));

        debug!(
            "type {}, family {:?}, revision {} registered",
            set_type.name(),
            set_type.family(),
            set_type.revision()
        );
        Ok(())
    }

    /// Unregisters a set type.
    ///
    /// Sets created from the type keep the descriptor alive until they are destroyed.
    pub fn unregister(&self, name: &str, family: NfProto, revision: u8) -> Result<Arc<SetType>> {
        let _guard = self.write_lock.lock();

        let types = self.types.load();
        let Some(pos) = types.iter().position(|set_type| {
            set_type.name() == name && set_type.family() == family && set_type.revision() == revision
        }) else {
            warn!(
                "ip_set type {}, family {:?}, revision {} not registered",
                name, family, revision
            );
            return_errno_with_message!(Errno::ENOENT, "the set type is not registered");
        };

        let mut new_types: Vec<_> = types.iter().cloned().collect();
        let removed = new_types.remove(pos);
        self.types.store(Arc::new(new_types));

        debug!("type {}, family {:?}, revision {} unregistered", name, family, revision);
        Ok(removed)
    }

    /// Finds the type matching `name` and `revision` that serves `family`.
    pub fn lookup(&self, name: &str, family: NfProto, revision: u8) -> Option<Arc<SetType>> {
        find_type(&self.types.load(), name, family, revision)
    }

    /// Like [`Self::lookup`], but asks the type loader on a miss.
    pub fn lookup_or_load(&self, name: &str, family: NfProto, revision: u8) -> Option<Arc<SetType>> {
        if let Some(set_type) = self.lookup(name, family, revision) {
            return Some(set_type);
        }

        self.load(name);
        self.lookup(name, family, revision)
    }

    /// Returns the minimal and maximal revision of `name` serving `family`.
    pub fn query_revision_range(&self, name: &str, family: NfProto) -> Option<(u8, u8)> {
        self.types
            .load()
            .iter()
            .filter(|set_type| set_type.serves(name, family))
            .fold(None, |range, set_type| {
                let revision = set_type.revision();
                Some(match range {
                    None => (revision, revision),
                    Some((min, max)) => (min.min(revision), max.max(revision)),
                })
            })
    }

    /// Like [`Self::query_revision_range`], but asks the type loader on a miss.
    pub fn query_revision_range_or_load(&self, name: &str, family: NfProto) -> Option<(u8, u8)> {
        if let Some(range) = self.query_revision_range(name, family) {
            return Some(range);
        }

        self.load(name);
        self.query_revision_range(name, family)
    }

    fn load(&self, name: &str) {
        if let Some(loader) = self.loader.as_ref() {
            debug!("try to load ip_set_{}", name);
            loader.load(self, name);
        }
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let types = self.types.load();
        f.debug_struct("TypeRegistry")
            .field(
                "types",
                &types
                    .iter()
                    .map(|set_type| (set_type.name(), set_type.family(), set_type.revision()))
                    .collect::<Vec<_>>(),
            )
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

fn find_type(
    types: &[Arc<SetType>],
    name: &str,
    family: NfProto,
    revision: u8,
) -> Option<Arc<SetType>> {
    types
        .iter()
        .find(|set_type| set_type.serves(name, family) && set_type.revision() == revision)
        .cloned()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        set_type::{CreateParams, SetFeatures, SetVariant},
        types::hash_ip::HashIp,
    };

    fn create(params: &CreateParams<'_>) -> Result<Box<dyn SetVariant>> {
        HashIp::create(params)
    }

    fn set_type(name: &'static str, family: NfProto, revision: u8) -> Arc<SetType> {
        Arc::new(SetType::new(
            name,
            family,
            revision,
            1,
            SetFeatures::TYPE_IP,
            create,
        ))
    }

    #[test]
    fn register_lookup_unregister() {
        let registry = TypeRegistry::new(None);
        registry.register(set_type("hash:ip", NfProto::Unspec, 0)).unwrap();

        let found = registry.lookup("hash:ip", NfProto::Ipv6, 0).unwrap();
        assert_eq!(found.name(), "hash:ip");
        assert!(registry.lookup("hash:ip", NfProto::Ipv4, 1).is_none());
        assert!(registry.lookup("hash:net", NfProto::Ipv4, 0).is_none());

        registry.unregister("hash:ip", NfProto::Unspec, 0).unwrap();
        assert!(registry.lookup("hash:ip", NfProto::Ipv4, 0).is_none());

        let error = registry.unregister("hash:ip", NfProto::Unspec, 0).unwrap_err();
        assert_eq!(error.error(), Errno::ENOENT);
    }

    #[test]
    fn duplicates_are_rejected() {
        let registry = TypeRegistry::new(None);
        registry.register(set_type("hash:ip", NfProto::Unspec, 0)).unwrap();

        let error = registry
            .register(set_type("hash:ip", NfProto::Ipv4, 0))
            .unwrap_err();
        assert_eq!(error.error(), Errno::EEXIST);

        registry.register(set_type("hash:ip", NfProto::Unspec, 1)).unwrap();
    }

    #[test]
    fn wrong_protocol() {
        let registry = TypeRegistry::new(None);
        let old = SetType::new("hash:ip", NfProto::Ipv4, 0, 1, SetFeatures::TYPE_IP, create)
            .with_protocol(5);
        let error = registry.register(Arc::new(old)).unwrap_err();
        assert_eq!(error.error(), Errno::EINVAL);
        assert!(registry.lookup("hash:ip", NfProto::Ipv4, 0).is_none());
    }

    #[test]
    fn revision_range() {
        let registry = TypeRegistry::new(None);
        registry.register(set_type("hash:ip", NfProto::Ipv4, 2)).unwrap();
        registry.register(set_type("hash:ip", NfProto::Ipv4, 1)).unwrap();
        registry.register(set_type("hash:ip", NfProto::Unspec, 4)).unwrap();
        registry.register(set_type("hash:ip", NfProto::Ipv6, 0)).unwrap();

        assert_eq!(registry.query_revision_range("hash:ip", NfProto::Ipv4), Some((1, 4)));
        assert_eq!(registry.query_revision_range("hash:ip", NfProto::Ipv6), Some((0, 4)));
        assert_eq!(registry.query_revision_range("bitmap:ip", NfProto::Ipv4), None);
    }

    #[test]
    fn unregister_keeps_holders_alive() {
        let registry = TypeRegistry::new(None);
        registry.register(set_type("hash:ip", NfProto::Unspec, 0)).unwrap();

        let held = registry.lookup("hash:ip", NfProto::Ipv4, 0).unwrap();
        let removed = registry.unregister("hash:ip", NfProto::Unspec, 0).unwrap();
        assert!(Arc::ptr_eq(&held, &removed));
        assert_eq!(Arc::strong_count(&held), 2);
    }

    struct CountingLoader(std::sync::atomic::AtomicUsize);

    impl TypeLoader for CountingLoader {
        fn load(&self, registry: &TypeRegistry, name: &str) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            if name == "hash:ip" {
                let _ = registry.register(set_type("hash:ip", NfProto::Unspec, 0));
            }
        }
    }

    #[test]
    fn loader_on_miss() {
        let registry = TypeRegistry::new(Some(Box::new(CountingLoader(Default::default()))));

        assert!(registry.lookup("hash:ip", NfProto::Ipv4, 0).is_none());
        assert!(registry.lookup_or_load("hash:ip", NfProto::Ipv4, 0).is_some());
        assert!(registry.lookup_or_load("hash:ip", NfProto::Ipv4, 0).is_some());
        assert!(registry.lookup_or_load("nope", NfProto::Ipv4, 0).is_none());
        assert_eq!(
            registry.query_revision_range_or_load("hash:ip", NfProto::Ipv4),
            Some((0, 0))
        );
    }
}
