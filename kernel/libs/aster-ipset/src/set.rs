// SPDX-License-Identifier: MPL-2.0

use core::sync::atomic::{AtomicU32, Ordering};

use spin::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    family::{NfProto, SetName},
    prelude::*,
    set_type::{SetType, SetVariant},
};

/// A set instance.
///
/// The name and the reference count belong to the table slot rather than to
/// the storage: swapping two sets exchanges them, so that holders of a slot
/// index keep seeing the name and count they expect.
pub struct IpSet {
    name: RwLock<SetName>,
    set_type: Arc<SetType>,
    family: NfProto,
    refcnt: AtomicU32,
    variant: RwLock<Box<dyn SetVariant>>,
}

impl IpSet {
    pub(crate) fn new(
        name: SetName,
        set_type: Arc<SetType>,
        family: NfProto,
        variant: Box<dyn SetVariant>,
    ) -> Self {
        Self {
            name: RwLock::new(name),
            set_type,
            family,
            refcnt: AtomicU32::new(0),
            variant: RwLock::new(variant),
        }
    }

    pub fn name(&self) -> SetName {
        self.name.read().clone()
    }

    pub fn has_name(&self, name: &str) -> bool {
        *self.name.read() == *name
    }

    pub(crate) fn set_name(&self, name: SetName) {
        *self.name.write() = name;
    }

    pub fn set_type(&self) -> &Arc<SetType> {
        &self.set_type
    }

    pub fn family(&self) -> NfProto {
        self.family
    }

    pub fn revision(&self) -> u8 {
        self.set_type.revision()
    }

    pub fn ref_count(&self) -> u32 {
        self.refcnt.load(Ordering::Acquire)
    }

    /// Takes a reference. Called with the administrative lock held.
    pub(crate) fn get(&self) {
        self.refcnt.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops a reference. Called with the administrative lock held.
    pub(crate) fn put(&self) {
        let old = self
            .refcnt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));
        if old.is_err() {
            warn!("ip_set: releasing unreferenced set {}", self.name());
        }
    }

    /// Exchanges the names and reference counts of two sets.
    ///
    /// Must be called with the administrative lock held. Reference counts only
    /// change under that lock, so neither count moves during the exchange.
    pub(crate) fn swap_identity(&self, other: &IpSet) {
        core::mem::swap(&mut *self.name.write(), &mut *other.name.write());

        let count = self.refcnt.load(Ordering::Acquire);
        let other_count = other.refcnt.swap(count, Ordering::AcqRel);
        self.refcnt.store(other_count, Ordering::Release);
    }

    /// Returns whether a request of `family` with `dim` components applies to the set.
    pub(crate) fn accepts(&self, family: NfProto, dim: u8) -> bool {
        dim >= self.set_type.dimension() && self.family.accepts(family)
    }

    pub fn read_variant(&self) -> RwLockReadGuard<'_, Box<dyn SetVariant>> {
        self.variant.read()
    }

    pub fn write_variant(&self) -> RwLockWriteGuard<'_, Box<dyn SetVariant>> {
        self.variant.write()
    }
}

impl Debug for IpSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IpSet")
            .field("name", &*self.name.read())
            .field("type", &self.set_type.name())
            .field("family", &self.family)
            .field("refcnt", &self.ref_count())
            .finish_non_exhaustive()
    }
}
