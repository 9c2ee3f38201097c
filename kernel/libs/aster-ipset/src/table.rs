// SPDX-License-Identifier: MPL-2.0

//! The table of set instances.
//!
//! Sets are addressed by their slot index ([`SetId`]), which is the handle
//! packet-path users and other sets keep. Slots are read without locks
//! through [`ArcSwapOption`]; every structural change happens under the
//! administrative lock, represented by a [`SetTableGuard`].

use arc_swap::ArcSwapOption;
use spin::{Mutex, MutexGuard};

use crate::{
    family::{NfProto, SetName},
    netlink::DataAttr,
    prelude::*,
    registry::TypeRegistry,
    set::IpSet,
    set_type::CreateParams,
};

/// The index of a set in the table.
pub type SetId = u16;

/// The handle that never refers to a set.
pub const IPSET_INVALID_ID: SetId = u16::MAX;

pub struct SetTable {
    slots: Box<[ArcSwapOption<IpSet>]>,
    admin_lock: Mutex<()>,
}

/// The arguments of [`SetTable::create`].
#[derive(Debug)]
pub struct CreateRequest<'a> {
    pub name: SetName,
    pub typename: &'a str,
    pub family: NfProto,
    pub revision: u8,
    pub data: &'a [DataAttr],
    /// Accept an existing set created with the same parameters.
    pub exist_ok: bool,
}

impl SetTable {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| ArcSwapOption::empty()).collect();
        Self {
            slots,
            admin_lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Takes the administrative lock.
    pub fn lock(&self) -> SetTableGuard<'_> {
        SetTableGuard {
            table: self,
            _guard: self.admin_lock.lock(),
        }
    }

    /// Returns the set in slot `id`, without taking a reference.
    pub fn set_by_id(&self, id: SetId) -> Option<Arc<IpSet>> {
        self.slots.get(id as usize)?.load_full()
    }

    /// Creates a set.
    ///
    /// The storage is constructed before the administrative lock is taken;
    /// it is torn down again if the set cannot be inserted.
    pub fn create(&self, registry: &TypeRegistry, request: &CreateRequest<'_>) -> Result<SetId> {
        debug!(
            "setname: {}, typename: {}, family: {:?}, revision: {}",
            request.name, request.typename, request.family, request.revision
        );

        let Some(set_type) =
            registry.lookup_or_load(request.typename, request.family, request.revision)
        else {
            warn!(
                "can't find ip_set type {}, family {:?}, revision {}: set '{}' not created",
                request.typename, request.family, request.revision, request.name
            );
            return_errno_with_message!(Errno::IPSET_ERR_FIND_TYPE, "cannot find the set type");
        };

        let params = CreateParams {
            family: request.family,
            data: request.data,
        };
        let variant = set_type.create(&params)?;
        let set = Arc::new(IpSet::new(
            request.name.clone(),
            set_type,
            request.family,
            variant,
        ));

        let guard = self.lock();
        match guard.find_free_id(&request.name) {
            Ok(id) => {
                self.slots[id as usize].store(Some(set));
                debug!("set {} created at index {}", request.name, id);
                Ok(id)
            }
            Err(FreeIdError::Exist(id, existing)) => {
                let same = request.exist_ok
                    && existing.set_type().name() == set.set_type().name()
                    && existing.family() == set.family()
                    && existing.revision() == set.revision()
                    && existing.read_variant().same_set(&**set.read_variant());
                set.write_variant().destroy(&guard);
                drop(guard);

                if same {
                    return Ok(id);
                }
                return_errno_with_message!(Errno::EEXIST, "the set already exists");
            }
            Err(FreeIdError::Full) => {
                set.write_variant().destroy(&guard);
                drop(guard);
                return_errno_with_message!(Errno::IPSET_ERR_MAX_SETS, "the set table is full");
            }
        }
    }

    /// Destroys the set `name`, or all sets.
    pub fn destroy(&self, name: Option<&str>) -> Result<()> {
        let guard = self.lock();

        let removed = match name {
            None => {
                if guard.iter().any(|(_, set)| set.ref_count() != 0) {
                    return_errno_with_message!(Errno::IPSET_ERR_BUSY, "a set is in use");
                }
                let removed: Vec<_> = self.slots.iter().filter_map(|slot| slot.swap(None)).collect();
                debug!("all sets destroyed");
                removed
            }
            Some(name) => {
                let Some((id, set)) = guard.find(name) else {
                    return_errno_with_message!(Errno::ENOENT, "the set does not exist");
                };
                if set.ref_count() != 0 {
                    return_errno_with_message!(Errno::IPSET_ERR_BUSY, "the set is in use");
                }
                self.slots[id as usize].store(None);
                debug!("set {} destroyed", name);
                vec![set]
            }
        };

        for set in removed {
            set.write_variant().destroy(&guard);
        }
        Ok(())
    }

    /// Removes all elements of the set `name`, or of all sets.
    pub fn flush(&self, name: Option<&str>) -> Result<()> {
        let guard = self.lock();

        match name {
            None => {
                for (_, set) in guard.iter() {
                    set.write_variant().flush(&guard);
                }
            }
            Some(name) => {
                let Some((_, set)) = guard.find(name) else {
                    return_errno_with_message!(Errno::ENOENT, "the set does not exist");
                };
                set.write_variant().flush(&guard);
            }
        }

        Ok(())
    }

    /// Renames the set `from` to `to`.
    pub fn rename(&self, from: &str, to: &SetName) -> Result<()> {
        let guard = self.lock();

        let Some((_, set)) = guard.find(from) else {
            return_errno_with_message!(Errno::ENOENT, "the set does not exist");
        };
        if set.ref_count() != 0 {
            return_errno_with_message!(Errno::IPSET_ERR_REFERENCED, "the set is referenced");
        }
        if guard.find(to.as_str()).is_some() {
            return_errno_with_message!(Errno::IPSET_ERR_EXIST_SETNAME2, "the new name is taken");
        }

        set.set_name(to.clone());
        debug!("set {} renamed to {}", from, to);
        Ok(())
    }

    /// Swaps the sets `from` and `to`.
    ///
    /// The storages exchange their slots, names and reference counts, so that
    /// every holder of either index now uses the other storage. Returns after
    /// the packet-path operations in flight on both sets have finished.
    pub fn swap(&self, from: &str, to: &str) -> Result<()> {
        let guard = self.lock();

        let Some((from_id, from_set)) = guard.find(from) else {
            return_errno_with_message!(Errno::ENOENT, "the set does not exist");
        };
        let Some((to_id, to_set)) = guard.find(to) else {
            return_errno_with_message!(Errno::IPSET_ERR_EXIST_SETNAME2, "the second set does not exist");
        };

        // Features are compared to prevent a list of sets from becoming its own member.
        if from_set.set_type().features() != to_set.set_type().features()
            || from_set.set_type().family() != to_set.set_type().family()
        {
            return_errno_with_message!(Errno::IPSET_ERR_TYPE_MISMATCH, "the sets are incompatible");
        }
        if from_id == to_id {
            return Ok(());
        }

        from_set.swap_identity(&to_set);
        self.slots[from_id as usize].store(Some(to_set.clone()));
        self.slots[to_id as usize].store(Some(from_set.clone()));
        drop(guard);

        // Wait for the lookups that loaded the slots before the exchange.
        drop(from_set.write_variant());
        drop(to_set.write_variant());

        debug!("sets {} and {} swapped", from, to);
        Ok(())
    }

    /// Finds set `name` and takes a reference to it.
    ///
    /// Returns [`IPSET_INVALID_ID`] if there is no such set.
    pub fn nfnl_get(&self, name: &str) -> SetId {
        self.lock().get_by_name(name).unwrap_or(IPSET_INVALID_ID)
    }

    /// Takes a reference to the set in slot `id`.
    ///
    /// Returns [`IPSET_INVALID_ID`] if the slot is out of range or empty.
    pub fn nfnl_get_by_index(&self, id: SetId) -> SetId {
        self.lock().get_by_index(id).unwrap_or(IPSET_INVALID_ID)
    }

    /// Releases a reference taken by [`Self::nfnl_get`] or [`Self::nfnl_get_by_index`].
    pub fn nfnl_put(&self, id: SetId) {
        self.lock().put(id);
    }
}

impl Debug for SetTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SetTable")
            .field("capacity", &self.slots.len())
            .finish_non_exhaustive()
    }
}

enum FreeIdError {
    Exist(SetId, Arc<IpSet>),
    Full,
}

/// The set table with the administrative lock held.
pub struct SetTableGuard<'a> {
    table: &'a SetTable,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> SetTableGuard<'a> {
    pub fn table(&self) -> &'a SetTable {
        self.table
    }

    /// Iterates over the occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (SetId, Arc<IpSet>)> + '_ {
        self.table
            .slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.load_full().map(|set| (id as SetId, set)))
    }

    /// Finds set `name` without taking a reference.
    pub fn find(&self, name: &str) -> Option<(SetId, Arc<IpSet>)> {
        self.iter().find(|(_, set)| set.has_name(name))
    }

    /// Returns the index of set `name`, or [`IPSET_INVALID_ID`].
    pub fn find_set_id(&self, name: &str) -> SetId {
        self.find(name).map(|(id, _)| id).unwrap_or(IPSET_INVALID_ID)
    }

    fn find_free_id(&self, name: &SetName) -> core::result::Result<SetId, FreeIdError> {
        let mut free = None;

        for (id, slot) in self.table.slots.iter().enumerate() {
            match slot.load_full() {
                Some(set) if set.has_name(name.as_str()) => {
                    return Err(FreeIdError::Exist(id as SetId, set));
                }
                Some(_) => {}
                None => {
                    free.get_or_insert(id as SetId);
                }
            }
        }

        free.ok_or(FreeIdError::Full)
    }

    /// Finds set `name` and takes a reference to it.
    pub fn get_by_name(&self, name: &str) -> Option<SetId> {
        let (id, set) = self.find(name)?;
        set.get();
        Some(id)
    }

    /// Takes a reference to the set in slot `id`.
    pub fn get_by_index(&self, id: SetId) -> Option<SetId> {
        let set = self.table.set_by_id(id)?;
        set.get();
        Some(id)
    }

    /// Releases a reference taken on slot `id`.
    pub fn put(&self, id: SetId) {
        if let Some(set) = self.table.set_by_id(id) {
            set.put();
        }
    }

    /// Returns the name of the set in slot `id`.
    pub fn name_by_index(&self, id: SetId) -> Option<SetName> {
        self.table.set_by_id(id).map(|set| set.name())
    }
}
