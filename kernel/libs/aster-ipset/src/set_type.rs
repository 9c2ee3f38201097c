// SPDX-License-Identifier: MPL-2.0

//! Set types and the interface of their storage.
//!
//! A [`SetType`] describes one kind of set storage (for example `hash:ip`),
//! while a [`SetVariant`] is the storage of one set instance of that type.
//! The engine only ever talks to the storage through [`SetVariant`].

use crate::{
    family::NfProto,
    netlink::{AttrWriter, DataAttr},
    packet::KadtArgs,
    prelude::*,
    table::{SetTable, SetTableGuard},
};

/// The version of the control protocol.
pub const IPSET_PROTOCOL: u8 = 6;

/// The maximum length of a type name, including the terminating NUL.
pub const IPSET_MAX_TYPENAME_LEN: usize = crate::family::IPSET_MAXNAMELEN;

bitflags! {
    /// What the elements of a set type consist of.
    ///
    /// Two sets can only be swapped if their types have the same features.
    pub struct SetFeatures: u32 {
        const TYPE_IP = 1 << 0;
        const TYPE_PORT = 1 << 1;
        const TYPE_MAC = 1 << 2;
        const TYPE_IP2 = 1 << 3;
        const TYPE_NAME = 1 << 4;
        /// Sets of this type are dumped after all other sets.
        const DUMP_LAST = 1 << 5;
    }
}

/// The arguments of [`SetType`] constructors.
#[derive(Debug)]
pub struct CreateParams<'a> {
    /// The family of the new set.
    pub family: NfProto,
    /// The type-specific parameters.
    pub data: &'a [DataAttr],
}

pub type CreateFn = fn(&CreateParams<'_>) -> Result<Box<dyn SetVariant>>;

/// An immutable descriptor of a set type.
pub struct SetType {
    name: &'static str,
    family: NfProto,
    revision: u8,
    dimension: u8,
    features: SetFeatures,
    protocol: u8,
    create: CreateFn,
}

impl SetType {
    pub const fn new(
        name: &'static str,
        family: NfProto,
        revision: u8,
        dimension: u8,
        features: SetFeatures,
        create: CreateFn,
    ) -> Self {
        Self {
            name,
            family,
            revision,
            dimension,
            features,
            protocol: IPSET_PROTOCOL,
            create,
        }
    }

    /// Overrides the protocol version the type was built against.
    pub const fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the family, where [`NfProto::Unspec`] means family-neutral.
    pub fn family(&self) -> NfProto {
        self.family
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Returns how many components an element consists of.
    pub fn dimension(&self) -> u8 {
        self.dimension
    }

    pub fn features(&self) -> SetFeatures {
        self.features
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub(crate) fn create(&self, params: &CreateParams<'_>) -> Result<Box<dyn SetVariant>> {
        (self.create)(params)
    }

    /// Returns whether the type serves `family`.
    pub fn serves(&self, name: &str, family: NfProto) -> bool {
        self.name == name && self.family.accepts(family)
    }
}

impl Debug for SetType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SetType")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("revision", &self.revision)
            .field("dimension", &self.dimension)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

/// The progress of dumping the elements of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListProgress {
    /// All elements have been written.
    Done,
    /// The message is full; listing resumes from the cursor.
    More,
}

/// The storage of a set instance.
///
/// Operations prefixed with `k` come from the packet path,
/// those prefixed with `u` come from the control protocol.
/// The instance lock is held in shared mode for `*test` and [`Self::list`],
/// and in exclusive mode for every other operation.
pub trait SetVariant: Any + Send + Sync + Debug {
    /// Tests a packet.
    ///
    /// [`Errno::EAGAIN`] means the packet matched an element that should be
    /// materialized with [`Self::kadd`].
    fn ktest(&self, args: &KadtArgs<'_>) -> Result<bool>;

    fn kadd(&mut self, args: &KadtArgs<'_>) -> Result<()>;

    fn kdel(&mut self, args: &KadtArgs<'_>) -> Result<()>;

    /// Tests the element described by `data`.
    fn utest(&self, data: &[DataAttr], table: &SetTableGuard<'_>) -> Result<bool>;

    /// Adds the element described by `data`.
    ///
    /// Fails with [`Errno::IPSET_ERR_EXIST`] if the element is present, and with
    /// [`Errno::EAGAIN`] if the storage must be resized first.
    fn uadd(&mut self, data: &[DataAttr], table: &SetTableGuard<'_>) -> Result<()>;

    /// Deletes the element described by `data`.
    ///
    /// Fails with [`Errno::IPSET_ERR_EXIST`] if the element is missing.
    fn udel(&mut self, data: &[DataAttr], table: &SetTableGuard<'_>) -> Result<()>;

    /// Removes all elements.
    fn flush(&mut self, table: &SetTableGuard<'_>);

    /// Releases everything the storage holds before it is dropped.
    fn destroy(&mut self, table: &SetTableGuard<'_>);

    /// Writes the type-specific header attributes.
    fn head(&self, writer: &mut AttrWriter) -> Result<()>;

    /// Writes elements starting from `cursor`, one nested `DATA` attribute each.
    ///
    /// Elements that do not fit are left for the next call; `cursor` is
    /// advanced past every written element.
    fn list(
        &self,
        writer: &mut AttrWriter,
        cursor: &mut usize,
        table: &SetTable,
    ) -> Result<ListProgress>;

    /// Grows the storage after an add failed with [`Errno::EAGAIN`].
    fn resize(&mut self, _retried: bool) -> Result<()> {
        return_errno_with_message!(Errno::EAGAIN, "the set cannot be resized")
    }

    /// Returns whether `other` was created with the same parameters.
    fn same_set(&self, _other: &dyn SetVariant) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}
