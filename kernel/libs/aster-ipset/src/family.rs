// SPDX-License-Identifier: MPL-2.0

use std::net::IpAddr;

use crate::prelude::*;

/// Netfilter protocol families.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter.h#L61>.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromInt)]
pub enum NfProto {
    Unspec = 0,
    Ipv4 = 2,
    Ipv6 = 10,
}

impl NfProto {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }

    /// Returns whether an object of family `self` accepts requests of `family`.
    ///
    /// A family-neutral object accepts every family.
    pub fn accepts(self, family: NfProto) -> bool {
        self == Self::Unspec || self == family
    }
}

/// The maximum length of a set name, including the terminating NUL.
pub const IPSET_MAXNAMELEN: usize = 32;

/// The name of a set, or of a set type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SetName(String);

impl SetName {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return_errno_with_message!(Errno::EINVAL, "the name is empty");
        }
        if name.len() >= IPSET_MAXNAMELEN {
            return_errno_with_message!(Errno::EINVAL, "the name is too long");
        }
        if name.as_bytes().contains(&0) {
            return_errno_with_message!(Errno::EINVAL, "the name contains NUL");
        }
        Ok(Self(name.to_string()))
    }

    /// Parses a name from a NUL-terminated byte buffer.
    ///
    /// Bytes after the first NUL are ignored.
    pub fn from_c_bytes(bytes: &[u8]) -> Result<Self> {
        let len = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        Self::new(core::str::from_utf8(&bytes[..len])?)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Copies the name into a fixed-size C buffer, NUL-padded.
    pub fn to_c_bytes(&self) -> [u8; IPSET_MAXNAMELEN] {
        let mut buf = [0u8; IPSET_MAXNAMELEN];
        buf[..self.0.len()].copy_from_slice(self.0.as_bytes());
        buf
    }
}

impl PartialEq<str> for SetName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Debug for SetName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl core::fmt::Display for SetName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
