// SPDX-License-Identifier: MPL-2.0

//! Module parameters of the set engine.
//!
//! The parameters are given as whitespace-separated `key=value` pairs,
//! the same way kernel module arguments are passed on the command line:
//!
//! ```text
//! max_sets=1024 max_resize_retries=4 dump_message_size=4096
//! ```

use crate::{prelude::*, table::IPSET_INVALID_ID};

/// Tunables of the set engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpSetConfig {
    /// The capacity of the set table.
    pub max_sets: u16,
    /// How many times an add may resize the set before the error is reported.
    pub max_resize_retries: u32,
    /// The upper bound of the size of a single dump message.
    pub dump_message_size: usize,
}

impl Default for IpSetConfig {
    fn default() -> Self {
        Self {
            max_sets: 256,
            max_resize_retries: 8,
            dump_message_size: 8192,
        }
    }
}

/// The smallest dump message that can still carry a set header.
const MIN_DUMP_MESSAGE_SIZE: usize = 512;
/// The largest reply message; nested attribute lengths are 16-bit.
const MAX_DUMP_MESSAGE_SIZE: usize = u16::MAX as usize;

impl IpSetConfig {
    /// Parses module arguments on top of the default configuration.
    ///
    /// Unknown keys are ignored with a warning, malformed values are rejected.
    pub fn from_module_args(args: &str) -> Result<Self> {
        let mut config = Self::default();

        for arg in args.split_whitespace() {
            let Some(param) = ModuleParam::from_arg(arg) else {
                warn!("ip_set: malformed module argument `{}`", arg);
                return_errno_with_message!(Errno::EINVAL, "malformed module argument");
            };

            match param.key {
                "max_sets" => config.max_sets = param.value.parse()?,
                "max_resize_retries" => config.max_resize_retries = param.value.parse()?,
                "dump_message_size" => config.dump_message_size = param.value.parse()?,
                key => warn!("ip_set: unknown module parameter `{}`", key),
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_sets == 0 {
            return_errno_with_message!(Errno::EINVAL, "the set table cannot be empty");
        }
        if self.dump_message_size < MIN_DUMP_MESSAGE_SIZE {
            return_errno_with_message!(Errno::EINVAL, "the dump message size is too small");
        }
        if self.dump_message_size > MAX_DUMP_MESSAGE_SIZE {
            return_errno_with_message!(Errno::EINVAL, "the dump message size is too large");
        }
        Ok(())
    }

    /// Returns the effective size limit of a reply message.
    ///
    /// The fields are public, so a configuration that skipped validation is
    /// brought back into range here.
    pub(crate) fn message_size(&self) -> usize {
        self.dump_message_size
            .clamp(MIN_DUMP_MESSAGE_SIZE, MAX_DUMP_MESSAGE_SIZE)
    }

    /// Returns the effective table capacity.
    ///
    /// The last index is reserved as the invalid handle.
    pub(crate) fn table_capacity(&self) -> usize {
        self.max_sets.min(IPSET_INVALID_ID - 1) as usize
    }
}

struct ModuleParam<'a> {
    key: &'a str,
    value: &'a str,
}

impl<'a> ModuleParam<'a> {
    fn from_arg(arg: &'a str) -> Option<Self> {
        let (key, value) = arg.split_once('=')?;
        if key.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self { key, value })
    }
}
