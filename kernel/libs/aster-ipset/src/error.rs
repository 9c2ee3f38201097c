// SPDX-License-Identifier: MPL-2.0

/// Error number.
///
/// The first block holds the generic errno values reported by the set engine.
/// The second block holds the private error codes of the ipset protocol,
/// which start right after the generic range.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netfilter/ipset/ip_set.h#L66>.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[expect(non_camel_case_types)]
pub enum Errno {
    EPERM = 1,       /* Operation not permitted */
    ENOENT = 2,      /* No such file or directory */
    EBADF = 9,       /* Bad file number */
    EAGAIN = 11,     /* Try again */
    ENOMEM = 12,     /* Out of memory */
    EFAULT = 14,     /* Bad address */
    EBUSY = 16,      /* Device or resource busy */
    EEXIST = 17,     /* File exists */
    EINVAL = 22,     /* Invalid argument */
    ERANGE = 34,     /* Math result not representable */
    EPROTO = 71,     /* Protocol error */
    EBADMSG = 74,    /* Not a data message */
    EMSGSIZE = 90,   /* Message too long */
    EOPNOTSUPP = 95, /* Operation not supported on transport endpoint */

    /// Wrong protocol version or malformed attributes.
    IPSET_ERR_PROTOCOL = 4097,
    /// Cannot find the set type.
    IPSET_ERR_FIND_TYPE = 4098,
    /// The set table is full.
    IPSET_ERR_MAX_SETS = 4099,
    /// The set is referenced and cannot be destroyed.
    IPSET_ERR_BUSY = 4100,
    /// The second set does not exist or its name is already taken.
    IPSET_ERR_EXIST_SETNAME2 = 4101,
    /// The sets cannot be swapped.
    IPSET_ERR_TYPE_MISMATCH = 4102,
    /// The element already exists, or is missing for a deletion.
    IPSET_ERR_EXIST = 4103,
    IPSET_ERR_INVALID_CIDR = 4104,
    IPSET_ERR_INVALID_NETMASK = 4105,
    IPSET_ERR_INVALID_FAMILY = 4106,
    IPSET_ERR_TIMEOUT = 4107,
    /// The set is referenced and cannot be renamed.
    IPSET_ERR_REFERENCED = 4108,
    IPSET_ERR_IPADDR_IPV4 = 4109,
    IPSET_ERR_IPADDR_IPV6 = 4110,

    /// The base of the error codes private to each set type.
    IPSET_ERR_TYPE_SPECIFIC = 4352,
}

/// error used in this crate
#[derive(Debug, Clone, Copy)]
pub struct Error {
    errno: Errno,
    type_specific: u8,
    msg: Option<&'static str>,
}

impl Error {
    pub const fn new(errno: Errno) -> Self {
        Error {
            errno,
            type_specific: 0,
            msg: None,
        }
    }

    pub const fn with_message(errno: Errno, msg: &'static str) -> Self {
        Error {
            errno,
            type_specific: 0,
            msg: Some(msg),
        }
    }

    /// Creates an error private to a set type.
    ///
    /// The reported code is [`Errno::IPSET_ERR_TYPE_SPECIFIC`] plus `offset`.
    pub const fn type_specific(offset: u8, msg: &'static str) -> Self {
        Error {
            errno: Errno::IPSET_ERR_TYPE_SPECIFIC,
            type_specific: offset,
            msg: Some(msg),
        }
    }

    pub const fn error(&self) -> Errno {
        self.errno
    }

    pub const fn message(&self) -> Option<&'static str> {
        self.msg
    }

    /// Returns the positive error code reported to user space.
    pub const fn code(&self) -> i32 {
        self.errno as i32 + self.type_specific as i32
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::new(errno)
    }
}

impl AsRef<Error> for Error {
    fn as_ref(&self) -> &Error {
        self
    }
}

impl PartialEq<Errno> for Error {
    fn eq(&self, errno: &Errno) -> bool {
        self.errno == *errno
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.msg {
            Some(msg) => write!(f, "{:?} ({}): {}", self.errno, self.code(), msg),
            None => write!(f, "{:?} ({})", self.errno, self.code()),
        }
    }
}

impl From<core::str::Utf8Error> for Error {
    fn from(_: core::str::Utf8Error) -> Self {
        Error::with_message(Errno::EINVAL, "Invalid utf-8 string")
    }
}

impl From<core::num::ParseIntError> for Error {
    fn from(_: core::num::ParseIntError) -> Self {
        Error::with_message(Errno::EINVAL, "Invalid integer")
    }
}

impl From<int_to_c_enum::TryFromIntError> for Error {
    fn from(_: int_to_c_enum::TryFromIntError) -> Self {
        Error::with_message(Errno::EINVAL, "Invalid enum value")
    }
}

#[macro_export]
macro_rules! return_errno {
    ($errno: expr) => {
        return Err($crate::error::Error::new($errno))
    };
}

#[macro_export]
macro_rules! return_errno_with_message {
    ($errno: expr, $message: expr) => {
        return Err($crate::error::Error::with_message($errno, $message))
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn type_specific_code() {
        let error = Error::type_specific(4, "list is full");
        assert_eq!(error.error(), Errno::IPSET_ERR_TYPE_SPECIFIC);
        assert_eq!(error.code(), 4356);
    }

    #[test]
    fn generic_code() {
        assert_eq!(Error::new(Errno::ENOENT).code(), 2);
        assert_eq!(Error::new(Errno::IPSET_ERR_EXIST).code(), 4103);
        assert_eq!(Error::new(Errno::IPSET_ERR_REFERENCED).code(), 4108);
    }
}
