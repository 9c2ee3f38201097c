// SPDX-License-Identifier: MPL-2.0

//! Byte-level readers and writers used by the message codecs.

use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::prelude::*;

/// A cursor over a received byte buffer.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes already consumed.
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remain(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn has_remain(&self) -> bool {
        self.remain() > 0
    }

    pub(crate) fn read_val<T: FromBytes>(&mut self) -> Result<T> {
        let Ok((val, _)) = T::read_from_prefix(&self.buf[self.pos..]) else {
            return_errno_with_message!(Errno::EINVAL, "the buffer is too short");
        };
        self.pos += size_of::<T>();
        Ok(val)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remain() {
            return_errno_with_message!(Errno::EINVAL, "the buffer is too short");
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Skips at most `len` bytes.
    pub(crate) fn skip_some(&mut self, len: usize) {
        self.pos += len.min(self.remain());
    }
}

/// A growable buffer with a hard size limit.
///
/// Writes that would exceed the limit fail with [`Errno::EMSGSIZE`]
/// and leave the buffer untouched.
#[derive(Debug)]
pub struct BoundedWriter {
    buf: Vec<u8>,
    limit: usize,
}

impl BoundedWriter {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn avail(&self) -> usize {
        self.limit - self.buf.len()
    }

    pub(crate) fn write_val<T: IntoBytes + Immutable>(&mut self, val: &T) -> Result<()> {
        self.write_bytes(val.as_bytes())
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.avail() {
            return_errno_with_message!(Errno::EMSGSIZE, "the message buffer is full");
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn write_zeros(&mut self, len: usize) -> Result<()> {
        if len > self.avail() {
            return_errno_with_message!(Errno::EMSGSIZE, "the message buffer is full");
        }
        self.buf.resize(self.buf.len() + len, 0);
        Ok(())
    }

    /// Overwrites already written bytes at `offset`.
    pub(crate) fn patch_val<T: IntoBytes + Immutable>(&mut self, offset: usize, val: &T) {
        let bytes = val.as_bytes();
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}
