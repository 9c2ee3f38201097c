// SPDX-License-Identifier: MPL-2.0

//! The transport of the control protocol.

use align_ext::AlignExt;
use spin::Mutex;
use zerocopy::IntoBytes;

use super::{
    dump::DumpCursor,
    kernel::{RequestCtx, Response},
    segment::{done_segment, CMsgSegHdr, ErrorSegment, IpsetSegment, SegHdrCommonFlags, SEG_HEADER_LEN},
    NLMSG_ALIGN,
};
use crate::{prelude::*, util::SliceReader, IpSetCore};

/// The kernel end of the control socket of one user-space process.
///
/// Requests are handled synchronously by [`Self::send`]; their replies are
/// queued until user space reads them with [`Self::recv`]. A dump produces
/// one message each time the queue runs empty.
pub struct IpsetNetlinkSocket {
    core: Arc<IpSetCore>,
    ctx: RequestCtx,
    receive_queue: Mutex<VecDeque<Vec<u8>>>,
    dump: Mutex<Option<DumpCursor>>,
}

impl IpsetNetlinkSocket {
    pub fn new(core: Arc<IpSetCore>, ctx: RequestCtx) -> Self {
        Self {
            core,
            ctx,
            receive_queue: Mutex::new(VecDeque::new()),
            dump: Mutex::new(None),
        }
    }

    /// Handles every request contained in `bytes`.
    ///
    /// Returns the number of bytes consumed.
    pub fn send(&self, bytes: &[u8]) -> Result<usize> {
        let mut reader = SliceReader::new(bytes);

        while reader.remain() >= SEG_HEADER_LEN {
            let header = reader.read_val::<CMsgSegHdr>()?;
            let Some(payload_len) = (header.len as usize).checked_sub(SEG_HEADER_LEN) else {
                return_errno_with_message!(Errno::EINVAL, "the segment length is too small");
            };
            let payload = reader.read_bytes(payload_len)?;
            let padding_len = payload_len.align_up(NLMSG_ALIGN) - payload_len;
            reader.skip_some(padding_len);

            // Only requests are handled, the rest is silently dropped.
            if !SegHdrCommonFlags::from_bits_truncate(header.flags)
                .contains(SegHdrCommonFlags::REQUEST)
            {
                continue;
            }

            match IpsetSegment::read_from(header, &mut SliceReader::new(payload)) {
                Ok(mut request) => self.handle_request(&mut request),
                Err(error) => {
                    let mut raw = Vec::with_capacity(header.len as usize);
                    raw.extend_from_slice(header.as_bytes());
                    raw.extend_from_slice(payload);
                    let err_segment = ErrorSegment::new_from_raw(&header, &raw, Some(error));
                    self.enqueue(err_segment.to_bytes());
                }
            }
        }

        Ok(reader.pos())
    }

    fn handle_request(&self, request: &mut IpsetSegment) {
        // Only one dump may run at a time.
        if request.cmd().is_dump() && self.dump.lock().is_some() {
            let error = Error::with_message(Errno::EBUSY, "a dump is in progress");
            self.enqueue(ErrorSegment::new_from_request(request, Some(error)).to_bytes());
            return;
        }

        match self.core.handle_request(request, &self.ctx) {
            Response::Messages(messages) => {
                for message in messages {
                    self.enqueue(message);
                }
            }
            Response::Dump(cursor) => *self.dump.lock() = Some(cursor),
        }
    }

    fn enqueue(&self, message: Vec<u8>) {
        self.receive_queue.lock().push_back(message);
    }

    /// Takes the next reply message.
    pub fn recv(&self) -> Option<Vec<u8>> {
        if let Some(message) = self.receive_queue.lock().pop_front() {
            return Some(message);
        }

        let mut dump = self.dump.lock();
        let cursor = dump.as_mut()?;
        let message = match self.core.dump_step(cursor) {
            Ok(Some(message)) => Some(message),
            Ok(None) => None,
            Err(error) => Some(done_segment(cursor.seq(), cursor.pid(), -error.code())),
        };
        if cursor.is_finished() {
            *dump = None;
        }
        message
    }

    /// Returns whether a dump still has messages to produce.
    pub fn has_pending_dump(&self) -> bool {
        self.dump.lock().is_some()
    }

    /// Abandons the pending dump, if any, and drops the queued replies.
    pub fn close(&self) {
        if let Some(mut cursor) = self.dump.lock().take() {
            self.core.dump_done(&mut cursor);
        }
        self.receive_queue.lock().clear();
    }
}

impl Drop for IpsetNetlinkSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl Debug for IpsetNetlinkSocket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IpsetNetlinkSocket")
            .field("ctx", &self.ctx)
            .field("queued", &self.receive_queue.lock().len())
            .field("dump", &self.dump.lock().is_some())
            .finish()
    }
}
