//! The datagram endpoint the transport moves frames through.
//!
//! The transport never opens sockets itself. It is handed something implementing [`Endpoint`],
//! normally [`crate::socket::UdpEndpoint`], and only calls the four primitives below.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::completion::Completion;
use crate::mmap_area::MmapArea;

/// An already connected datagram endpoint.
pub trait Endpoint: Send + Sync {
    /// Receive one datagram into `buf` without blocking. Returns `Ok(None)` if nothing is
    /// queued.
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;

    /// Wait up to `timeout` for a datagram to become readable.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool>;

    /// Start transmitting a committed frame. The frame stays reserved until `submission` is
    /// completed or dropped, which may happen after this call returns and on another thread.
    fn send_async(&self, submission: Submission);
}

impl<E: Endpoint + ?Sized> Endpoint for Arc<E> {
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        (**self).try_recv(buf)
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        (**self).wait_readable(timeout)
    }

    fn send_async(&self, submission: Submission) {
        (**self).send_async(submission)
    }
}

/// A frame handed to [`Endpoint::send_async`], doubling as its completion token.
///
/// Dropping the submission signals completion, so an endpoint that fails or discards it still
/// returns the frame to circulation.
#[derive(Debug)]
pub struct Submission {
    area: Arc<MmapArea>,
    index: usize,
    len: usize,
    completion: Arc<Completion>,
}

impl Submission {
    pub(crate) fn new(
        area: Arc<MmapArea>,
        index: usize,
        len: usize,
        completion: Arc<Completion>,
    ) -> Submission {
        Submission {
            area,
            index,
            len,
            completion,
        }
    }

    /// The bytes to transmit.
    pub fn payload(&self) -> &[u8] {
        // The send buffer owning this frame is committed and cannot be acquired again until the
        // completion fires, which happens no earlier than our drop.
        let frame = unsafe { self.area.frame(self.index) };
        &frame[..self.len]
    }

    /// Index of the frame within the send pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark the transmission as finished.
    pub fn complete(self) {}
}

impl Drop for Submission {
    fn drop(&mut self) {
        self.completion.signal();
    }
}
