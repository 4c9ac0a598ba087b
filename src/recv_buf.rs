use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tracing::{debug, error};

use crate::mmap_area::{MmapArea, MmapAreaOptions, MmapError};
use crate::pending::PendingQueue;

/// The receive side frame pool and the queue of frames that are free to be filled.
///
/// A frame index is in `pending` exactly when no caller holds it and no receive is writing into
/// it.
#[derive(Debug)]
pub(crate) struct RecvFrames {
    area: MmapArea,
    pending: PendingQueue<usize>,
}

impl RecvFrames {
    pub(crate) fn new(
        frame_num: usize,
        frame_size: usize,
        options: MmapAreaOptions,
    ) -> Result<RecvFrames, MmapError> {
        let area = MmapArea::new(frame_num, frame_size, options)?;
        let pending = PendingQueue::new(frame_num);

        for index in 0..frame_num {
            let r = pending.push_with_haste(index);
            debug_assert!(r.is_ok());
        }

        Ok(RecvFrames { area, pending })
    }

    pub(crate) fn frame_num(&self) -> usize {
        self.area.frame_num()
    }

    pub(crate) fn frame_size(&self) -> usize {
        self.area.frame_size()
    }

    pub(crate) fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Take a free frame out of circulation, waiting up to `timeout`.
    #[inline]
    pub(crate) fn pop(&self, timeout: Duration) -> Option<usize> {
        self.pending
            .pop_with_haste()
            .or_else(|| self.pending.pop_with_timed_wait(timeout))
    }

    /// Writable view of a frame taken with `pop`.
    ///
    /// # Safety
    ///
    /// `index` must have come from `pop` and not yet been filled or given back.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn frame_mut(&self, index: usize) -> &mut [u8] {
        self.area.frame_mut(index)
    }

    /// Wrap a popped frame holding `len` bytes in a caller-owned buffer.
    #[inline]
    pub(crate) fn fill(&self, index: usize, len: usize) -> RecvBuf<'_> {
        RecvBuf {
            frames: self,
            index,
            len: len.min(self.frame_size()),
            released: false,
        }
    }

    /// Return a popped frame to circulation.
    #[inline]
    pub(crate) fn give_back(&self, index: usize) {
        if let Err(index) = self.pending.push_with_haste(index) {
            // More frames than capacity means some index was pushed twice.
            error!(
                index,
                capacity = self.pending.capacity(),
                "receive queue overflow, frame dropped"
            );
        }
    }
}

/// A received datagram sitting in a pool frame.
///
/// The frame belongs to the holder until the buffer is released, explicitly with
/// [`RecvBuf::release`] or by dropping it. Only then can it be filled again.
pub struct RecvBuf<'a> {
    frames: &'a RecvFrames,
    index: usize,
    len: usize,
    released: bool,
}

impl<'a> RecvBuf<'a> {
    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the frame within the receive pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_slice(&self) -> &[u8] {
        // Holding an unreleased RecvBuf means we own the frame.
        let frame = unsafe { self.frames.area.frame(self.index) };
        &frame[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let frame = unsafe { self.frames.area.frame_mut(self.index) };
        &mut frame[..self.len]
    }

    /// Hand the frame back to the receive queue.
    pub fn release(mut self) {
        self.release_frame();
    }

    fn release_frame(&mut self) {
        if self.released {
            debug!(index = self.index, "receive buffer already released");
            return;
        }
        self.released = true;
        self.len = 0;
        self.frames.give_back(self.index);
    }
}

impl Deref for RecvBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl DerefMut for RecvBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl AsRef<[u8]> for RecvBuf<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for RecvBuf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecvBuf")
            .field("index", &self.index)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for RecvBuf<'_> {
    fn drop(&mut self) {
        self.release_frame();
    }
}
