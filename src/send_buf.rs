use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::completion::Completion;
use crate::endpoint::{Endpoint, Submission};
use crate::mmap_area::{MmapArea, MmapAreaOptions, MmapError};

/// Per frame transmit state.
///
/// IDLE -> COMMITTED on commit, COMMITTED -> IDLE once `acquire` observes the completion.
#[derive(Debug)]
struct SendSlot {
    index: usize,
    committed: AtomicBool,
    completion: Arc<Completion>,
}

impl SendSlot {
    fn new(index: usize) -> SendSlot {
        SendSlot {
            index,
            committed: AtomicBool::new(false),
            completion: Arc::new(Completion::new()),
        }
    }

    /// Committing zero bytes transmits nothing and completes at once.
    fn commit(&self, area: &Arc<MmapArea>, endpoint: &dyn Endpoint, len: usize) {
        if self.committed.swap(true, Ordering::AcqRel) {
            debug!(index = self.index, "send frame already committed");
            return;
        }

        if len == 0 {
            self.completion.signal();
            return;
        }

        let len = if len > area.frame_size() {
            warn!(
                index = self.index,
                len,
                frame_size = area.frame_size(),
                "commit longer than the frame, truncating"
            );
            area.frame_size()
        } else {
            len
        };

        endpoint.send_async(Submission::new(
            area.clone(),
            self.index,
            len,
            self.completion.clone(),
        ));
    }

    fn mark_complete(&self) {
        if self.committed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.completion.signal();
    }

    /// Wait for the previous transmission from this frame to finish.
    fn acquire(&self, timeout: Duration) -> bool {
        if !self.completion.wait_and_reset(timeout) {
            return false;
        }
        self.committed.store(false, Ordering::Release);
        true
    }

    #[cfg(test)]
    fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }
}

/// The send side frame pool.
#[derive(Debug)]
pub(crate) struct SendFrames {
    area: Arc<MmapArea>,
    slots: Vec<SendSlot>,
}

impl SendFrames {
    pub(crate) fn new(
        frame_num: usize,
        frame_size: usize,
        options: MmapAreaOptions,
    ) -> Result<SendFrames, MmapError> {
        let area = Arc::new(MmapArea::new(frame_num, frame_size, options)?);

        let slots: Vec<SendSlot> = (0..frame_num).map(SendSlot::new).collect();
        // Every frame starts out as an already finished transmission of zero bytes, so the
        // first acquire on it succeeds straight away.
        for slot in &slots {
            slot.mark_complete();
        }

        Ok(SendFrames { area, slots })
    }

    pub(crate) fn frame_num(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn frame_size(&self) -> usize {
        self.area.frame_size()
    }

    #[cfg(test)]
    pub(crate) fn is_committed(&self, index: usize) -> bool {
        self.slots[index].is_committed()
    }

    /// Block up to `timeout` until frame `index` is free to be written again.
    #[inline]
    pub(crate) fn acquire<'a>(
        &'a self,
        index: usize,
        endpoint: &'a dyn Endpoint,
        timeout: Duration,
    ) -> Option<SendBuf<'a>> {
        if !self.slots[index].acquire(timeout) {
            return None;
        }

        Some(SendBuf {
            frames: self,
            endpoint,
            index,
            len: self.frame_size(),
            committed: false,
        })
    }
}

/// A writable frame waiting to be transmitted.
///
/// Write the payload, then [`commit`](SendBuf::commit) the number of bytes to send. A buffer
/// dropped without being committed goes back to its pool untransmitted.
pub struct SendBuf<'a> {
    frames: &'a SendFrames,
    endpoint: &'a dyn Endpoint,
    index: usize,
    len: usize,
    committed: bool,
}

impl<'a> SendBuf<'a> {
    /// Number of writable bytes, always the full frame size.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the frame within the send pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_slice(&self) -> &[u8] {
        let frame = unsafe { self.frames.area.frame(self.index) };
        &frame[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Acquire succeeded and we have not committed, so nothing else touches this frame.
        let frame = unsafe { self.frames.area.frame_mut(self.index) };
        &mut frame[..self.len]
    }

    /// Transmit the first `len` bytes of the frame.
    pub fn commit(mut self, len: usize) {
        self.commit_frame(len);
    }

    fn commit_frame(&mut self, len: usize) {
        if self.committed {
            debug!(index = self.index, "send buffer already committed");
            return;
        }
        self.committed = true;
        self.frames.slots[self.index].commit(&self.frames.area, self.endpoint, len);
    }
}

impl Deref for SendBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl DerefMut for SendBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl AsMut<[u8]> for SendBuf<'_> {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl fmt::Debug for SendBuf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendBuf")
            .field("index", &self.index)
            .field("len", &self.len)
            .field("committed", &self.committed)
            .finish()
    }
}

impl Drop for SendBuf<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.commit_frame(0);
        }
    }
}
