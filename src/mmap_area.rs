use errno::errno;
use libc::{
    c_int, c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_HUGETLB, MAP_PRIVATE, PROT_READ,
    PROT_WRITE,
};
use thiserror::Error;
use tracing::error;

/// A single anonymous memory mapping sliced into fixed size frames.
///
/// The area knows nothing about who owns which frame. Frames are handed out by index and the
/// receive and send buffer layers above guarantee that an index is owned by at most one party
/// at a time.
#[derive(Debug)]
pub struct MmapArea {
    frame_num: usize,
    frame_size: usize,
    ptr: *mut c_void,
}

// The pointer is only dereferenced through `frame` and `frame_mut`, whose callers guarantee
// exclusive ownership of the frame index they pass.
unsafe impl Send for MmapArea {}
unsafe impl Sync for MmapArea {}

#[derive(Debug, Error)]
pub enum MmapError {
    #[error("frame count and frame size must be non-zero (got {frame_num} frames of {frame_size} bytes)")]
    InvalidGeometry { frame_num: usize, frame_size: usize },

    #[error("{frame_num} frames of {frame_size} bytes overflows the address space")]
    Overflow { frame_num: usize, frame_size: usize },

    #[error("mmap of {len} bytes failed: errno {errno}")]
    Failed { len: usize, errno: i32 },
}

/// Configuration options for MmapArea
#[derive(Copy, Clone, Debug, Default)]
pub struct MmapAreaOptions {
    /// If set to true, the mmap call is passed MAP_HUGETLB
    pub huge_tlb: bool,
}

impl MmapArea {
    /// Map a new area holding `frame_num` frames of `frame_size` bytes each.
    ///
    /// # Arguments
    ///
    /// * frame_num: The number of frames in the area
    /// * frame_size: The length of each frame
    /// * options: Configuration options
    pub fn new(
        frame_num: usize,
        frame_size: usize,
        options: MmapAreaOptions,
    ) -> Result<MmapArea, MmapError> {
        if frame_num == 0 || frame_size == 0 {
            return Err(MmapError::InvalidGeometry {
                frame_num,
                frame_size,
            });
        }

        let len = frame_num
            .checked_mul(frame_size)
            .ok_or(MmapError::Overflow {
                frame_num,
                frame_size,
            })?;

        let mut flags: c_int = MAP_PRIVATE | MAP_ANONYMOUS;
        if options.huge_tlb {
            flags |= MAP_HUGETLB;
        }

        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                flags,
                -1,
                0,
            )
        };

        if ptr == MAP_FAILED {
            return Err(MmapError::Failed {
                len,
                errno: errno().0,
            });
        }

        Ok(MmapArea {
            frame_num,
            frame_size,
            ptr,
        })
    }

    pub fn frame_num(&self) -> usize {
        self.frame_num
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Shared view of frame `index`.
    ///
    /// # Safety
    ///
    /// Nobody may hold a mutable view of the same frame for the lifetime of the returned slice.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below `frame_num`.
    #[inline]
    pub(crate) unsafe fn frame(&self, index: usize) -> &[u8] {
        assert!(index < self.frame_num, "frame index {} out of range", index);
        let ptr = (self.ptr as *const u8).add(index * self.frame_size);
        std::slice::from_raw_parts(ptr, self.frame_size)
    }

    /// Mutable view of frame `index`.
    ///
    /// # Safety
    ///
    /// The caller must own frame `index` exclusively for the lifetime of the returned slice.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below `frame_num`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn frame_mut(&self, index: usize) -> &mut [u8] {
        assert!(index < self.frame_num, "frame index {} out of range", index);
        let ptr = (self.ptr as *mut u8).add(index * self.frame_size);
        std::slice::from_raw_parts_mut(ptr, self.frame_size)
    }
}

impl Drop for MmapArea {
    fn drop(&mut self) {
        let r: c_int = unsafe { munmap(self.ptr, self.frame_num * self.frame_size) };

        if r != 0 {
            error!(errno = errno().0, "munmap failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use super::{MmapArea, MmapAreaOptions, MmapError};

    #[test]
    fn geometry() {
        let area = MmapArea::new(10, 8, MmapAreaOptions::default()).unwrap();

        assert_eq!(area.frame_num(), 10);
        assert_eq!(area.frame_size(), 8);
    }

    #[test]
    fn rejects_empty_geometry() {
        let r = MmapArea::new(0, 8, MmapAreaOptions::default());
        assert!(matches!(r, Err(MmapError::InvalidGeometry { .. })));

        let r = MmapArea::new(8, 0, MmapAreaOptions::default());
        assert!(matches!(r, Err(MmapError::InvalidGeometry { .. })));
    }

    #[test]
    fn rejects_overflow() {
        let r = MmapArea::new(usize::MAX, 2, MmapAreaOptions::default());
        assert!(matches!(r, Err(MmapError::Overflow { .. })));
    }

    #[test]
    fn frame_values() {
        const FRAME_NUM: usize = 88;

        let area = MmapArea::new(FRAME_NUM, 8, MmapAreaOptions::default()).unwrap();

        //
        // Write a value to each frame and then ensure we read the same values out
        //
        let base: u64 = 3983989832773837873;

        for i in 0..FRAME_NUM {
            let frame = unsafe { area.frame_mut(i) };
            assert_eq!(frame.len(), 8);
            frame.copy_from_slice(&(i as u64 + base).to_ne_bytes());
        }

        for i in 0..FRAME_NUM {
            let frame = unsafe { area.frame(i) };
            let val = u64::from_ne_bytes(frame.try_into().unwrap());

            assert_eq!(val, i as u64 + base);
        }
    }

    #[test]
    #[should_panic]
    fn frame_out_of_range() {
        let area = MmapArea::new(4, 8, MmapAreaOptions::default()).unwrap();
        let _ = unsafe { area.frame(4) };
    }
}
