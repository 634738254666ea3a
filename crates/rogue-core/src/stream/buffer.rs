//! A single contiguous payload region inside a frame.
//!
//! ```text
//! |<- head_room ->|<---- payload ---->|<- available ->|<- tail_room ->|
//! 0                                                                   raw_size
//!                 |<------------------- size() ------>|
//! ```
//!
//! The head room is space reserved in front of the payload (protocol
//! headers pushed later by a lower layer), the tail room is reserved at the
//! end. `size()` is what the payload may grow to.

use crate::error::{Result, RogueError};
use rogue_pool::Region;

/// Pool-backed payload window with head and tail reservations.
#[derive(Debug)]
pub struct Buffer {
    region: Region,
    head_room: usize,
    tail_room: usize,
    payload: usize,
    error: u32,
}

impl Buffer {
    /// Wrap a region with an empty payload and no reservations.
    #[must_use]
    pub fn new(region: Region) -> Self {
        Self {
            region,
            head_room: 0,
            tail_room: 0,
            payload: 0,
            error: 0,
        }
    }

    /// Total bytes of the underlying region.
    #[must_use]
    pub fn raw_size(&self) -> usize {
        self.region.len()
    }

    /// Bytes reserved in front of the payload.
    #[must_use]
    pub fn head_room(&self) -> usize {
        self.head_room
    }

    /// Bytes reserved at the end of the region.
    #[must_use]
    pub fn tail_room(&self) -> usize {
        self.tail_room
    }

    /// Bytes of valid payload.
    #[must_use]
    pub fn payload(&self) -> usize {
        self.payload
    }

    /// Largest payload this buffer can hold.
    #[must_use]
    pub fn size(&self) -> usize {
        self.raw_size() - self.head_room - self.tail_room
    }

    /// Room left for the payload to grow.
    #[must_use]
    pub fn available(&self) -> usize {
        self.size() - self.payload
    }

    /// Move the payload start by `delta` bytes; the payload end stays put.
    ///
    /// Advancing the head hides leading payload bytes (consuming a header),
    /// retreating exposes head room as payload (prepending a header).
    pub fn adjust_head(&mut self, delta: isize) -> Result<()> {
        let limit = self.raw_size() - self.tail_room;
        let new_head = self
            .head_room
            .checked_add_signed(delta)
            .filter(|head| *head <= limit)
            .ok_or_else(|| {
                RogueError::boundary(
                    "Buffer::adjust_head",
                    self.head_room.saturating_add_signed(delta),
                    limit,
                )
            })?;

        let end = self.head_room + self.payload;
        self.head_room = new_head;
        self.payload = end.saturating_sub(new_head);
        Ok(())
    }

    /// Grow or shrink the reservation at the end of the region.
    pub fn adjust_tail(&mut self, delta: isize) -> Result<()> {
        let limit = self.raw_size() - self.head_room - self.payload;
        let new_tail = self
            .tail_room
            .checked_add_signed(delta)
            .filter(|tail| *tail <= limit)
            .ok_or_else(|| {
                RogueError::boundary(
                    "Buffer::adjust_tail",
                    self.tail_room.saturating_add_signed(delta),
                    limit,
                )
            })?;

        self.tail_room = new_tail;
        Ok(())
    }

    /// Set the payload length.
    pub fn set_payload(&mut self, size: usize) -> Result<()> {
        if size > self.size() {
            return Err(RogueError::boundary(
                "Buffer::set_payload",
                size,
                self.size(),
            ));
        }
        self.payload = size;
        Ok(())
    }

    /// Grow or shrink the payload by `delta` bytes.
    pub fn adjust_payload(&mut self, delta: isize) -> Result<()> {
        let size = self.payload.checked_add_signed(delta).ok_or_else(|| {
            RogueError::boundary("Buffer::adjust_payload", 0, self.payload)
        })?;
        self.set_payload(size)
    }

    /// Grow the payload to at least `size` bytes.
    pub fn min_payload(&mut self, size: usize) -> Result<()> {
        if size > self.payload {
            self.set_payload(size)?;
        }
        Ok(())
    }

    /// Drop the payload, keeping the reservations.
    pub fn clear(&mut self) {
        self.payload = 0;
    }

    /// The valid payload bytes.
    #[must_use]
    pub fn payload_slice(&self) -> &[u8] {
        &self.region[self.head_room..self.head_room + self.payload]
    }

    /// The valid payload bytes, mutable.
    #[must_use]
    pub fn payload_slice_mut(&mut self) -> &mut [u8] {
        let start = self.head_room;
        &mut self.region[start..start + self.payload]
    }

    /// Everything between the head and tail reservations.
    pub(crate) fn usable_slice(&self) -> &[u8] {
        let end = self.raw_size() - self.tail_room;
        &self.region[self.head_room..end]
    }

    /// Everything between the head and tail reservations, mutable.
    pub(crate) fn usable_slice_mut(&mut self) -> &mut [u8] {
        let start = self.head_room;
        let end = self.raw_size() - self.tail_room;
        &mut self.region[start..end]
    }

    /// Copy `dst.len()` payload bytes starting at `offset`.
    pub fn read(&self, dst: &mut [u8], offset: usize) -> Result<()> {
        let end = offset
            .checked_add(dst.len())
            .filter(|end| *end <= self.payload)
            .ok_or_else(|| {
                RogueError::boundary(
                    "Buffer::read",
                    offset.saturating_add(dst.len()),
                    self.payload,
                )
            })?;
        dst.copy_from_slice(&self.payload_slice()[offset..end]);
        Ok(())
    }

    /// Copy `src` in at `offset`, extending the payload to cover it.
    pub fn write(&mut self, src: &[u8], offset: usize) -> Result<()> {
        let size = self.size();
        let end = offset
            .checked_add(src.len())
            .filter(|end| *end <= size)
            .ok_or_else(|| {
                RogueError::boundary("Buffer::write", offset.saturating_add(src.len()), size)
            })?;
        self.usable_slice_mut()[offset..end].copy_from_slice(src);
        self.min_payload(end)
    }

    /// Error code attached to this buffer (`0` = none).
    #[must_use]
    pub fn error(&self) -> u32 {
        self.error
    }

    /// Attach an error code; it is merged into the containing frame's error.
    pub fn set_error(&mut self, code: u32) {
        self.error = code;
    }

    /// Whether the backing memory is DMA-mapped.
    #[must_use]
    pub fn is_zero_copy(&self) -> bool {
        self.region.is_zero_copy()
    }

    /// The backing region.
    #[must_use]
    pub fn region(&self) -> &Region {
        &self.region
    }
}
