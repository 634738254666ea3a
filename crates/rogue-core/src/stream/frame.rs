//! Multi-buffer frames.
//!
//! A [`Frame`] is built and filled by its producer while it is still an
//! owned value. Publishing wraps it in an [`Arc`] ([`FramePtr`]); from then
//! on every holder sees it read-only. [`Frame::into_exclusive`] gives the
//! bytes back to a holder that turns out to be the only one.
//!
//! Payload bytes are the concatenation of the buffers' payloads, in order.
//! [`Frame::set_payload`] fills buffers front to back, so a frame filled
//! through its own API never has a gap between buffers.

use super::buffer::Buffer;
use super::iterator::{FrameIter, FrameIterMut};
use super::FramePtr;
use crate::error::{Result, RogueError};
use std::sync::Arc;

/// Ordered chain of buffers plus frame metadata.
#[derive(Debug, Default)]
pub struct Frame {
    buffers: Vec<Buffer>,
    error: u32,
    channel: u8,
    flags: u16,
}

impl Frame {
    /// An empty frame with no buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame holding a single buffer.
    #[must_use]
    pub fn from_buffer(buffer: Buffer) -> Self {
        Self {
            buffers: vec![buffer],
            ..Self::default()
        }
    }

    /// Append a buffer at the end of the chain.
    pub fn append_buffer(&mut self, buffer: Buffer) {
        self.buffers.push(buffer);
    }

    /// Move every buffer of `other` to the end of this frame.
    ///
    /// The metadata of `self` is kept; the error of `other` is merged in.
    pub fn append_frame(&mut self, mut other: Frame) {
        self.error |= other.error;
        self.buffers.append(&mut other.buffers);
    }

    /// Number of buffers in the chain.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// The buffers, in payload order.
    #[must_use]
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    /// The buffers, mutable.
    #[must_use]
    pub fn buffers_mut(&mut self) -> &mut [Buffer] {
        &mut self.buffers
    }

    /// Total payload bytes.
    #[must_use]
    pub fn payload(&self) -> usize {
        self.buffers.iter().map(Buffer::payload).sum()
    }

    /// Total capacity of all buffers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.buffers.iter().map(Buffer::size).sum()
    }

    /// Capacity not yet covered by payload.
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffers.iter().map(Buffer::available).sum()
    }

    /// `true` when the frame carries no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload() == 0
    }

    /// Set the payload length, filling buffers front to back.
    pub fn set_payload(&mut self, size: usize) -> Result<()> {
        let capacity = self.size();
        if size > capacity {
            return Err(RogueError::boundary("Frame::set_payload", size, capacity));
        }

        let mut remaining = size;
        for buffer in &mut self.buffers {
            let take = remaining.min(buffer.size());
            buffer.set_payload(take)?;
            remaining -= take;
        }
        Ok(())
    }

    /// Grow or shrink the payload by `delta` bytes.
    pub fn adjust_payload(&mut self, delta: isize) -> Result<()> {
        let current = self.payload();
        let size = current
            .checked_add_signed(delta)
            .ok_or_else(|| RogueError::boundary("Frame::adjust_payload", 0, current))?;
        self.set_payload(size)
    }

    /// Grow the payload to at least `size` bytes.
    pub fn min_payload(&mut self, size: usize) -> Result<()> {
        if size > self.payload() {
            self.set_payload(size)?;
        }
        Ok(())
    }

    /// Drop all payload; buffers stay attached.
    pub fn clear(&mut self) {
        self.buffers.iter_mut().for_each(Buffer::clear);
    }

    /// Copy `dst.len()` payload bytes starting at `offset`.
    pub fn read(&self, dst: &mut [u8], offset: usize) -> Result<()> {
        let mut iter = self.iter();
        iter.seek(offset)?;
        iter.read_bytes(dst)
    }

    /// Copy `src` in at `offset`, extending the payload to cover it.
    pub fn write(&mut self, src: &[u8], offset: usize) -> Result<()> {
        let mut iter = self.iter_mut();
        iter.seek(offset)?;
        iter.write_bytes(src)
    }

    /// Copy the payload out into a contiguous vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload());
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Per-buffer payload slices, in order.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.buffers
            .iter()
            .map(Buffer::payload_slice)
            .filter(|chunk| !chunk.is_empty())
    }

    /// Read cursor over the payload.
    #[must_use]
    pub fn iter(&self) -> FrameIter<'_> {
        FrameIter::new(self)
    }

    /// Read/write cursor over the full capacity.
    #[must_use]
    pub fn iter_mut(&mut self) -> FrameIterMut<'_> {
        FrameIterMut::new(self)
    }

    /// Frame error merged with every buffer error (`0` = none).
    #[must_use]
    pub fn error(&self) -> u32 {
        self.buffers
            .iter()
            .fold(self.error, |acc, buffer| acc | buffer.error())
    }

    /// Set the frame-level error code.
    pub fn set_error(&mut self, code: u32) {
        self.error = code;
    }

    /// Channel number.
    #[must_use]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Set the channel number.
    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel;
    }

    /// Protocol flags.
    #[must_use]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Set the protocol flags.
    pub fn set_flags(&mut self, flags: u16) {
        self.flags = flags;
    }

    /// Low byte of the flags.
    #[must_use]
    pub fn first_user(&self) -> u8 {
        (self.flags & 0x00FF) as u8
    }

    /// Set the low byte of the flags.
    pub fn set_first_user(&mut self, value: u8) {
        self.flags = (self.flags & 0xFF00) | u16::from(value);
    }

    /// High byte of the flags.
    #[must_use]
    pub fn last_user(&self) -> u8 {
        (self.flags >> 8) as u8
    }

    /// Set the high byte of the flags.
    pub fn set_last_user(&mut self, value: u8) {
        self.flags = (self.flags & 0x00FF) | (u16::from(value) << 8);
    }

    /// Whether any buffer sits in DMA-mapped memory.
    #[must_use]
    pub fn is_zero_copy(&self) -> bool {
        self.buffers.iter().any(Buffer::is_zero_copy)
    }

    /// Take the frame back when `frame` is the only reference to it.
    ///
    /// Otherwise the pointer is handed back unchanged.
    pub fn into_exclusive(frame: FramePtr) -> std::result::Result<Frame, FramePtr> {
        Arc::try_unwrap(frame)
    }
}

/// Deep-copy payload and metadata of `src` into `dst`.
///
/// `dst` may come from any pool; its payload is replaced.
pub fn copy_frame(src: &Frame, dst: &mut Frame) -> Result<()> {
    copy_prefix(src, dst, src.payload())
}

/// Copy the first `len` payload bytes and the metadata of `src` into `dst`.
pub(crate) fn copy_prefix(src: &Frame, dst: &mut Frame, len: usize) -> Result<()> {
    let len = len.min(src.payload());
    let capacity = dst.size();
    if len > capacity {
        return Err(RogueError::boundary("copy_frame", len, capacity));
    }

    dst.clear();
    let mut offset = 0;
    for chunk in src.chunks() {
        if offset == len {
            break;
        }
        let take = chunk.len().min(len - offset);
        dst.write(&chunk[..take], offset)?;
        offset += take;
    }

    dst.set_payload(len)?;
    dst.error = src.error();
    dst.channel = src.channel;
    dst.flags = src.flags;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rogue_pool::{Pool, PoolConfig};

    fn chained(pool: &Pool, count: usize) -> Frame {
        let mut frame = Frame::new();
        for _ in 0..count {
            frame.append_buffer(Buffer::new(pool.request(pool.fixed_size()).unwrap()));
        }
        frame
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::new();
        assert_eq!(frame.payload(), 0);
        assert_eq!(frame.size(), 0);
        assert!(frame.is_empty());
        assert!(frame.to_vec().is_empty());
        assert_eq!(frame.error(), 0);
    }

    #[test]
    fn test_set_payload_fills_in_order() {
        let pool = Pool::new(PoolConfig::fixed(100));
        let mut frame = chained(&pool, 3);

        frame.set_payload(250).unwrap();
        let payloads: Vec<_> = frame.buffers().iter().map(Buffer::payload).collect();
        assert_eq!(payloads, vec![100, 100, 50]);

        frame.set_payload(120).unwrap();
        let payloads: Vec<_> = frame.buffers().iter().map(Buffer::payload).collect();
        assert_eq!(payloads, vec![100, 20, 0]);

        assert!(frame.set_payload(301).is_err());
        assert_eq!(frame.payload(), 120);
    }

    #[test]
    fn test_adjust_and_min_payload() {
        let pool = Pool::new(PoolConfig::fixed(10));
        let mut frame = chained(&pool, 2);

        frame.adjust_payload(15).unwrap();
        assert_eq!(frame.payload(), 15);
        frame.adjust_payload(-5).unwrap();
        assert_eq!(frame.payload(), 10);
        frame.min_payload(4).unwrap();
        assert_eq!(frame.payload(), 10);
        frame.min_payload(12).unwrap();
        assert_eq!(frame.payload(), 12);
        assert_eq!(frame.available(), 8);
        assert!(frame.adjust_payload(-13).is_err());

        frame.clear();
        assert!(frame.is_empty());
        assert_eq!(frame.size(), 20);
    }

    #[test]
    fn test_write_across_buffers() {
        let pool = Pool::new(PoolConfig::fixed(4));
        let mut frame = chained(&pool, 3);

        frame.write(&[1, 2, 3, 4, 5, 6], 3).unwrap();
        assert_eq!(frame.payload(), 9);
        assert_eq!(frame.to_vec(), vec![0, 0, 0, 1, 2, 3, 4, 5, 6]);

        let mut out = [0u8; 3];
        frame.read(&mut out, 4).unwrap();
        assert_eq!(out, [2, 3, 4]);

        assert!(frame.write(&[0; 4], 9).is_err());
        assert!(frame.read(&mut out, 7).is_err());
    }

    #[test]
    fn test_error_merges_buffers() {
        let pool = Pool::new(PoolConfig::fixed(4));
        let mut frame = chained(&pool, 2);

        frame.set_error(0x1);
        frame.buffers_mut()[1].set_error(0x4);
        assert_eq!(frame.error(), 0x5);
    }

    #[test]
    fn test_user_flags() {
        let mut frame = Frame::new();
        frame.set_first_user(0x12);
        frame.set_last_user(0x34);
        assert_eq!(frame.flags(), 0x3412);
        assert_eq!(frame.first_user(), 0x12);
        assert_eq!(frame.last_user(), 0x34);

        frame.set_flags(0xABCD);
        assert_eq!(frame.first_user(), 0xCD);
        assert_eq!(frame.last_user(), 0xAB);
    }

    #[test]
    fn test_append_frame() {
        let pool = Pool::new(PoolConfig::fixed(4));
        let mut head = chained(&pool, 1);
        head.write(&[1, 2, 3, 4], 0).unwrap();

        let mut tail = chained(&pool, 1);
        tail.write(&[5, 6], 0).unwrap();
        tail.set_error(0x8);

        head.append_frame(tail);
        assert_eq!(head.buffer_count(), 2);
        assert_eq!(head.to_vec(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(head.error(), 0x8);
    }

    #[test]
    fn test_into_exclusive() {
        let frame: FramePtr = Arc::new(Frame::new());
        let other = Arc::clone(&frame);

        let frame = Frame::into_exclusive(frame).unwrap_err();
        drop(other);
        assert!(Frame::into_exclusive(frame).is_ok());
    }

    #[test]
    fn test_copy_frame() {
        let fixed = Pool::new(PoolConfig::fixed(3));
        let mut src = chained(&fixed, 3);
        src.write(&[9, 8, 7, 6, 5, 4, 3], 0).unwrap();
        src.set_channel(2);
        src.set_flags(0x0102);

        let heap = Pool::new(PoolConfig::variable());
        let mut dst = Frame::from_buffer(Buffer::new(heap.request(16).unwrap()));
        dst.write(&[0xFF; 16], 0).unwrap();

        copy_frame(&src, &mut dst).unwrap();
        assert_eq!(dst.to_vec(), src.to_vec());
        assert_eq!(dst.channel(), 2);
        assert_eq!(dst.flags(), 0x0102);

        let mut small = Frame::from_buffer(Buffer::new(heap.request(4).unwrap()));
        assert!(copy_frame(&src, &mut small).is_err());
        copy_prefix(&src, &mut small, 4).unwrap();
        assert_eq!(small.to_vec(), vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_drop_returns_all_buffers() {
        let pool = Pool::new(PoolConfig::fixed(8));
        let frame = chained(&pool, 5);
        assert_eq!(pool.in_use(), 5);
        drop(frame);
        assert_eq!(pool.in_use(), 0);
    }
}
