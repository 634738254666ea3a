//! Cursors that walk a frame as one contiguous byte range.
//!
//! Both cursors capture the cumulative buffer ends when created, so a seek
//! is a binary search over buffers and stepping across a buffer boundary is
//! invisible to the caller.

use super::frame::Frame;
use crate::error::{Result, RogueError};
use bytes::Buf;
use std::io;

/// Cumulative end offsets, one per buffer.
fn cumulative(lengths: impl Iterator<Item = usize>) -> Vec<usize> {
    lengths
        .scan(0usize, |total, len| {
            *total += len;
            Some(*total)
        })
        .collect()
}

/// Buffer index and offset inside it for absolute position `pos`.
///
/// Empty buffers are skipped. At the very end the index is one past the
/// last buffer.
fn locate(ends: &[usize], pos: usize) -> (usize, usize) {
    let index = ends.partition_point(|end| *end <= pos);
    let start = if index == 0 { 0 } else { ends[index - 1] };
    (index, pos - start)
}

fn seek_to(ends: &[usize], pos: usize, context: &'static str) -> Result<usize> {
    let total = ends.last().copied().unwrap_or(0);
    if pos > total {
        return Err(RogueError::boundary(context, pos, total));
    }
    Ok(pos)
}

fn advance_by(ends: &[usize], pos: usize, delta: isize, context: &'static str) -> Result<usize> {
    let total = ends.last().copied().unwrap_or(0);
    pos.checked_add_signed(delta)
        .filter(|target| *target <= total)
        .ok_or_else(|| RogueError::boundary(context, pos.saturating_add_signed(delta), total))
}

/// Read cursor over a frame's payload.
///
/// Implements [`io::Read`] and [`bytes::Buf`], so payload parsing can use
/// either ecosystem without copying the frame first.
#[derive(Debug, Clone)]
pub struct FrameIter<'a> {
    frame: &'a Frame,
    ends: Vec<usize>,
    pos: usize,
}

impl<'a> FrameIter<'a> {
    pub(crate) fn new(frame: &'a Frame) -> Self {
        Self {
            frame,
            ends: cumulative(frame.buffers().iter().map(|b| b.payload())),
            pos: 0,
        }
    }

    /// Absolute payload offset of the cursor.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total payload bytes covered by the cursor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    /// `true` when the frame has no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes between the cursor and the payload end.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.len() - self.pos
    }

    /// Signed byte count from this cursor to `other`.
    #[must_use]
    pub fn distance(&self, other: &FrameIter<'_>) -> isize {
        other.pos as isize - self.pos as isize
    }

    /// Move to absolute offset `pos`; the payload end is a valid target.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        self.pos = seek_to(&self.ends, pos, "FrameIter::seek")?;
        Ok(())
    }

    /// Move by `delta` bytes, forwards or backwards.
    pub fn advance(&mut self, delta: isize) -> Result<()> {
        self.pos = advance_by(&self.ends, self.pos, delta, "FrameIter::advance")?;
        Ok(())
    }

    /// Contiguous bytes from the cursor to the end of the current buffer.
    #[must_use]
    pub fn current_chunk(&self) -> &'a [u8] {
        let (index, offset) = locate(&self.ends, self.pos);
        match self.frame.buffers().get(index) {
            Some(buffer) => &buffer.payload_slice()[offset..],
            None => &[],
        }
    }

    /// Fill `dst` from the cursor and move past the copied bytes.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.remaining() {
            return Err(RogueError::boundary(
                "FrameIter::read_bytes",
                self.pos + dst.len(),
                self.len(),
            ));
        }

        let mut copied = 0;
        while copied < dst.len() {
            let chunk = self.current_chunk();
            let take = chunk.len().min(dst.len() - copied);
            dst[copied..copied + take].copy_from_slice(&chunk[..take]);
            copied += take;
            self.pos += take;
        }
        Ok(())
    }
}

impl io::Read for FrameIter<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let take = buf.len().min(self.remaining());
        self.read_bytes(&mut buf[..take])
            .map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e))?;
        Ok(take)
    }
}

impl Buf for FrameIter<'_> {
    fn remaining(&self) -> usize {
        self.len() - self.pos
    }

    fn chunk(&self) -> &[u8] {
        self.current_chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.pos = (self.pos + cnt).min(self.len());
    }
}

/// Read/write cursor over a frame's full capacity.
///
/// Writing extends the frame payload to cover everything up to the cursor.
#[derive(Debug)]
pub struct FrameIterMut<'a> {
    frame: &'a mut Frame,
    ends: Vec<usize>,
    pos: usize,
}

impl<'a> FrameIterMut<'a> {
    pub(crate) fn new(frame: &'a mut Frame) -> Self {
        let ends = cumulative(frame.buffers().iter().map(|b| b.size()));
        Self {
            frame,
            ends,
            pos: 0,
        }
    }

    /// Absolute offset of the cursor.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total capacity covered by the cursor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    /// `true` when the frame has no capacity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes between the cursor and the end of the capacity.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.len() - self.pos
    }

    /// Signed byte count from this cursor to `other`.
    #[must_use]
    pub fn distance(&self, other: &FrameIterMut<'_>) -> isize {
        other.pos as isize - self.pos as isize
    }

    /// Move to absolute offset `pos`.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        self.pos = seek_to(&self.ends, pos, "FrameIterMut::seek")?;
        Ok(())
    }

    /// Move by `delta` bytes, forwards or backwards.
    pub fn advance(&mut self, delta: isize) -> Result<()> {
        self.pos = advance_by(&self.ends, self.pos, delta, "FrameIterMut::advance")?;
        Ok(())
    }

    /// Fill `dst` from the cursor and move past the copied bytes.
    ///
    /// Bytes beyond the payload are whatever the region held before.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.remaining() {
            return Err(RogueError::boundary(
                "FrameIterMut::read_bytes",
                self.pos + dst.len(),
                self.len(),
            ));
        }

        let mut copied = 0;
        while copied < dst.len() {
            let (index, offset) = locate(&self.ends, self.pos);
            let chunk = &self.frame.buffers()[index].usable_slice()[offset..];
            let take = chunk.len().min(dst.len() - copied);
            dst[copied..copied + take].copy_from_slice(&chunk[..take]);
            copied += take;
            self.pos += take;
        }
        Ok(())
    }

    /// Copy `src` in at the cursor and move past it.
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.remaining() {
            return Err(RogueError::boundary(
                "FrameIterMut::write_bytes",
                self.pos + src.len(),
                self.len(),
            ));
        }

        let mut copied = 0;
        while copied < src.len() {
            let (index, offset) = locate(&self.ends, self.pos);
            let chunk = &mut self.frame.buffers_mut()[index].usable_slice_mut()[offset..];
            let take = chunk.len().min(src.len() - copied);
            chunk[..take].copy_from_slice(&src[copied..copied + take]);
            copied += take;
            self.pos += take;
        }
        self.frame.min_payload(self.pos)
    }
}

impl io::Read for FrameIterMut<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let take = buf.len().min(self.remaining());
        self.read_bytes(&mut buf[..take])
            .map_err(|e| io::Error::new(io::ErrorKind::UnexpectedEof, e))?;
        Ok(take)
    }
}

impl io::Write for FrameIterMut<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let take = buf.len().min(self.remaining());
        self.write_bytes(&buf[..take])
            .map_err(|e| io::Error::new(io::ErrorKind::WriteZero, e))?;
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
