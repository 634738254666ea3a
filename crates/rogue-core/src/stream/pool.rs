//! Frame factories backed by a [`Pool`].

use super::buffer::Buffer;
use super::frame::Frame;
use super::slave::Slave;
use super::FramePtr;
use crate::error::{Result, RogueError};
use once_cell::sync::{Lazy, OnceCell};
use rogue_pool::{Pool, PoolConfig};
use tracing::trace;

static DEFAULT_POOL: Lazy<FramePool> =
    Lazy::new(|| FramePool::new(PoolConfig::variable().with_name("default")));

/// The process-wide heap pool used by slaves that do not allocate their own
/// frames.
#[must_use]
pub fn default_frame_pool() -> &'static FramePool {
    &DEFAULT_POOL
}

/// A slave that allocates frames from a pool and discards what it receives.
///
/// Frame layout per pool kind:
///
/// | Pool | Frame |
/// |---|---|
/// | fixed | `ceil(size / fixed_size)` chained buffers, at least one |
/// | fixed, zero-copy | one buffer; larger requests fail with `Buffer` |
/// | variable | one buffer of exactly `size` bytes |
///
/// A zero-copy pool asked with `zero_copy_ok == false` serves the request
/// from a private heap pool instead.
#[derive(Debug)]
pub struct FramePool {
    pool: Pool,
    heap: OnceCell<Pool>,
}

impl FramePool {
    /// Wrap a new pool built from `config`.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self::from_pool(Pool::new(config))
    }

    /// Wrap an existing pool handle.
    #[must_use]
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            heap: OnceCell::new(),
        }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.pool.name()
    }

    fn heap(&self) -> &Pool {
        self.heap.get_or_init(|| {
            Pool::new(PoolConfig::variable().with_name(format!("{}.heap", self.pool.name())))
        })
    }

    fn single(pool: &Pool, size: usize) -> Result<Frame> {
        let region = pool.request(size.max(1))?;
        Ok(Frame::from_buffer(Buffer::new(region)))
    }

    fn chained(&self, size: usize, slot: usize) -> Result<Frame> {
        let count = size.div_ceil(slot).max(1);
        let hard_cap = self.pool.hard_cap();
        if hard_cap > 0 && count > hard_cap {
            return Err(RogueError::Allocation(format!(
                "pool '{}' needs {} buffers for {} bytes but caps at {}",
                self.pool.name(),
                count,
                size,
                hard_cap
            )));
        }

        let mut frame = Frame::new();
        for region in self.pool.request_many(slot, count)? {
            frame.append_buffer(Buffer::new(region));
        }
        Ok(frame)
    }
}

impl Slave for FramePool {
    fn accept_req(&self, size: usize, zero_copy_ok: bool) -> Result<Frame> {
        let slot = self.pool.fixed_size();
        trace!(pool = %self.pool.name(), size, zero_copy_ok, "Frame requested");

        if self.pool.is_zero_copy() {
            if !zero_copy_ok {
                return Self::single(self.heap(), size);
            }
            if slot > 0 && size > slot {
                return Err(RogueError::Buffer { size, max: slot });
            }
            return Self::single(&self.pool, size);
        }

        if slot > 0 {
            self.chained(size, slot)
        } else {
            Self::single(&self.pool, size)
        }
    }

    fn accept_frame(&self, frame: FramePtr) {
        trace!(pool = %self.pool.name(), bytes = frame.payload(), "Frame discarded");
    }
}
