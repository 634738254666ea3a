//! RAII handle for memory issued by a [`Pool`](crate::Pool).
//!
//! A `Region` owns its bytes and an `Arc` back to the issuing pool. Dropping
//! it returns the memory to that pool, which is what keeps the pool's
//! in-use count honest no matter how frames are torn down.

use crate::PoolInner;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A contiguous block of payload memory borrowed from a pool.
pub struct Region {
    data: Box<[u8]>,
    pool: Arc<PoolInner>,
}

impl Region {
    pub(crate) fn new(data: Box<[u8]>, pool: Arc<PoolInner>) -> Self {
        Self { data, pool }
    }

    /// Size of the region in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the region holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole region as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The whole region as a mutable slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Whether the issuing pool models DMA-mapped memory.
    #[must_use]
    pub fn is_zero_copy(&self) -> bool {
        self.pool.zero_copy()
    }

    /// Name of the issuing pool.
    #[must_use]
    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }

    /// Whether this region was issued by `pool`.
    #[must_use]
    pub fn belongs_to(&self, pool: &crate::Pool) -> bool {
        pool.owns(&self.pool)
    }
}

impl Deref for Region {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for Region {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl AsRef<[u8]> for Region {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for Region {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("pool", &self.pool.name())
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.give_back(data);
    }
}
