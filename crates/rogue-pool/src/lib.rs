//! Bounded allocator for frame payload regions.
//!
//! Every buffer that travels through the stream graph is backed by a
//! [`Region`] issued by a [`Pool`]. The pool owns the accounting:
//!
//! - a **hard cap** on outstanding regions (`0` = unbounded),
//! - a **soft cap** on the length of the free list kept for reuse,
//! - a **fixed slot size** (`0` = variable-size pool),
//! - a [`CapPolicy`] deciding what a request does once the hard cap is hit.
//!
//! # Memory Flow
//!
//! ```text
//! 1. request(size) reserves a slot (blocking or failing per policy)
//! 2. a free region is reused, otherwise a new one is allocated
//! 3. the Region travels inside a Buffer / Frame
//! 4. dropping the Region (or release()) returns the slot
//! 5. fixed regions go back to the free list until it holds soft_cap entries
//! ```
//!
//! # Safety Model
//!
//! All pool state sits behind one `parking_lot::Mutex` with one `Condvar`
//! for waiters. Regions own their memory (`Box<[u8]>`) and hold an `Arc` to
//! the pool, so the pool outlives every region it issued.
//!
//! # Example
//!
//! ```
//! use rogue_pool::{Pool, PoolConfig};
//!
//! let pool = Pool::new(PoolConfig::fixed(1024).with_cap(4, 4));
//! let region = pool.request(512).unwrap();
//! assert_eq!(region.len(), 1024);
//! assert_eq!(pool.in_use(), 1);
//!
//! drop(region);
//! assert_eq!(pool.in_use(), 0);
//! ```

pub mod blocking;
mod region;

pub use blocking::{allow_blocking, clear_host_lock, install_host_lock, HostLock};
pub use region::Region;

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default number of regions a fixed pool keeps on its free list.
pub const DEFAULT_SOFT_CAP: usize = 64;

/// Errors raised by [`Pool`] requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The hard cap was reached and the policy refused to wait (longer).
    #[error("Pool '{pool}' exhausted: {in_use} of {hard_cap} regions outstanding")]
    Alloc {
        /// Pool name
        pool: String,
        /// Regions outstanding when the request gave up
        in_use: usize,
        /// Cap in force
        hard_cap: usize,
    },

    /// The request can never be satisfied, or the system allocator failed.
    #[error("Pool '{pool}' cannot allocate {size} bytes: {reason}")]
    Allocation {
        /// Pool name
        pool: String,
        /// Requested bytes
        size: usize,
        /// Why it failed
        reason: String,
    },
}

/// What a request does when the hard cap is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapPolicy {
    /// Wait until a region is returned.
    #[default]
    Block,
    /// Fail immediately with [`PoolError::Alloc`].
    Fail,
    /// Wait up to the given duration, then fail with [`PoolError::Alloc`].
    BlockTimeout(Duration),
}

/// Construction parameters for a [`Pool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Name used in logs and errors
    pub name: String,
    /// Slot size in bytes (`0` = variable-size pool)
    pub fixed_size: usize,
    /// Maximum outstanding regions (`0` = unbounded)
    pub hard_cap: usize,
    /// Maximum regions retained on the free list
    pub soft_cap: usize,
    /// Behaviour when the hard cap is reached
    pub policy: CapPolicy,
    /// Regions model DMA-mapped memory that must not be handed to another pool
    pub zero_copy: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            fixed_size: 0,
            hard_cap: 0,
            soft_cap: DEFAULT_SOFT_CAP,
            policy: CapPolicy::Block,
            zero_copy: false,
        }
    }
}

impl PoolConfig {
    /// Variable-size pool with no cap.
    #[must_use]
    pub fn variable() -> Self {
        Self::default()
    }

    /// Fixed-slot pool handing out `size`-byte regions.
    #[must_use]
    pub fn fixed(size: usize) -> Self {
        Self {
            fixed_size: size,
            ..Self::default()
        }
    }

    /// Set the pool name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the hard and soft caps.
    #[must_use]
    pub fn with_cap(mut self, hard: usize, soft: usize) -> Self {
        self.hard_cap = hard;
        self.soft_cap = soft;
        self
    }

    /// Set the cap policy.
    #[must_use]
    pub fn with_policy(mut self, policy: CapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Mark regions as DMA-mapped.
    #[must_use]
    pub fn with_zero_copy(mut self, zero_copy: bool) -> Self {
        self.zero_copy = zero_copy;
        self
    }
}

/// Mutable pool state, guarded by `PoolInner::state`.
struct PoolState {
    free: Vec<Box<[u8]>>,
    in_use: usize,
    hard_cap: usize,
    soft_cap: usize,
    policy: CapPolicy,
    /// Bytes currently allocated (outstanding + free list)
    alloc_bytes: usize,
}

impl PoolState {
    fn fits(&self, count: usize) -> bool {
        self.hard_cap == 0 || self.in_use + count <= self.hard_cap
    }

    fn never_fits(&self, count: usize) -> bool {
        self.hard_cap > 0 && count > self.hard_cap
    }

    /// Claim `count` slots at once. Each entry carries a reusable region when
    /// the free list has one.
    fn reserve(&mut self, count: usize) -> Vec<Option<Box<[u8]>>> {
        self.in_use += count;
        (0..count).map(|_| self.free.pop()).collect()
    }
}

/// How long a request may wait for slots.
#[derive(Debug, Clone, Copy)]
enum Wait {
    Never,
    Forever,
    Until(Instant),
}

impl Wait {
    fn from_policy(policy: CapPolicy) -> Self {
        match policy {
            CapPolicy::Block => Self::Forever,
            CapPolicy::Fail => Self::Never,
            CapPolicy::BlockTimeout(timeout) => Self::Until(Instant::now() + timeout),
        }
    }
}

/// Shared between [`Pool`] handles and every outstanding [`Region`].
pub(crate) struct PoolInner {
    name: String,
    fixed_size: usize,
    zero_copy: bool,
    state: Mutex<PoolState>,
    available: Condvar,
    total_acquires: AtomicU64,
    total_returns: AtomicU64,
}

impl PoolInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn zero_copy(&self) -> bool {
        self.zero_copy
    }

    /// Return a region's memory. Called from `Region::drop`.
    pub(crate) fn give_back(&self, data: Box<[u8]>) {
        let mut state = self.state.lock();
        state.in_use = state.in_use.saturating_sub(1);

        if self.fixed_size > 0 && data.len() == self.fixed_size && state.free.len() < state.soft_cap
        {
            state.free.push(data);
        } else {
            state.alloc_bytes = state.alloc_bytes.saturating_sub(data.len());
            drop(data);
        }
        drop(state);

        self.total_returns.fetch_add(1, Ordering::Relaxed);
        // Waiters may need different slot counts
        self.available.notify_all();
    }
}

/// Capped allocator of payload regions.
///
/// Cloning a `Pool` produces another handle to the same allocator.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("fixed_size", &self.inner.fixed_size)
            .field("in_use", &self.in_use())
            .field("hard_cap", &self.hard_cap())
            .finish()
    }
}

impl Pool {
    /// Create a pool. No memory is allocated up front.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        info!(
            pool = %config.name,
            fixed_size = config.fixed_size,
            hard_cap = config.hard_cap,
            soft_cap = config.soft_cap,
            zero_copy = config.zero_copy,
            "Pool created"
        );

        Self {
            inner: Arc::new(PoolInner {
                name: config.name,
                fixed_size: config.fixed_size,
                zero_copy: config.zero_copy,
                state: Mutex::new(PoolState {
                    free: Vec::new(),
                    in_use: 0,
                    hard_cap: config.hard_cap,
                    soft_cap: config.soft_cap,
                    policy: config.policy,
                    alloc_bytes: 0,
                }),
                available: Condvar::new(),
                total_acquires: AtomicU64::new(0),
                total_returns: AtomicU64::new(0),
            }),
        }
    }

    /// Request a region of at least `size` bytes, applying the cap policy.
    pub fn request(&self, size: usize) -> Result<Region, PoolError> {
        let wait = Wait::from_policy(self.inner.state.lock().policy);
        self.acquire(size, wait)
    }

    /// Request a region without ever blocking.
    ///
    /// Returns [`PoolError::Alloc`] when the hard cap is reached.
    pub fn try_request(&self, size: usize) -> Result<Region, PoolError> {
        self.acquire(size, Wait::Never)
    }

    /// Request a region, waiting at most `timeout` for a free slot.
    pub fn request_timeout(&self, size: usize, timeout: Duration) -> Result<Region, PoolError> {
        self.acquire(size, Wait::Until(Instant::now() + timeout))
    }

    /// Request `count` regions of at least `size` bytes as one reservation.
    ///
    /// The slots are claimed together once `count` of them are free, so
    /// concurrent multi-region requests never hold part of a reservation
    /// while waiting for the rest. More regions than the hard cap fail with
    /// [`PoolError::Allocation`].
    pub fn request_many(&self, size: usize, count: usize) -> Result<Vec<Region>, PoolError> {
        let alloc_size = self.check_size(size)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let wait = Wait::from_policy(self.inner.state.lock().policy);
        let mut slots = self.reserve_slots(size, count, wait)?.into_iter();

        let mut regions = Vec::with_capacity(count);
        while let Some(reused) = slots.next() {
            match self.finish(reused, alloc_size) {
                Ok(region) => regions.push(region),
                Err(e) => {
                    self.cancel(slots);
                    return Err(e);
                }
            }
        }
        Ok(regions)
    }

    /// Return a region to the pool. Equivalent to dropping it.
    pub fn release(&self, region: Region) {
        drop(region);
    }

    /// Reconfigure the caps. Outstanding regions are honoured; new requests
    /// obey the new limits.
    pub fn set_cap(&self, hard: usize, soft: usize) {
        let mut state = self.inner.state.lock();
        state.hard_cap = hard;
        state.soft_cap = soft;

        while state.free.len() > soft {
            if let Some(region) = state.free.pop() {
                state.alloc_bytes = state.alloc_bytes.saturating_sub(region.len());
            }
        }
        let in_use = state.in_use;
        drop(state);

        info!(pool = %self.inner.name, hard, soft, in_use, "Pool caps changed");
        self.inner.available.notify_all();
    }

    /// Change the cap policy for subsequent requests.
    pub fn set_policy(&self, policy: CapPolicy) {
        self.inner.state.lock().policy = policy;
    }

    /// Name of the pool.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Slot size in bytes (`0` = variable-size pool).
    #[must_use]
    pub fn fixed_size(&self) -> usize {
        self.inner.fixed_size
    }

    /// Whether regions model DMA-mapped memory.
    #[must_use]
    pub fn is_zero_copy(&self) -> bool {
        self.inner.zero_copy
    }

    /// Regions issued and not yet returned.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.inner.state.lock().in_use
    }

    /// Regions waiting on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.inner.state.lock().free.len()
    }

    /// Current hard cap (`0` = unbounded).
    #[must_use]
    pub fn hard_cap(&self) -> usize {
        self.inner.state.lock().hard_cap
    }

    /// Current soft cap.
    #[must_use]
    pub fn soft_cap(&self) -> usize {
        self.inner.state.lock().soft_cap
    }

    /// Bytes currently allocated, outstanding and free.
    #[must_use]
    pub fn alloc_bytes(&self) -> usize {
        self.inner.state.lock().alloc_bytes
    }

    /// Total successful requests since creation.
    #[must_use]
    pub fn total_acquires(&self) -> u64 {
        self.inner.total_acquires.load(Ordering::Relaxed)
    }

    /// Total regions returned since creation.
    #[must_use]
    pub fn total_returns(&self) -> u64 {
        self.inner.total_returns.load(Ordering::Relaxed)
    }

    pub(crate) fn owns(&self, inner: &Arc<PoolInner>) -> bool {
        Arc::ptr_eq(&self.inner, inner)
    }

    /// Validate `size` and compute the region size to hand out.
    fn check_size(&self, size: usize) -> Result<usize, PoolError> {
        let fixed = self.inner.fixed_size;
        if fixed > 0 {
            if size > fixed {
                return Err(PoolError::Allocation {
                    pool: self.inner.name.clone(),
                    size,
                    reason: format!("exceeds fixed slot size of {fixed} bytes"),
                });
            }
            Ok(fixed)
        } else if size == 0 {
            Err(PoolError::Allocation {
                pool: self.inner.name.clone(),
                size,
                reason: "zero-sized region".to_string(),
            })
        } else {
            Ok(size)
        }
    }

    fn exhausted(&self, state: &PoolState) -> PoolError {
        PoolError::Alloc {
            pool: self.inner.name.clone(),
            in_use: state.in_use,
            hard_cap: state.hard_cap,
        }
    }

    fn acquire(&self, size: usize, wait: Wait) -> Result<Region, PoolError> {
        let alloc_size = self.check_size(size)?;
        let reused = self.reserve_slots(size, 1, wait)?.pop().flatten();
        self.finish(reused, alloc_size)
    }

    fn too_many(&self, size: usize, count: usize, hard_cap: usize) -> PoolError {
        PoolError::Allocation {
            pool: self.inner.name.clone(),
            size,
            reason: format!("{count} regions exceed the hard cap of {hard_cap}"),
        }
    }

    /// Claim `count` slots in one step, waiting per `wait`.
    fn reserve_slots(
        &self,
        size: usize,
        count: usize,
        wait: Wait,
    ) -> Result<Vec<Option<Box<[u8]>>>, PoolError> {
        {
            let mut state = self.inner.state.lock();
            if state.never_fits(count) {
                return Err(self.too_many(size, count, state.hard_cap));
            }
            if state.fits(count) {
                return Ok(state.reserve(count));
            }
            if matches!(wait, Wait::Never) {
                return Err(self.exhausted(&state));
            }
        }

        debug!(
            pool = %self.inner.name,
            size,
            count,
            "Pool cap reached - waiting for a region to be returned"
        );
        let started = Instant::now();

        // The pool mutex must be released before the host lock is
        // reacquired, so the whole wait lives inside the closure.
        allow_blocking(|| {
            let mut state = self.inner.state.lock();
            while !state.fits(count) {
                if state.never_fits(count) {
                    return Err(self.too_many(size, count, state.hard_cap));
                }
                match wait {
                    Wait::Until(deadline) => {
                        let timed_out = self
                            .inner
                            .available
                            .wait_until(&mut state, deadline)
                            .timed_out();
                        if timed_out && !state.fits(count) {
                            warn!(
                                pool = %self.inner.name,
                                waited_ms = started.elapsed().as_millis(),
                                in_use = state.in_use,
                                count,
                                "Pool request timeout - backpressure detected"
                            );
                            return Err(self.exhausted(&state));
                        }
                    }
                    Wait::Forever | Wait::Never => self.inner.available.wait(&mut state),
                }
            }
            Ok(state.reserve(count))
        })
    }

    /// Hand back reserved slots that were never turned into regions.
    fn cancel(&self, slots: impl Iterator<Item = Option<Box<[u8]>>>) {
        let mut state = self.inner.state.lock();
        for slot in slots {
            state.in_use = state.in_use.saturating_sub(1);
            if let Some(data) = slot {
                state.free.push(data);
            }
        }
        drop(state);
        self.inner.available.notify_all();
    }

    /// Turn a reserved slot into a region, allocating when nothing was reused.
    fn finish(&self, reused: Option<Box<[u8]>>, alloc_size: usize) -> Result<Region, PoolError> {
        let data = match reused {
            Some(data) => data,
            None => match allocate(alloc_size) {
                Ok(data) => {
                    self.inner.state.lock().alloc_bytes += alloc_size;
                    data
                }
                Err(reason) => {
                    self.cancel(std::iter::once(None));
                    return Err(PoolError::Allocation {
                        pool: self.inner.name.clone(),
                        size: alloc_size,
                        reason,
                    });
                }
            },
        };

        self.inner.total_acquires.fetch_add(1, Ordering::Relaxed);
        Ok(Region::new(data, Arc::clone(&self.inner)))
    }
}

/// Allocate zeroed memory, reporting allocator failure instead of aborting.
fn allocate(size: usize) -> Result<Box<[u8]>, String> {
    let mut data = Vec::new();
    data.try_reserve_exact(size).map_err(|e| e.to_string())?;
    data.resize(size, 0u8);
    Ok(data.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_fixed_pool_basic() {
        let pool = Pool::new(PoolConfig::fixed(1024).with_name("basic"));

        let region = pool.request(100).unwrap();
        assert_eq!(region.len(), 1024);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.total_acquires(), 1);

        pool.release(region);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.total_returns(), 1);
    }

    #[test]
    fn test_fixed_pool_reuses_free_list() {
        let pool = Pool::new(PoolConfig::fixed(256));

        let region = pool.request(256).unwrap();
        drop(region);
        assert_eq!(pool.alloc_bytes(), 256);

        let _again = pool.request(1).unwrap();
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.alloc_bytes(), 256);
    }

    #[test]
    fn test_oversized_request_on_fixed_pool() {
        let pool = Pool::new(PoolConfig::fixed(128));

        let err = pool.request(129).unwrap_err();
        assert!(matches!(err, PoolError::Allocation { size: 129, .. }));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_variable_pool_exact_size_and_free() {
        let pool = Pool::new(PoolConfig::variable());

        let region = pool.request(3000).unwrap();
        assert_eq!(region.len(), 3000);
        assert_eq!(pool.alloc_bytes(), 3000);

        drop(region);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.alloc_bytes(), 0);
    }

    #[test]
    fn test_variable_pool_rejects_zero() {
        let pool = Pool::new(PoolConfig::variable());
        assert!(matches!(
            pool.request(0),
            Err(PoolError::Allocation { size: 0, .. })
        ));
    }

    #[test]
    fn test_fail_policy() {
        let pool = Pool::new(
            PoolConfig::fixed(64)
                .with_cap(2, 2)
                .with_policy(CapPolicy::Fail),
        );

        let _a = pool.request(64).unwrap();
        let _b = pool.request(64).unwrap();
        let err = pool.request(64).unwrap_err();
        assert_eq!(
            err,
            PoolError::Alloc {
                pool: "pool".to_string(),
                in_use: 2,
                hard_cap: 2
            }
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_request_timeout_expires() {
        let pool = Pool::new(PoolConfig::fixed(64).with_cap(1, 1));
        let _held = pool.request(64).unwrap();

        let start = Instant::now();
        let result = pool.request_timeout(64, Duration::from_millis(20));
        assert!(matches!(result, Err(PoolError::Alloc { .. })));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(logs_contain("backpressure detected"));
    }

    /// Four concurrent requests succeed, the fifth blocks until a release.
    #[test]
    fn test_cap_blocks_until_release() {
        let pool = Pool::new(PoolConfig::fixed(1024).with_cap(4, 4));

        let held: Vec<Region> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || pool.request(512).unwrap())
            })
            .map(|h| h.join().unwrap())
            .collect();
        assert_eq!(pool.in_use(), 4);

        let finished = Arc::new(AtomicBool::new(false));
        let waiter = {
            let pool = pool.clone();
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                let region = pool.request(512).unwrap();
                finished.store(true, Ordering::SeqCst);
                region
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!finished.load(Ordering::SeqCst), "fifth request must block");
        assert_eq!(pool.in_use(), 4);

        let mut held = held;
        drop(held.pop());

        let fifth = waiter.join().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(pool.in_use(), 4);

        drop(fifth);
        drop(held);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_in_use_never_exceeds_cap() {
        let pool = Pool::new(PoolConfig::fixed(32).with_cap(3, 3));
        let peak = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let region = pool.request(32).unwrap();
                        peak.fetch_max(pool.in_use() as u64, Ordering::SeqCst);
                        drop(region);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_set_cap_wakes_waiter() {
        let pool = Pool::new(PoolConfig::fixed(16).with_cap(1, 1));
        let _held = pool.request(16).unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.request(16).map(|r| r.len()))
        };

        thread::sleep(Duration::from_millis(20));
        pool.set_cap(2, 2);

        assert_eq!(waiter.join().unwrap().unwrap(), 16);
        assert_eq!(pool.hard_cap(), 2);
    }

    #[test]
    fn test_soft_cap_limits_free_list() {
        let pool = Pool::new(PoolConfig::fixed(8).with_cap(0, 2));

        let regions: Vec<_> = (0..5).map(|_| pool.request(8).unwrap()).collect();
        drop(regions);

        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.alloc_bytes(), 16);

        pool.set_cap(0, 1);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.alloc_bytes(), 8);
    }

    #[test]
    fn test_request_many_is_all_or_nothing() {
        let pool = Pool::new(
            PoolConfig::fixed(64)
                .with_cap(3, 3)
                .with_policy(CapPolicy::Fail),
        );
        let held = pool.request(64).unwrap();

        assert!(matches!(
            pool.request_many(64, 3),
            Err(PoolError::Alloc { in_use: 1, .. })
        ));
        assert_eq!(pool.in_use(), 1);
        assert!(matches!(
            pool.request_many(64, 4),
            Err(PoolError::Allocation { .. })
        ));

        let regions = pool.request_many(10, 2).unwrap();
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.len() == 64));
        assert_eq!(pool.in_use(), 3);

        drop(regions);
        drop(held);
        assert_eq!(pool.in_use(), 0);
        assert!(pool.request_many(64, 0).unwrap().is_empty());
    }

    /// Two multi-region requesters on a tight cap both finish once the
    /// regions held elsewhere are released one at a time.
    #[test]
    fn test_concurrent_request_many_does_not_deadlock() {
        let pool = Pool::new(PoolConfig::fixed(64).with_cap(2, 2));
        let mut held = vec![pool.request(64).unwrap(), pool.request(64).unwrap()];

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    let regions = pool.request_many(64, 2).unwrap();
                    let count = regions.len();
                    thread::sleep(Duration::from_millis(5));
                    drop(regions);
                    count
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        drop(held.pop());
        thread::sleep(Duration::from_millis(20));
        drop(held.pop());

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), 2);
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_request_many_times_out_under_block_timeout() {
        let pool = Pool::new(
            PoolConfig::fixed(8)
                .with_cap(2, 2)
                .with_policy(CapPolicy::BlockTimeout(Duration::from_millis(20))),
        );
        let _held = pool.request(8).unwrap();

        let start = Instant::now();
        assert!(matches!(
            pool.request_many(8, 2),
            Err(PoolError::Alloc { .. })
        ));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(pool.in_use(), 1);
    }
}
