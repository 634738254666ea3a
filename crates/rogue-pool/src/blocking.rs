//! Host interpreter lock hand-off around blocking waits.
//!
//! When the core is driven from a scripting host with a global interpreter
//! lock, every blocking wait (pool cap, transaction completion, queue
//! back-pressure) must drop that lock first and take it back afterwards.
//! Otherwise the thread that would unblock us can never run.
//!
//! The host bridge installs a [`HostLock`] once. Blocking sites wrap their
//! wait in [`allow_blocking`]. Compiled-only users install nothing and the
//! wrapper is a plain call.
//!
//! ```
//! use rogue_pool::allow_blocking;
//!
//! let value = allow_blocking(|| {
//!     // condition wait goes here
//!     42
//! });
//! assert_eq!(value, 42);
//! ```

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// An external interpreter lock the core must not hold while blocked.
pub trait HostLock: Send + Sync {
    /// Release the lock if the calling thread holds it.
    ///
    /// Returns `true` when the lock was held and has been released.
    fn release(&self) -> bool;

    /// Take the lock back after a successful [`release`](HostLock::release).
    fn reacquire(&self);
}

static HOST_LOCK: Lazy<RwLock<Option<Arc<dyn HostLock>>>> = Lazy::new(|| RwLock::new(None));

/// Install the host lock, returning the previously installed one.
pub fn install_host_lock(lock: Arc<dyn HostLock>) -> Option<Arc<dyn HostLock>> {
    HOST_LOCK.write().replace(lock)
}

/// Remove the host lock, returning it.
pub fn clear_host_lock() -> Option<Arc<dyn HostLock>> {
    HOST_LOCK.write().take()
}

/// Reacquires on drop so an unwinding wait still restores the host lock.
struct Reacquire(Arc<dyn HostLock>);

impl Drop for Reacquire {
    fn drop(&mut self) {
        self.0.reacquire();
        trace!("Host lock reacquired");
    }
}

/// Run a blocking closure with the host lock released.
///
/// The closure must not hold any core lock when it returns, since the host
/// lock is taken back right after.
pub fn allow_blocking<R>(f: impl FnOnce() -> R) -> R {
    let lock = HOST_LOCK.read().clone();

    match lock {
        Some(lock) if lock.release() => {
            trace!("Host lock released for blocking wait");
            let _guard = Reacquire(lock);
            f()
        }
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pool, PoolConfig};
    use serial_test::serial;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Models a lock owned by the thread that created it, like an
    /// interpreter lock held by the calling thread.
    struct CountingLock {
        owner: thread::ThreadId,
        held: AtomicBool,
        releases: AtomicUsize,
        reacquires: AtomicUsize,
    }

    impl CountingLock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                owner: thread::current().id(),
                held: AtomicBool::new(true),
                releases: AtomicUsize::new(0),
                reacquires: AtomicUsize::new(0),
            })
        }
    }

    impl HostLock for CountingLock {
        fn release(&self) -> bool {
            if thread::current().id() != self.owner {
                return false;
            }
            if self.held.swap(false, Ordering::SeqCst) {
                self.releases.fetch_add(1, Ordering::SeqCst);
                true
            } else {
                false
            }
        }

        fn reacquire(&self) {
            self.held.store(true, Ordering::SeqCst);
            self.reacquires.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    #[serial]
    fn test_without_host_lock_is_plain_call() {
        clear_host_lock();
        assert_eq!(allow_blocking(|| 7), 7);
    }

    #[test]
    #[serial]
    fn test_lock_released_during_closure() {
        let lock = CountingLock::new();
        install_host_lock(lock.clone());

        let held_inside = allow_blocking(|| lock.held.load(Ordering::SeqCst));
        clear_host_lock();

        assert!(!held_inside);
        assert!(lock.held.load(Ordering::SeqCst));
        assert_eq!(lock.releases.load(Ordering::SeqCst), 1);
        assert_eq!(lock.reacquires.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[serial]
    fn test_not_reacquired_when_not_held() {
        let lock = CountingLock::new();
        lock.held.store(false, Ordering::SeqCst);
        install_host_lock(lock.clone());

        allow_blocking(|| ());
        clear_host_lock();

        assert_eq!(lock.releases.load(Ordering::SeqCst), 0);
        assert_eq!(lock.reacquires.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[serial]
    fn test_pool_wait_releases_host_lock() {
        let lock = CountingLock::new();
        let pool = Pool::new(PoolConfig::fixed(16).with_cap(1, 1));
        let held = pool.request(16).unwrap();

        install_host_lock(lock.clone());

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(held);
        });

        let region = pool.request(16).unwrap();
        releaser.join().unwrap();
        clear_host_lock();

        assert_eq!(region.len(), 16);
        assert_eq!(lock.releases.load(Ordering::SeqCst), 1);
        assert_eq!(lock.reacquires.load(Ordering::SeqCst), 1);
    }
}
