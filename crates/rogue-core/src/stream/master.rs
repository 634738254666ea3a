//! The producer side of the stream graph.
//!
//! A [`Master`] holds strong references to its slaves. Publishing takes a
//! snapshot of the wiring, so adding or dropping a slave never splits a
//! fan-out: each frame goes to the full old set or the full new set.
//! Publishes on one master are serialized, which keeps every edge FIFO.

use super::frame::Frame;
use super::pool::FramePool;
use super::slave::{slave_addr, Slave};
use super::FramePtr;
use crate::error::Result;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use rogue_pool::{allow_blocking, PoolConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Attached slaves plus the one asked for new frames.
struct Wiring {
    slaves: Arc<[Arc<dyn Slave>]>,
    primary: Option<Arc<dyn Slave>>,
}

impl Default for Wiring {
    fn default() -> Self {
        Self {
            slaves: Arc::from(Vec::new()),
            primary: None,
        }
    }
}

impl Wiring {
    fn position(&self, addr: *const ()) -> Option<usize> {
        self.slaves
            .iter()
            .position(|slave| slave_addr(slave.as_ref()) == addr)
    }
}

pub(crate) struct MasterInner {
    name: String,
    wiring: RwLock<Wiring>,
    send_lock: Mutex<()>,
    pool: OnceCell<FramePool>,
    frame_count: AtomicU64,
    byte_count: AtomicU64,
}

impl MasterInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Drop a slave by address, promoting a new primary when needed.
    ///
    /// Returns the removed slave so the caller can unlink it.
    fn take(&self, addr: *const ()) -> Option<Arc<dyn Slave>> {
        let mut wiring = self.wiring.write();
        let index = wiring.position(addr)?;

        let mut slaves: Vec<_> = wiring.slaves.iter().cloned().collect();
        let removed = slaves.remove(index);
        wiring.slaves = slaves.into();

        let was_primary = wiring
            .primary
            .as_ref()
            .is_some_and(|p| slave_addr(p.as_ref()) == addr);
        if was_primary {
            wiring.primary = wiring.slaves.first().cloned();
        }
        let remaining = wiring.slaves.len();
        drop(wiring);

        debug!(master = %self.name, remaining, promoted = was_primary, "Slave dropped");
        Some(removed)
    }

    /// Drop a slave on request of the slave itself.
    pub(crate) fn remove(&self, addr: *const ()) {
        self.take(addr);
    }

    fn local_pool(&self) -> &FramePool {
        self.pool.get_or_init(|| {
            FramePool::new(PoolConfig::variable().with_name(format!("{}.pool", self.name)))
        })
    }
}

impl Drop for MasterInner {
    fn drop(&mut self) {
        let me: *const MasterInner = self;
        for slave in self.wiring.get_mut().slaves.iter() {
            if let Some(links) = slave.links() {
                links.detach(me);
            }
        }
        trace!(master = %self.name, "Master destroyed");
    }
}

/// A stream producer.
///
/// Cloning yields another handle to the same node. Producers embed a
/// `Master` and call [`req_frame`](Master::req_frame) then
/// [`send_frame`](Master::send_frame).
#[derive(Clone)]
pub struct Master {
    inner: Arc<MasterInner>,
}

impl std::fmt::Debug for Master {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Master")
            .field("name", &self.inner.name)
            .field("slaves", &self.slave_count())
            .field("frame_count", &self.frame_count())
            .finish()
    }
}

impl Master {
    /// Create an unconnected master.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MasterInner {
                name: name.into(),
                wiring: RwLock::new(Wiring::default()),
                send_lock: Mutex::new(()),
                pool: OnceCell::new(),
                frame_count: AtomicU64::new(0),
                byte_count: AtomicU64::new(0),
            }),
        }
    }

    /// Node name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attach a slave. Attaching the same slave twice is a no-op.
    ///
    /// The first slave attached becomes the primary.
    pub fn add_slave(&self, slave: Arc<dyn Slave>) {
        let mut wiring = self.inner.wiring.write();
        if wiring.position(slave_addr(slave.as_ref())).is_some() {
            return;
        }

        if let Some(links) = slave.links() {
            links.attach(&self.inner);
        }
        if wiring.primary.is_none() {
            wiring.primary = Some(Arc::clone(&slave));
        }

        let mut slaves: Vec<_> = wiring.slaves.iter().cloned().collect();
        slaves.push(slave);
        wiring.slaves = slaves.into();
        let count = wiring.slaves.len();
        drop(wiring);

        info!(master = %self.inner.name, slaves = count, "Slave attached");
    }

    /// Detach a slave. Detaching an unknown slave is a no-op.
    pub fn drop_slave(&self, slave: &Arc<dyn Slave>) {
        if let Some(removed) = self.inner.take(slave_addr(slave.as_ref())) {
            if let Some(links) = removed.links() {
                links.detach(Arc::as_ptr(&self.inner));
            }
        }
    }

    /// Detach every slave.
    pub fn clear_slaves(&self) {
        let old = std::mem::take(&mut *self.inner.wiring.write());
        for slave in old.slaves.iter() {
            if let Some(links) = slave.links() {
                links.detach(Arc::as_ptr(&self.inner));
            }
        }
        debug!(master = %self.inner.name, dropped = old.slaves.len(), "All slaves detached");
    }

    /// Make `slave` the one asked for new frames, attaching it if needed.
    pub fn set_primary(&self, slave: Arc<dyn Slave>) {
        self.add_slave(Arc::clone(&slave));
        self.inner.wiring.write().primary = Some(slave);
    }

    /// Number of attached slaves.
    #[must_use]
    pub fn slave_count(&self) -> usize {
        self.inner.wiring.read().slaves.len()
    }

    /// Request an empty frame of at least `size` bytes.
    ///
    /// The primary slave allocates it; without one the master's own heap
    /// pool does.
    pub fn req_frame(&self, size: usize, zero_copy_ok: bool) -> Result<Frame> {
        let primary = self.inner.wiring.read().primary.clone();
        match primary {
            Some(slave) => slave.accept_req(size, zero_copy_ok),
            None => self.inner.local_pool().accept_req(size, zero_copy_ok),
        }
    }

    /// Publish a frame to every attached slave.
    pub fn send_frame(&self, frame: Frame) {
        self.forward(Arc::new(frame));
    }

    /// Publish an already shared frame to every attached slave.
    ///
    /// The last slave receives this reference, so a single slave chain gets
    /// exclusive ownership of an exclusively held frame. A slave must not
    /// publish on the master that is currently delivering to it.
    pub fn forward(&self, frame: FramePtr) {
        let _order = match self.inner.send_lock.try_lock() {
            Some(guard) => guard,
            None => allow_blocking(|| self.inner.send_lock.lock()),
        };

        let slaves = Arc::clone(&self.inner.wiring.read().slaves);
        let bytes = frame.payload() as u64;
        self.inner.frame_count.fetch_add(1, Ordering::Relaxed);
        self.inner.byte_count.fetch_add(bytes, Ordering::Relaxed);

        match slaves.split_last() {
            Some((last, rest)) => {
                for slave in rest {
                    slave.accept_frame(Arc::clone(&frame));
                }
                last.accept_frame(frame);
            }
            None => trace!(master = %self.inner.name, bytes, "No slaves attached, frame released"),
        }
    }

    /// Frames published since creation.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count.load(Ordering::Relaxed)
    }

    /// Payload bytes published since creation.
    #[must_use]
    pub fn byte_count(&self) -> u64 {
        self.inner.byte_count.load(Ordering::Relaxed)
    }
}
