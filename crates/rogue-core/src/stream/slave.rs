//! The consumer side of the stream graph.

use super::frame::Frame;
use super::master::MasterInner;
use super::pool::default_frame_pool;
use super::FramePtr;
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A stream consumer.
///
/// Masters call [`accept_req`](Slave::accept_req) to obtain an empty frame
/// and [`accept_frame`](Slave::accept_frame) to deliver a filled one. Both
/// may run concurrently from different masters.
pub trait Slave: Send + Sync {
    /// Provide an empty frame able to hold `size` bytes.
    ///
    /// `zero_copy_ok == false` asks for ordinary heap memory even when the
    /// slave normally hands out DMA-mapped buffers.
    fn accept_req(&self, size: usize, zero_copy_ok: bool) -> Result<Frame> {
        default_frame_pool().accept_req(size, zero_copy_ok)
    }

    /// Consume a published frame.
    ///
    /// Blocking here is how a slave applies back-pressure. Keeping the
    /// pointer past return is allowed but holds the buffers.
    fn accept_frame(&self, frame: FramePtr);

    /// Upstream bookkeeping for symmetric teardown.
    ///
    /// Slaves returning `Some` are unlinked from dropped masters and can
    /// detach themselves with [`SlaveLinks::disconnect_all`].
    fn links(&self) -> Option<&SlaveLinks> {
        None
    }
}

/// Thin address used to compare trait objects by identity.
pub(crate) fn slave_addr(slave: &dyn Slave) -> *const () {
    slave as *const dyn Slave as *const ()
}

/// Weak references from a slave to every master feeding it.
#[derive(Debug, Default)]
pub struct SlaveLinks {
    masters: Mutex<Vec<Weak<MasterInner>>>,
}

impl SlaveLinks {
    /// Empty link set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, master: &Arc<MasterInner>) {
        let mut masters = self.masters.lock();
        masters.retain(|weak| weak.strong_count() > 0);
        if !masters
            .iter()
            .any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(master)))
        {
            masters.push(Arc::downgrade(master));
        }
    }

    pub(crate) fn detach(&self, master: *const MasterInner) {
        self.masters
            .lock()
            .retain(|weak| weak.strong_count() > 0 && !std::ptr::eq(weak.as_ptr(), master));
    }

    /// Number of live masters this slave is attached to.
    #[must_use]
    pub fn master_count(&self) -> usize {
        self.masters
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Remove `slave` from every live upstream master.
    ///
    /// `slave` must be the object owning these links.
    pub fn disconnect_all(&self, slave: &dyn Slave) {
        let masters = std::mem::take(&mut *self.masters.lock());
        let addr = slave_addr(slave);

        for master in masters.iter().filter_map(Weak::upgrade) {
            debug!(master = %master.name(), "Unlinking slave from master");
            master.remove(addr);
        }
    }
}
