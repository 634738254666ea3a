//! Stream graph: frames, buffers and the master/slave wiring that moves
//! them.
//!
//! Producers embed a [`Master`]; consumers implement [`Slave`]. A frame is
//! requested from the primary slave, filled while the producer owns it, and
//! published as a [`FramePtr`] shared by every consumer. The buffers return
//! to their pools when the last consumer lets go.

mod buffer;
mod fifo;
mod filter;
mod frame;
mod iterator;
mod master;
mod pool;
mod rate_drop;
mod slave;

pub use buffer::Buffer;
pub use fifo::Fifo;
pub use filter::Filter;
pub use frame::{copy_frame, Frame};
pub use iterator::{FrameIter, FrameIterMut};
pub use master::Master;
pub use pool::{default_frame_pool, FramePool};
pub use rate_drop::{DropRate, RateDrop};
pub use slave::{Slave, SlaveLinks};

use std::sync::Arc;

/// A published, read-only frame.
pub type FramePtr = Arc<Frame>;

/// Attach `slave` to `master`.
pub fn connect(master: &Master, slave: Arc<dyn Slave>) {
    master.add_slave(slave);
}

/// Detach `slave` from `master`.
pub fn disconnect(master: &Master, slave: &Arc<dyn Slave>) {
    master.drop_slave(slave);
}
