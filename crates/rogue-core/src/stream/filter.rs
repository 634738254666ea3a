//! Channel and error filtering.

use super::frame::Frame;
use super::master::Master;
use super::slave::{Slave, SlaveLinks};
use super::FramePtr;
use crate::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Forwards frames on one channel, optionally discarding errored frames.
#[derive(Debug)]
pub struct Filter {
    master: Master,
    channel: u8,
    drop_errors: bool,
    filtered: AtomicU64,
    links: SlaveLinks,
}

impl Filter {
    /// Pass frames whose channel is `channel`.
    #[must_use]
    pub fn new(name: impl Into<String>, channel: u8, drop_errors: bool) -> Self {
        let master = Master::new(name);
        debug!(filter = %master.name(), channel, drop_errors, "Filter created");
        Self {
            master,
            channel,
            drop_errors,
            filtered: AtomicU64::new(0),
            links: SlaveLinks::new(),
        }
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.master.name()
    }

    /// Output side.
    #[must_use]
    pub fn master(&self) -> &Master {
        &self.master
    }

    /// Frames withheld so far.
    #[must_use]
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }
}

impl Slave for Filter {
    /// Allocation is delegated downstream so filtered frames come from the
    /// consumer's pool.
    fn accept_req(&self, size: usize, zero_copy_ok: bool) -> Result<Frame> {
        self.master.req_frame(size, zero_copy_ok)
    }

    fn accept_frame(&self, frame: FramePtr) {
        if frame.channel() != self.channel {
            let filtered = self.filtered.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(
                filter = %self.name(),
                channel = frame.channel(),
                filtered,
                "Frame on other channel filtered"
            );
            return;
        }
        if self.drop_errors && frame.error() != 0 {
            let filtered = self.filtered.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(
                filter = %self.name(),
                error = frame.error(),
                filtered,
                "Errored frame filtered"
            );
            return;
        }
        self.master.forward(frame);
    }

    fn links(&self) -> Option<&SlaveLinks> {
        Some(&self.links)
    }
}
