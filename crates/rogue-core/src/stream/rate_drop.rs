//! Rate limiting by frame count or by time.

use super::frame::Frame;
use super::master::Master;
use super::slave::{Slave, SlaveLinks};
use super::FramePtr;
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How a [`RateDrop`] thins the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropRate {
    /// Forward one frame out of every `n` (`0` and `1` forward everything).
    Count(u32),
    /// Forward at most one frame per period.
    Period(Duration),
}

#[derive(Debug)]
struct RateState {
    seen: u32,
    next: Option<Instant>,
}

/// Forwards a subset of frames, releasing the rest immediately.
#[derive(Debug)]
pub struct RateDrop {
    master: Master,
    rate: DropRate,
    state: Mutex<RateState>,
    dropped: AtomicU64,
    links: SlaveLinks,
}

impl RateDrop {
    /// Create the node.
    #[must_use]
    pub fn new(name: impl Into<String>, rate: DropRate) -> Self {
        let master = Master::new(name);
        debug!(rate_drop = %master.name(), ?rate, "RateDrop created");
        Self {
            master,
            rate,
            state: Mutex::new(RateState { seen: 0, next: None }),
            dropped: AtomicU64::new(0),
            links: SlaveLinks::new(),
        }
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.master.name()
    }

    /// Frames released without forwarding.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Output side.
    #[must_use]
    pub fn master(&self) -> &Master {
        &self.master
    }

    fn admit(&self) -> bool {
        let mut state = self.state.lock();
        match self.rate {
            DropRate::Count(n) => {
                let pass = state.seen == 0;
                state.seen += 1;
                if state.seen >= n {
                    state.seen = 0;
                }
                pass
            }
            DropRate::Period(period) => {
                let now = Instant::now();
                if state.next.map_or(true, |next| now >= next) {
                    state.next = Some(now + period);
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl Slave for RateDrop {
    fn accept_req(&self, size: usize, zero_copy_ok: bool) -> Result<Frame> {
        self.master.req_frame(size, zero_copy_ok)
    }

    fn accept_frame(&self, frame: FramePtr) {
        if self.admit() {
            self.master.forward(frame);
        } else {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(rate_drop = %self.name(), dropped, "Frame dropped by rate limit");
        }
    }

    fn links(&self) -> Option<&SlaveLinks> {
        Some(&self.links)
    }
}
