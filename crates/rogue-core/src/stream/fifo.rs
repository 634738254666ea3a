//! Thread-decoupling queue between a producer and its consumers.
//!
//! A [`Fifo`] is a slave on its input side and a [`Master`] on its output
//! side. A dedicated worker thread drains the queue and republishes, so the
//! upstream master returns as soon as the frame is queued.
//!
//! ```text
//! upstream Master --accept_frame--> [queue] --worker--> Fifo::master() --> slaves
//! ```

use super::frame::{copy_prefix, Frame};
use super::master::Master;
use super::pool::FramePool;
use super::slave::{Slave, SlaveLinks};
use super::FramePtr;
use crate::config::FifoSettings;
use crate::error::{Result, RogueError};
use parking_lot::{Condvar, Mutex};
use rogue_pool::{allow_blocking, PoolConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

struct FifoState {
    frames: VecDeque<FramePtr>,
    running: bool,
}

struct FifoShared {
    name: String,
    max_depth: usize,
    state: Mutex<FifoState>,
    not_empty: Condvar,
    not_full: Condvar,
    blocking: AtomicBool,
    dropped: AtomicU64,
}

impl FifoShared {
    fn is_full(&self, state: &FifoState) -> bool {
        self.max_depth > 0 && state.frames.len() >= self.max_depth
    }
}

/// Bounded frame queue with its own delivery thread.
pub struct Fifo {
    shared: Arc<FifoShared>,
    master: Master,
    pool: FramePool,
    trim_size: usize,
    no_copy: bool,
    links: SlaveLinks,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Fifo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fifo")
            .field("name", &self.shared.name)
            .field("max_depth", &self.shared.max_depth)
            .field("size", &self.size())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl Fifo {
    /// Create the queue and start its worker.
    ///
    /// * `max_depth` - queued frames before new ones are dropped (`0` = unbounded)
    /// * `trim_size` - copies keep at most this many payload bytes (`0` = all)
    /// * `no_copy` - queue the received frame itself instead of a copy
    pub fn new(
        name: impl Into<String>,
        max_depth: usize,
        trim_size: usize,
        no_copy: bool,
    ) -> Result<Self> {
        let name = name.into();
        let shared = Arc::new(FifoShared {
            name: name.clone(),
            max_depth,
            state: Mutex::new(FifoState {
                frames: VecDeque::new(),
                running: true,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            blocking: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        });
        let master = Master::new(name.clone());

        let worker = {
            let shared = Arc::clone(&shared);
            let master = master.clone();
            thread::Builder::new()
                .name(format!("fifo-{name}"))
                .spawn(move || run_worker(&shared, &master))
                .map_err(|e| RogueError::General(format!("Fifo '{name}' worker spawn: {e}")))?
        };

        info!(fifo = %name, max_depth, trim_size, no_copy, "Fifo started");

        Ok(Self {
            pool: FramePool::new(PoolConfig::variable().with_name(format!("{name}.pool"))),
            shared,
            master,
            trim_size,
            no_copy,
            links: SlaveLinks::new(),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Create a queue from configuration.
    pub fn from_settings(name: impl Into<String>, settings: &FifoSettings) -> Result<Self> {
        Self::new(name, settings.max_depth, settings.trim_size, settings.no_copy)
    }

    /// Block the upstream master instead of dropping when the queue is full.
    #[must_use]
    pub fn blocking(self, enabled: bool) -> Self {
        self.shared.blocking.store(enabled, Ordering::Relaxed);
        self
    }

    /// Output side; attach downstream slaves here.
    #[must_use]
    pub fn master(&self) -> &Master {
        &self.master
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Pool holding the queued copies.
    #[must_use]
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// Frames currently queued.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.state.lock().frames.len()
    }

    /// Frames discarded because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stop the worker after it has delivered what is queued.
    pub fn stop(&self) {
        self.shared.state.lock().running = false;
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            error!(fifo = %self.shared.name, "Fifo worker panicked");
        }
        debug!(fifo = %self.shared.name, "Fifo stopped");
    }

    fn copy_in(&self, frame: &Frame) -> Result<FramePtr> {
        let len = match self.trim_size {
            0 => frame.payload(),
            trim => frame.payload().min(trim),
        };
        let mut copy = self.pool.accept_req(len, false)?;
        copy_prefix(frame, &mut copy, len)?;
        Ok(Arc::new(copy))
    }
}

impl Slave for Fifo {
    fn accept_frame(&self, frame: FramePtr) {
        let item = if self.no_copy {
            frame
        } else {
            match self.copy_in(&frame) {
                Ok(copy) => copy,
                Err(e) => {
                    warn!(fifo = %self.shared.name, error = %e, "Fifo copy failed, frame dropped");
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        };

        let shared = &self.shared;
        let mut state = shared.state.lock();
        if !state.running {
            return;
        }

        if shared.is_full(&state) {
            if !shared.blocking.load(Ordering::Relaxed) {
                drop(state);
                let dropped = shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(fifo = %shared.name, dropped, "Fifo full, frame dropped");
                return;
            }

            drop(state);
            allow_blocking(|| {
                let mut state = shared.state.lock();
                while shared.is_full(&state) && state.running {
                    shared.not_full.wait(&mut state);
                }
                if state.running {
                    state.frames.push_back(item);
                }
            });
        } else {
            state.frames.push_back(item);
            drop(state);
        }
        shared.not_empty.notify_one();
    }

    fn links(&self) -> Option<&SlaveLinks> {
        Some(&self.links)
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(shared: &FifoShared, master: &Master) {
    loop {
        let frame = {
            let mut state = shared.state.lock();
            while state.frames.is_empty() && state.running {
                shared.not_empty.wait(&mut state);
            }
            match state.frames.pop_front() {
                Some(frame) => frame,
                None => break,
            }
        };
        shared.not_full.notify_one();
        master.forward(frame);
    }
    debug!(fifo = %shared.name, "Fifo worker exiting");
}
