//! In-process streaming core for detector data acquisition.
//!
//! Two graphs share one concurrency model:
//!
//! - [`stream`]: producers ([`stream::Master`]) publish multi-buffer
//!   [`stream::Frame`]s to any number of consumers ([`stream::Slave`]).
//!   Buffers come from capped [`Pool`]s and go back when the last consumer
//!   drops the frame.
//! - [`memory`]: initiators ([`memory::MemoryMaster`]) issue register
//!   [`memory::Transaction`]s with deadlines to executors
//!   ([`memory::MemorySlave`]), which complete them with a result code.
//!
//! Everything runs on OS threads. Blocking points (pool caps, Fifo
//! back-pressure, transaction waits, serialized publishes) release an
//! installed [`HostLock`] while they wait.
//!
//! # Example
//!
//! ```
//! use rogue_core::stream::{Master, Slave, FramePtr};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct Counter(AtomicUsize);
//!
//! impl Slave for Counter {
//!     fn accept_frame(&self, frame: FramePtr) {
//!         self.0.fetch_add(frame.payload(), Ordering::Relaxed);
//!     }
//! }
//!
//! let counter = Arc::new(Counter::default());
//! let master = Master::new("source");
//! master.add_slave(counter.clone());
//!
//! let mut frame = master.req_frame(4, true)?;
//! frame.write(&[1, 2, 3, 4], 0)?;
//! master.send_frame(frame);
//!
//! assert_eq!(counter.0.load(Ordering::Relaxed), 4);
//! # Ok::<(), rogue_core::RogueError>(())
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod stream;

pub use error::{MemoryError, Result, RogueError};
pub use rogue_pool::{
    allow_blocking, clear_host_lock, install_host_lock, CapPolicy, HostLock, Pool, PoolConfig,
    PoolError, Region,
};
