//! A single register-level operation with a deadline.
//!
//! State machine:
//!
//! ```text
//! Created --start()--> Pending --done(code)--> Done(code)
//!                         |
//!                         +--deadline passes--> Done(TIMEOUT_ERROR)
//! ```
//!
//! Expiry is settled lazily by whichever observer looks first (a waiter, a
//! late `done`, `is_done`, `result`), so every observer sees the same code.
//!
//! A transaction can be split into children that share its deadline. Each
//! child reports to a [`SubGroup`] on completion; the last one completes the
//! parent with the first non-zero child code. A child that expires never
//! reports, and the parent expires on the same deadline.

use crate::error::{MemoryError, Result, RogueError, TIMEOUT_ERROR};
use parking_lot::{Condvar, Mutex, MutexGuard};
use rogue_pool::allow_blocking;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique, never zero.
fn next_id() -> u32 {
    loop {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        if id != 0 {
            return id;
        }
    }
}

/// Kind of memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TransactionType {
    /// Read from the slave into the transaction payload
    Read = 1,
    /// Write the payload, acknowledged
    Write = 2,
    /// Posted write, acknowledged without readback
    Post = 3,
    /// Read back for comparison with an expected payload
    Verify = 4,
}

impl TransactionType {
    /// Decode a numeric type.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Read),
            2 => Some(Self::Write),
            3 => Some(Self::Post),
            4 => Some(Self::Verify),
            _ => None,
        }
    }

    /// Whether the payload flows from master to slave.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::Post)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Post => "post",
            Self::Verify => "verify",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
struct TxnState {
    data: Vec<u8>,
    started: Option<Instant>,
    deadline: Option<Instant>,
    result: Option<u32>,
}

/// Completion tracking for the children of one split transaction.
#[derive(Debug)]
pub(crate) struct SubGroup {
    parent: Arc<Transaction>,
    remaining: AtomicUsize,
    code: AtomicU32,
}

impl SubGroup {
    /// Track `pieces` children of `parent`.
    pub(crate) fn new(parent: Arc<Transaction>, pieces: usize) -> Arc<Self> {
        Arc::new(Self {
            parent,
            remaining: AtomicUsize::new(pieces),
            code: AtomicU32::new(0),
        })
    }

    /// Account for `pieces` children that will never run.
    pub(crate) fn abandon(&self, pieces: usize, code: u32) {
        self.record(code);
        self.settle_pieces(pieces);
    }

    fn record(&self, code: u32) {
        if code != 0 {
            let _ = self
                .code
                .compare_exchange(0, code, Ordering::AcqRel, Ordering::Acquire);
        }
    }

    fn settle_pieces(&self, pieces: usize) {
        if self.remaining.fetch_sub(pieces, Ordering::AcqRel) == pieces {
            self.parent.done(self.code.load(Ordering::Acquire));
        }
    }
}

#[derive(Debug)]
struct SubLink {
    group: Arc<SubGroup>,
    offset: usize,
}

/// One memory operation, shared between the initiating master and the slave
/// executing it.
#[derive(Debug)]
pub struct Transaction {
    id: u32,
    kind: TransactionType,
    address: u64,
    size: usize,
    timeout: Duration,
    state: Mutex<TxnState>,
    finished: Condvar,
    link: Option<SubLink>,
}

impl Transaction {
    /// Create a transaction carrying `data`; its length is the access size.
    #[must_use]
    pub fn new(address: u64, data: Vec<u8>, kind: TransactionType, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            kind,
            address,
            size: data.len(),
            timeout,
            state: Mutex::new(TxnState {
                data,
                started: None,
                deadline: None,
                result: None,
            }),
            finished: Condvar::new(),
            link: None,
        })
    }

    /// A started child covering `data.len()` bytes of the group's parent at
    /// `offset`, expiring with the parent.
    pub(crate) fn child(
        group: &Arc<SubGroup>,
        address: u64,
        offset: usize,
        data: Vec<u8>,
    ) -> Arc<Self> {
        let parent = &group.parent;
        let now = Instant::now();
        let deadline = parent
            .state
            .lock()
            .deadline
            .unwrap_or(now + parent.timeout);

        Arc::new(Self {
            id: next_id(),
            kind: parent.kind,
            address,
            size: data.len(),
            timeout: deadline.saturating_duration_since(now),
            state: Mutex::new(TxnState {
                data,
                started: Some(now),
                deadline: Some(deadline),
                result: None,
            }),
            finished: Condvar::new(),
            link: Some(SubLink {
                group: Arc::clone(group),
                offset,
            }),
        })
    }

    /// Unique id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Operation kind.
    #[must_use]
    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    /// Target address.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Access size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Time allowed from start to completion.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// When the transaction was started, if it was.
    #[must_use]
    pub fn started(&self) -> Option<Instant> {
        self.state.lock().started
    }

    /// Record the submission time and arm the deadline.
    pub fn start(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.started = Some(now);
        state.deadline = Some(now + self.timeout);
        trace!(id = self.id, kind = %self.kind, address = self.address, size = self.size, "Transaction started");
    }

    /// Re-arm the deadline of a pending transaction.
    pub fn refresh_timer(&self) {
        let mut state = self.state.lock();
        if self.settle(&mut state).is_none() {
            state.deadline = Some(Instant::now() + self.timeout);
        }
    }

    /// Copy payload bytes out, starting at `offset`.
    pub fn read(&self, dst: &mut [u8], offset: usize) -> Result<()> {
        let end = self.span(offset, dst.len(), "Transaction::read")?;
        dst.copy_from_slice(&self.state.lock().data[offset..end]);
        Ok(())
    }

    /// Copy bytes into the payload at `offset`.
    pub fn write(&self, src: &[u8], offset: usize) -> Result<()> {
        let end = self.span(offset, src.len(), "Transaction::write")?;
        self.state.lock().data[offset..end].copy_from_slice(src);
        Ok(())
    }

    fn span(&self, offset: usize, len: usize, context: &'static str) -> Result<usize> {
        offset
            .checked_add(len)
            .filter(|end| *end <= self.size)
            .ok_or_else(|| RogueError::boundary(context, offset.saturating_add(len), self.size))
    }

    /// Direct access to the payload.
    ///
    /// The guard holds the transaction lock: release it before calling
    /// [`done`](Transaction::done).
    pub fn lock(&self) -> TransactionLock<'_> {
        TransactionLock {
            guard: self.state.lock(),
        }
    }

    /// Complete with `code` (`0` = success).
    ///
    /// Returns `true` when this call made the terminal transition. Calls on
    /// a finished or expired transaction are ignored.
    pub fn done(&self, code: u32) -> bool {
        let mut state = self.state.lock();
        if let Some(existing) = self.settle(&mut state) {
            drop(state);
            debug!(id = self.id, code, existing, "Completion ignored, transaction already finished");
            return false;
        }

        state.result = Some(code);
        let data = match &self.link {
            Some(_) if code == 0 && !self.kind.is_write() => Some(state.data.clone()),
            _ => None,
        };
        drop(state);
        self.finished.notify_all();

        if code == 0 {
            trace!(id = self.id, "Transaction done");
        } else {
            debug!(id = self.id, code = format_args!("{code:#010x}"), "Transaction failed");
        }

        if let Some(link) = &self.link {
            let mut code = code;
            if let Some(data) = data {
                if let Err(e) = link.group.parent.write(&data, link.offset) {
                    warn!(id = self.id, error = %e, "Child payload does not fit its parent");
                    code = MemoryError::Address.code();
                }
            }
            link.group.record(code);
            link.group.settle_pieces(1);
        }
        true
    }

    /// Complete with an error.
    pub fn error(&self, error: MemoryError) -> bool {
        self.done(error.code())
    }

    /// Settle expiry and report the terminal code, if any.
    fn settle(&self, state: &mut TxnState) -> Option<u32> {
        if state.result.is_none() {
            if let Some(deadline) = state.deadline {
                if Instant::now() >= deadline {
                    state.result = Some(TIMEOUT_ERROR);
                    warn!(
                        id = self.id,
                        kind = %self.kind,
                        address = format_args!("{:#x}", self.address),
                        timeout_ms = self.timeout.as_millis(),
                        "Transaction timed out"
                    );
                    self.finished.notify_all();
                }
            }
        }
        state.result
    }

    /// Whether the transaction reached its terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.result().is_some()
    }

    /// The terminal code, or `None` while pending.
    #[must_use]
    pub fn result(&self) -> Option<u32> {
        let mut state = self.state.lock();
        self.settle(&mut state)
    }

    /// Block until done or expired and return the terminal code.
    ///
    /// An unstarted transaction is started by the first wait.
    pub fn wait(&self) -> u32 {
        allow_blocking(|| {
            let mut state = self.state.lock();
            loop {
                if let Some(code) = self.settle(&mut state) {
                    return code;
                }
                match state.deadline {
                    Some(deadline) => {
                        self.finished.wait_until(&mut state, deadline);
                    }
                    None => {
                        let now = Instant::now();
                        state.started = Some(now);
                        state.deadline = Some(now + self.timeout);
                    }
                }
            }
        })
    }

    /// Like [`wait`](Transaction::wait) with the deadline pulled in to at
    /// most `timeout` from now.
    pub fn wait_for(&self, timeout: Duration) -> u32 {
        {
            let mut state = self.state.lock();
            let bound = Instant::now() + timeout;
            state.deadline = Some(state.deadline.map_or(bound, |d| d.min(bound)));
        }
        self.wait()
    }

    /// Take the payload out of a finished transaction.
    pub fn take_data(&self) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        self.settle(&mut state)?;
        Some(std::mem::take(&mut state.data))
    }
}

/// Locked view of a transaction payload.
pub struct TransactionLock<'a> {
    guard: MutexGuard<'a, TxnState>,
}

impl Deref for TransactionLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard.data
    }
}

impl DerefMut for TransactionLock<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard.data
    }
}
