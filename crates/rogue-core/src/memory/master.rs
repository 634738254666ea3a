//! Initiator side of the memory graph.
//!
//! Submission is serialized per master: `do_transaction` calls reach the
//! slave in the order they were requested, so a posted write is always seen
//! before a later read from the same master. Two masters sharing a slave are
//! interleaved in whatever order their threads win their own locks.

use super::slave::MemorySlave;
use super::transaction::{Transaction, TransactionType};
use crate::config::MemorySettings;
use crate::error::{MemoryError, Result, RogueError};
use parking_lot::{Mutex, RwLock};
use rogue_pool::allow_blocking;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-transaction timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Issues transactions to a single downstream [`MemorySlave`].
pub struct MemoryMaster {
    name: String,
    slave: RwLock<Option<Arc<dyn MemorySlave>>>,
    submit: Mutex<()>,
    pending: Mutex<BTreeMap<u32, Arc<Transaction>>>,
    timeout: RwLock<Duration>,
    error: AtomicU32,
}

impl std::fmt::Debug for MemoryMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMaster")
            .field("name", &self.name)
            .field("pending", &self.pending_count())
            .field("timeout", &self.timeout())
            .field("error", &self.error())
            .finish()
    }
}

impl MemoryMaster {
    /// Create an unconnected master.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slave: RwLock::new(None),
            submit: Mutex::new(()),
            pending: Mutex::new(BTreeMap::new()),
            timeout: RwLock::new(DEFAULT_TIMEOUT),
            error: AtomicU32::new(0),
        }
    }

    /// Create an unconnected master using the configured timeout.
    #[must_use]
    pub fn from_settings(name: impl Into<String>, settings: &MemorySettings) -> Self {
        let master = Self::new(name);
        master.set_timeout(settings.timeout);
        master
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the downstream slave, replacing any previous one.
    pub fn add_slave(&self, slave: Arc<dyn MemorySlave>) {
        let replaced = self.slave.write().replace(slave).is_some();
        info!(master = %self.name, replaced, "Memory slave attached");
    }

    /// The downstream slave.
    #[must_use]
    pub fn slave(&self) -> Option<Arc<dyn MemorySlave>> {
        self.slave.read().clone()
    }

    /// Timeout applied to new transactions.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        *self.timeout.read()
    }

    /// Change the timeout for new transactions.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }

    /// Last non-zero completion code seen by a wait (`0` = none).
    #[must_use]
    pub fn error(&self) -> u32 {
        self.error.load(Ordering::Relaxed)
    }

    /// Reset [`error`](MemoryMaster::error).
    pub fn clear_error(&self) {
        self.error.store(0, Ordering::Relaxed);
    }

    /// Transactions submitted and not yet waited for.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Minimum access size of the slave (4 with none attached).
    #[must_use]
    pub fn min_access(&self) -> u32 {
        self.slave().map_or(4, |s| s.min_access())
    }

    /// Maximum access size of the slave (4 with none attached).
    #[must_use]
    pub fn max_access(&self) -> u32 {
        self.slave().map_or(4, |s| s.max_access())
    }

    /// Base address of the slave (0 with none attached).
    #[must_use]
    pub fn address(&self) -> u64 {
        self.slave().map_or(0, |s| s.address())
    }

    /// Submit a transaction and return its id without waiting.
    ///
    /// For reads and verifies the length of `data` is the access size.
    pub fn req_transaction(&self, address: u64, data: Vec<u8>, kind: TransactionType) -> Result<u32> {
        self.submit(address, data, kind).map(|txn| txn.id())
    }

    pub(crate) fn submit(
        &self,
        address: u64,
        data: Vec<u8>,
        kind: TransactionType,
    ) -> Result<Arc<Transaction>> {
        let txn = Transaction::new(address, data, kind, self.timeout());
        self.dispatch(&txn, true)?;
        Ok(txn)
    }

    /// Hand `txn` to the slave under the submission lock.
    ///
    /// Tracked transactions join the pending set. An unstarted transaction
    /// is started here; children of a split arrive already started.
    pub(crate) fn dispatch(&self, txn: &Arc<Transaction>, track: bool) -> Result<()> {
        let slave = self.slave().ok_or_else(|| {
            RogueError::General(format!("memory master '{}' has no slave", self.name))
        })?;

        let min_access = slave.min_access().max(1);
        let (address, size) = (txn.address(), txn.size());
        if address % u64::from(min_access) != 0 || size % min_access as usize != 0 {
            return Err(RogueError::Alignment {
                address,
                size,
                min_access,
            });
        }

        let _order = match self.submit.try_lock() {
            Some(guard) => guard,
            None => allow_blocking(|| self.submit.lock()),
        };
        if track {
            self.pending.lock().insert(txn.id(), Arc::clone(txn));
        }
        if txn.started().is_none() {
            txn.start();
        }
        slave.do_transaction(Arc::clone(txn));
        Ok(())
    }

    /// Complete a pending transaction by id.
    ///
    /// Returns `false` for unknown ids and for transactions already finished.
    pub fn done_transaction(&self, id: u32, code: u32) -> bool {
        let txn = self.pending.lock().get(&id).cloned();
        match txn {
            Some(txn) => txn.done(code),
            None => {
                debug!(master = %self.name, id, "Completion for unknown transaction");
                false
            }
        }
    }

    /// Wait for transaction `id`, or for every pending one when `id == 0`.
    ///
    /// Waited transactions leave the pending set. The first failure is
    /// returned after all requested transactions have finished.
    pub fn wait_transaction(&self, id: u32) -> Result<()> {
        let txns: Vec<_> = {
            let pending = self.pending.lock();
            if id == 0 {
                pending.values().cloned().collect()
            } else {
                pending.get(&id).cloned().into_iter().collect()
            }
        };

        let mut first = None;
        for txn in txns {
            if let Err(e) = self.finish(&txn) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Wait for transaction `id` and return its payload.
    ///
    /// For reads and verifies this is the data returned by the slave; for
    /// writes it is the data that was sent.
    pub fn wait_data(&self, id: u32) -> Result<Vec<u8>> {
        let txn = self.pending.lock().get(&id).cloned().ok_or_else(|| {
            RogueError::General(format!(
                "memory master '{}' has no pending transaction {id}",
                self.name
            ))
        })?;
        self.finish(&txn)?;
        Ok(txn.take_data().unwrap_or_default())
    }

    /// Wait for `txn`, drop it from the pending set and map its code.
    pub(crate) fn finish(&self, txn: &Transaction) -> Result<()> {
        let code = txn.wait();
        self.pending.lock().remove(&txn.id());

        match MemoryError::from_code(code) {
            None => Ok(()),
            Some(error) => {
                self.error.store(code, Ordering::Relaxed);
                warn!(
                    master = %self.name,
                    id = txn.id(),
                    address = format_args!("{:#x}", txn.address()),
                    %error,
                    "Memory transaction failed"
                );
                Err(RogueError::Memory {
                    id: txn.id(),
                    address: txn.address(),
                    code: error,
                })
            }
        }
    }

    /// Blocking acknowledged write.
    pub fn write(&self, address: u64, data: &[u8]) -> Result<()> {
        let txn = self.submit(address, data.to_vec(), TransactionType::Write)?;
        self.finish(&txn)
    }

    /// Blocking posted write.
    pub fn post(&self, address: u64, data: &[u8]) -> Result<()> {
        let txn = self.submit(address, data.to_vec(), TransactionType::Post)?;
        self.finish(&txn)
    }

    /// Blocking read of `len` bytes.
    pub fn read(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let txn = self.submit(address, vec![0; len], TransactionType::Read)?;
        self.finish(&txn)?;
        Ok(txn.take_data().unwrap_or_default())
    }

    /// Read back `expected.len()` bytes and compare.
    ///
    /// A mismatch fails with [`MemoryError::Verify`].
    pub fn verify(&self, address: u64, expected: &[u8]) -> Result<()> {
        let txn = self.submit(address, expected.to_vec(), TransactionType::Verify)?;
        self.finish(&txn)?;

        let actual = txn.take_data().unwrap_or_default();
        if actual != expected {
            self.error.store(MemoryError::Verify.code(), Ordering::Relaxed);
            warn!(master = %self.name, address = format_args!("{address:#x}"), "Verify mismatch");
            return Err(RogueError::Memory {
                id: txn.id(),
                address,
                code: MemoryError::Verify,
            });
        }
        Ok(())
    }
}
