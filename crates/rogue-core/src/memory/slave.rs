use super::transaction::Transaction;
use crate::error::MemoryError;
use std::sync::Arc;
use tracing::warn;

/// Executes memory transactions.
///
/// Implementations must eventually call [`Transaction::done`] (or let the
/// transaction expire). Completing from another thread is fine.
pub trait MemorySlave: Send + Sync {
    /// Execute `txn`. The default rejects every access.
    fn do_transaction(&self, txn: Arc<Transaction>) {
        warn!(id = txn.id(), address = txn.address(), "No memory behind this slave");
        txn.error(MemoryError::Address);
    }

    /// Smallest access size in bytes; addresses and sizes align to it.
    fn min_access(&self) -> u32 {
        4
    }

    /// Largest single access in bytes.
    fn max_access(&self) -> u32 {
        4
    }

    /// Base address of this slave in its parent's address space.
    fn address(&self) -> u64 {
        0
    }
}
