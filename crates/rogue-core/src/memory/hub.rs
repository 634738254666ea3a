//! Address translation between memory tree levels.

use super::master::MemoryMaster;
use super::slave::MemorySlave;
use super::transaction::{SubGroup, Transaction};
use crate::error::{MemoryError, Result, RogueError};
use std::sync::Arc;
use tracing::{debug, warn};

/// A slave to its parent and a master to its child.
///
/// Incoming addresses are shifted by `offset`. Transactions larger than the
/// child's `max_access` are split into child-sized pieces that share the
/// parent's deadline. The parent completes once every piece has, with the
/// first non-zero child code or `0`; `do_transaction` itself never waits.
#[derive(Debug)]
pub struct Hub {
    offset: u64,
    master: MemoryMaster,
}

impl Hub {
    /// Create a hub mapping parent address `a` to child address `a + offset`.
    #[must_use]
    pub fn new(name: impl Into<String>, offset: u64) -> Self {
        Self {
            offset,
            master: MemoryMaster::new(name),
        }
    }

    /// Downstream side.
    #[must_use]
    pub fn master(&self) -> &MemoryMaster {
        &self.master
    }

    /// Set the child slave.
    pub fn add_slave(&self, slave: Arc<dyn MemorySlave>) {
        self.master.add_slave(slave);
    }

    /// Address offset applied to incoming transactions.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn piece(
        &self,
        group: &Arc<SubGroup>,
        txn: &Transaction,
        offset: usize,
        len: usize,
    ) -> Result<()> {
        let address = txn
            .address()
            .checked_add(self.offset)
            .and_then(|base| base.checked_add(offset as u64))
            .ok_or_else(|| {
                RogueError::General(format!(
                    "address {:#x} + {:#x} + {offset} overflows",
                    txn.address(),
                    self.offset
                ))
            })?;

        let mut data = vec![0u8; len];
        txn.read(&mut data, offset)?;
        let child = Transaction::child(group, address, offset, data);
        self.master.dispatch(&child, false)
    }
}

impl MemorySlave for Hub {
    fn do_transaction(&self, txn: Arc<Transaction>) {
        let size = txn.size();
        if size == 0 {
            txn.done(0);
            return;
        }

        let step = (self.master.max_access().max(1) as usize).min(size);
        let pieces = size.div_ceil(step);
        if pieces > 1 {
            debug!(hub = %self.master.name(), id = txn.id(), pieces, "Transaction split");
        }

        let group = SubGroup::new(Arc::clone(&txn), pieces);
        for index in 0..pieces {
            let offset = index * step;
            let len = step.min(size - offset);
            if let Err(e) = self.piece(&group, &txn, offset, len) {
                warn!(
                    hub = %self.master.name(),
                    id = txn.id(),
                    address = format_args!("{:#x}", txn.address()),
                    error = %e,
                    "Hub forward failed"
                );
                // Pieces already issued still report; the rest never will
                group.abandon(pieces - index, MemoryError::Address.code());
                return;
            }
        }
    }

    fn min_access(&self) -> u32 {
        self.master.min_access()
    }

    fn max_access(&self) -> u32 {
        self.master.max_access()
    }

    fn address(&self) -> u64 {
        self.offset.saturating_add(self.master.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Emulate, TransactionType};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Log(Mutex<Vec<(u64, usize)>>);

    impl MemorySlave for Log {
        fn do_transaction(&self, txn: Arc<Transaction>) {
            self.0.lock().push((txn.address(), txn.size()));
            txn.done(0);
        }
    }

    #[test]
    fn test_offset_applied() {
        let hub = Arc::new(Hub::new("hub", 0x1000));
        let log = Arc::new(Log::default());
        hub.add_slave(log.clone());

        let top = MemoryMaster::new("top");
        top.add_slave(hub.clone());
        top.write(0x20, &[0; 4]).unwrap();

        assert_eq!(*log.0.lock(), vec![(0x1020, 4)]);
    }

    #[test]
    fn test_large_transaction_split() {
        let hub = Arc::new(Hub::new("hub", 0));
        let log = Arc::new(Log::default());
        hub.add_slave(log.clone());

        let top = MemoryMaster::new("top");
        top.add_slave(hub.clone());
        let id = top
            .req_transaction(0x100, vec![0; 12], TransactionType::Write)
            .unwrap();
        top.wait_transaction(id).unwrap();

        assert_eq!(*log.0.lock(), vec![(0x100, 4), (0x104, 4), (0x108, 4)]);
    }

    #[test]
    fn test_split_read_reassembles() {
        let emulate = Arc::new(Emulate::new(4, 4));
        let hub = Arc::new(Hub::new("hub", 0x4000));
        hub.add_slave(emulate.clone());

        let direct = MemoryMaster::new("direct");
        direct.add_slave(emulate);
        direct.write(0x4000, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let top = MemoryMaster::new("top");
        top.add_slave(hub);
        assert_eq!(top.read(0, 8).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_child_error_propagates() {
        struct Fails;
        impl MemorySlave for Fails {
            fn do_transaction(&self, txn: Arc<Transaction>) {
                if txn.address() >= 4 {
                    txn.error(MemoryError::AxiTimeout);
                } else {
                    txn.done(0);
                }
            }
        }

        let hub = Arc::new(Hub::new("hub", 0));
        hub.add_slave(Arc::new(Fails));
        let top = MemoryMaster::new("top");
        top.add_slave(hub);

        let err = top.write(0, &[0; 12]).unwrap_err();
        assert_eq!(err.memory_code(), Some(MemoryError::AxiTimeout.code()));
    }

    #[test]
    fn test_address_overflow_is_address_error() {
        let hub = Arc::new(Hub::new("high", u64::MAX - 3));
        let log = Arc::new(Log::default());
        hub.add_slave(log.clone());
        let top = MemoryMaster::new("top");
        top.add_slave(hub);

        let err = top.write(8, &[0; 4]).unwrap_err();
        assert_eq!(err.memory_code(), Some(MemoryError::Address.code()));
        assert!(log.0.lock().is_empty());

        // The last word below the limit still maps
        top.write(0, &[0; 4]).unwrap();
        assert_eq!(*log.0.lock(), vec![(u64::MAX - 3, 4)]);
    }

    #[test]
    fn test_forward_does_not_wait_for_children() {
        #[derive(Default)]
        struct Held(Mutex<Vec<Arc<Transaction>>>);
        impl MemorySlave for Held {
            fn do_transaction(&self, txn: Arc<Transaction>) {
                self.0.lock().push(txn);
            }
        }

        let held = Arc::new(Held::default());
        let hub = Hub::new("hub", 0);
        hub.add_slave(held.clone());

        let parent = Transaction::new(0, vec![0; 8], TransactionType::Write, Duration::from_secs(5));
        parent.start();
        hub.do_transaction(Arc::clone(&parent));
        assert!(!parent.is_done());

        let children: Vec<_> = held.0.lock().drain(..).collect();
        assert_eq!(children.len(), 2);
        children[0].done(0);
        assert!(!parent.is_done());
        children[1].done(0);
        assert_eq!(parent.wait(), 0);
    }
}
