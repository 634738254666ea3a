//! Sparse in-memory register space.

use super::slave::MemorySlave;
use super::transaction::Transaction;
use crate::config::MemorySettings;
use crate::error::MemoryError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

const PAGE_SIZE: usize = 4096;

/// A memory slave backed by lazily allocated 4 KiB pages.
///
/// Unwritten addresses read as zero without allocating. `Verify` is served
/// like `Read`.
#[derive(Debug)]
pub struct Emulate {
    min_access: u32,
    max_access: u32,
    limit: Option<u64>,
    pages: Mutex<HashMap<u64, Box<[u8]>>>,
}

impl Emulate {
    /// Create an unbounded space with the given access sizes.
    #[must_use]
    pub fn new(min_access: u32, max_access: u32) -> Self {
        Self {
            min_access,
            max_access,
            limit: None,
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Create a space using the configured access sizes.
    #[must_use]
    pub fn from_settings(settings: &MemorySettings) -> Self {
        Self::new(settings.min_access, settings.max_access)
    }

    /// Reject accesses reaching `limit` or beyond with `AddressError`.
    #[must_use]
    pub fn with_size(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Bytes held in allocated pages.
    #[must_use]
    pub fn total_alloc(&self) -> usize {
        self.pages.lock().len() * PAGE_SIZE
    }

    fn in_range(&self, address: u64, size: usize) -> bool {
        let Some(end) = address.checked_add(size as u64) else {
            return false;
        };
        self.limit.map_or(true, |limit| end <= limit)
    }
}

impl MemorySlave for Emulate {
    fn do_transaction(&self, txn: Arc<Transaction>) {
        let address = txn.address();
        let size = txn.size();
        if !self.in_range(address, size) {
            debug!(address = format_args!("{address:#x}"), size, "Emulated access out of range");
            txn.error(MemoryError::Address);
            return;
        }

        {
            let mut pages = self.pages.lock();
            let mut data = txn.lock();
            let mut pos = 0;
            while pos < size {
                let absolute = address + pos as u64;
                let page = absolute / PAGE_SIZE as u64;
                let offset = (absolute % PAGE_SIZE as u64) as usize;
                let len = (PAGE_SIZE - offset).min(size - pos);

                if txn.kind().is_write() {
                    let memory = pages
                        .entry(page)
                        .or_insert_with(|| vec![0u8; PAGE_SIZE].into_boxed_slice());
                    memory[offset..offset + len].copy_from_slice(&data[pos..pos + len]);
                } else {
                    match pages.get(&page) {
                        Some(memory) => {
                            data[pos..pos + len].copy_from_slice(&memory[offset..offset + len]);
                        }
                        None => data[pos..pos + len].fill(0),
                    }
                }
                pos += len;
            }
        }

        trace!(id = txn.id(), kind = %txn.kind(), address, size, "Emulated access");
        txn.done(0);
    }

    fn min_access(&self) -> u32 {
        self.min_access
    }

    fn max_access(&self) -> u32 {
        self.max_access
    }
}
