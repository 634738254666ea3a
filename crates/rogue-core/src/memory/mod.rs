//! Memory-transaction graph: register reads and writes with deadlines.
//!
//! A [`MemoryMaster`] issues [`Transaction`]s to one [`MemorySlave`]. Slaves
//! complete them with a result code, possibly from another thread; the
//! master's waits surface non-zero codes as [`RogueError::Memory`].
//!
//! [`RogueError::Memory`]: crate::RogueError::Memory

mod emulate;
mod hub;
mod master;
mod slave;
mod transaction;

pub use crate::error::{
    MemoryError, ADDRESS_ERROR, AXI_FAIL, AXI_TIMEOUT, TIMEOUT_ERROR, VERIFY_ERROR,
};
pub use emulate::Emulate;
pub use hub::Hub;
pub use master::{MemoryMaster, DEFAULT_TIMEOUT};
pub use slave::MemorySlave;
pub use transaction::{Transaction, TransactionLock, TransactionType};
