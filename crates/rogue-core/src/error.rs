//! Error types for the streaming core.
//!
//! `RogueError` is the single error type returned by every fallible
//! operation in this crate. Pool failures convert into it with `?`, so a
//! failed allocation inside `req_frame` aborts the send.
//!
//! ## Error Categories
//!
//! - **Window violations** - `Boundary`, `Alignment`, `Buffer`
//!   - A programming or protocol error at the call site; never retried
//! - **Allocation** - `Alloc`, `Allocation`
//!   - `Alloc` is pool policy (cap reached), `Allocation` is an impossible
//!     request or a failing system allocator
//! - **Memory transactions** - `Memory`, `Timeout`
//!   - Carried by a transaction's terminal `done(code)` and surfaced by the
//!     initiator's wait
//! - **Setup** - `Open`, `Config`, `Figment`
//! - **Invariant violations** - `General`
//!
//! The numeric memory codes in [`MemoryError`] are part of the stable ABI:
//! protocol bridges embed them in status words.

use rogue_pool::PoolError;
use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the core error type.
pub type Result<T> = std::result::Result<T, RogueError>;

/// Deadline expired.
pub const TIMEOUT_ERROR: u32 = 0x0100_0000;
/// Readback did not match write.
pub const VERIFY_ERROR: u32 = 0x0200_0000;
/// Address out of range or misaligned.
pub const ADDRESS_ERROR: u32 = 0x0300_0000;
/// Downstream bus timed out.
pub const AXI_TIMEOUT: u32 = 0x0400_0000;
/// Downstream bus reported failure.
pub const AXI_FAIL: u32 = 0x0500_0000;

/// Result codes a memory transaction can terminate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryError {
    /// `0x01000000`: deadline expired
    Timeout,
    /// `0x02000000`: readback did not match write
    Verify,
    /// `0x03000000`: address out of range / misaligned
    Address,
    /// `0x04000000`: downstream bus timed out
    AxiTimeout,
    /// `0x05000000`: downstream bus reported failure
    AxiFail,
    /// Any other non-zero code reported by a slave
    Other(u32),
}

impl MemoryError {
    /// Numeric code carried on the wire and in `done(code)`.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            MemoryError::Timeout => TIMEOUT_ERROR,
            MemoryError::Verify => VERIFY_ERROR,
            MemoryError::Address => ADDRESS_ERROR,
            MemoryError::AxiTimeout => AXI_TIMEOUT,
            MemoryError::AxiFail => AXI_FAIL,
            MemoryError::Other(code) => code,
        }
    }

    /// Decode a result code. `0` (success) yields `None`.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => None,
            TIMEOUT_ERROR => Some(MemoryError::Timeout),
            VERIFY_ERROR => Some(MemoryError::Verify),
            ADDRESS_ERROR => Some(MemoryError::Address),
            AXI_TIMEOUT => Some(MemoryError::AxiTimeout),
            AXI_FAIL => Some(MemoryError::AxiFail),
            other => Some(MemoryError::Other(other)),
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MemoryError::Timeout => "TimeoutError",
            MemoryError::Verify => "VerifyError",
            MemoryError::Address => "AddressError",
            MemoryError::AxiTimeout => "AxiTimeout",
            MemoryError::AxiFail => "AxiFail",
            MemoryError::Other(_) => "MemoryError",
        };
        write!(f, "{} ({:#010x})", label, self.code())
    }
}

/// Primary error type for the streaming core.
#[derive(Error, Debug)]
pub enum RogueError {
    /// A buffer, frame or transaction window was violated by an index or size.
    #[error("Boundary error in {context}: requested {requested}, limit {limit}")]
    Boundary {
        /// Operation that was refused
        context: &'static str,
        /// Offset or size asked for
        requested: usize,
        /// Largest value allowed
        limit: usize,
    },

    /// Address or size not aligned for a memory operation.
    #[error("Alignment error: address {address:#x} size {size} not aligned to {min_access} bytes")]
    Alignment {
        /// Requested address
        address: u64,
        /// Requested size in bytes
        size: usize,
        /// Alignment the slave requires
        min_access: u32,
    },

    /// A pool could not satisfy a request within its policy.
    #[error("Alloc error: {0}")]
    Alloc(String),

    /// System-level allocation failed or the request can never be met.
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Request exceeds the maximum single-buffer payload.
    #[error("Buffer error: requested {size} bytes, single buffer limit is {max}")]
    Buffer {
        /// Requested bytes
        size: usize,
        /// Single-buffer capacity
        max: usize,
    },

    /// A memory transaction terminated with a non-zero code.
    #[error("Memory transaction {id} at {address:#x} failed: {code}")]
    Memory {
        /// Transaction id
        id: u32,
        /// Transaction address
        address: u64,
        /// Terminal code
        code: MemoryError,
    },

    /// Device or file open failure, raised by consumer modules.
    #[error("Open error: {0}")]
    Open(String),

    /// A deadline expired.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invariant violation indicating a programming mistake.
    #[error("General error: {0}")]
    General(String),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Config(String),

    /// Configuration could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Figment(Box<figment::Error>),
}

impl RogueError {
    /// Boundary error helper.
    pub(crate) fn boundary(context: &'static str, requested: usize, limit: usize) -> Self {
        RogueError::Boundary {
            context,
            requested,
            limit,
        }
    }

    /// The numeric memory code, when this is a memory error.
    #[must_use]
    pub fn memory_code(&self) -> Option<u32> {
        match self {
            RogueError::Memory { code, .. } => Some(code.code()),
            _ => None,
        }
    }
}

impl From<PoolError> for RogueError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Alloc { .. } => RogueError::Alloc(err.to_string()),
            PoolError::Allocation { .. } => RogueError::Allocation(err.to_string()),
        }
    }
}

impl From<figment::Error> for RogueError {
    fn from(err: figment::Error) -> Self {
        RogueError::Figment(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_codes_are_stable() {
        assert_eq!(MemoryError::Timeout.code(), 0x0100_0000);
        assert_eq!(MemoryError::Verify.code(), 0x0200_0000);
        assert_eq!(MemoryError::Address.code(), 0x0300_0000);
        assert_eq!(MemoryError::AxiTimeout.code(), 0x0400_0000);
        assert_eq!(MemoryError::AxiFail.code(), 0x0500_0000);
    }

    #[test]
    fn test_memory_code_decoding() {
        assert_eq!(MemoryError::from_code(0), None);
        assert_eq!(MemoryError::from_code(AXI_FAIL), Some(MemoryError::AxiFail));
        assert_eq!(MemoryError::from_code(7), Some(MemoryError::Other(7)));
        assert_eq!(MemoryError::Other(7).code(), 7);
    }

    #[test]
    fn test_memory_error_display() {
        assert_eq!(
            MemoryError::Timeout.to_string(),
            "TimeoutError (0x01000000)"
        );
    }

    #[test]
    fn test_pool_error_conversion() {
        let err: RogueError = PoolError::Alloc {
            pool: "p".into(),
            in_use: 4,
            hard_cap: 4,
        }
        .into();
        assert!(matches!(err, RogueError::Alloc(_)));

        let err: RogueError = PoolError::Allocation {
            pool: "p".into(),
            size: 10,
            reason: "too big".into(),
        }
        .into();
        assert!(matches!(err, RogueError::Allocation(msg) if msg.contains("too big")));
    }

    #[test]
    fn test_memory_code_accessor() {
        let err = RogueError::Memory {
            id: 3,
            address: 0x1000,
            code: MemoryError::Verify,
        };
        assert_eq!(err.memory_code(), Some(VERIFY_ERROR));
        assert_eq!(RogueError::General("x".into()).memory_code(), None);
    }
}
