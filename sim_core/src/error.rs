//! Error taxonomy.
//!
//! Only [`SimError::MalformedInstruction`] and [`SimError::OutOfMemory`] ever
//! leave this crate as an `Err`. The other two classes below exist purely to
//! give the `log::debug!` call sites in [`crate::mmu`] and [`crate::engine`]
//! a named shape; the engine absorbs them as no-ops rather than propagating
//! them, since a malformed trace mid-run is expected, not exceptional.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A line in an instruction file did not match the grammar.
    MalformedInstruction { line: usize, reason: String },
    /// An internal allocation could not be satisfied.
    OutOfMemory,
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::MalformedInstruction { line, reason } => {
                write!(f, "malformed instruction at line {line}: {reason}")
            }
            SimError::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for SimError {}

pub type Result<T> = std::result::Result<T, SimError>;

/// Runtime reference to an unknown or already-destroyed ptr/pid. Never
/// propagated; logged and absorbed by the caller as a no-op.
#[derive(Debug, Clone, Copy)]
pub enum InvalidReference {
    Ptr(u32),
    Pid(u32),
}

impl fmt::Display for InvalidReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReference::Ptr(id) => write!(f, "ptr {id} is unknown or already destroyed"),
            InvalidReference::Pid(id) => write!(f, "pid {id} is unknown or already killed"),
        }
    }
}

/// No frame could be produced for a page (only reachable with zero total
/// frames). The page stays swapped; logged and absorbed.
#[derive(Debug, Clone, Copy)]
pub struct FrameExhaustion;

impl fmt::Display for FrameExhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no frame available to satisfy allocation")
    }
}
