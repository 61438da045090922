//! Error taxonomy for the core engines.

use std::fmt;

use thiserror::Error;

use crate::access::AccessWidth;
use crate::Bdf;

/// Direction of a failed fabric transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FabricOp {
    Read,
    Write,
}

impl fmt::Display for FabricOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// A configuration-fabric transfer that failed.
///
/// Fabric failures are reported once to the caller of the operation that
/// triggered them and never retried.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("config {op} ({width}) at {bdf} offset {offset:#04x} failed: {detail}")]
pub struct FabricError {
    pub op: FabricOp,
    pub bdf: Bdf,
    pub offset: u8,
    pub width: AccessWidth,
    pub detail: String,
}

/// Why the write policy refused an attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockReason {
    /// Read-only standard header field (IDs, class code, header type).
    ReadOnly,
    /// Base address registers (0x10-0x24).
    DangerousBar,
    /// Capabilities pointer and capability area (>= 0x34).
    DangerousCap,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "read-only standard header field",
            Self::DangerousBar => "base address registers; unlock dangerous writes to proceed",
            Self::DangerousCap => "capability area; unlock dangerous writes to proceed",
        })
    }
}

/// Failure modes of the write engine.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WriteError {
    /// The policy refused the write; no fabric I/O was performed.
    #[error("write blocked: {0}")]
    AccessDenied(BlockReason),

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

/// Failure modes of the probe engine.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProbeError {
    /// The aligned offset lies outside the safe probing window; the fabric
    /// was not touched.
    #[error("probe rejected: offset {offset:#04x} is outside the 0x40-0xff probe window")]
    Rejected { offset: u16 },

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

/// A string that failed to parse as a `bb:dd.f` address.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid PCI address `{input}` (expected hex bb:dd.f)")]
pub struct BdfParseError {
    pub(crate) input: String,
}
