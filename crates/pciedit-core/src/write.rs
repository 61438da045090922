//! The write engine: policy-checked transforms with post-write verification.

use tracing::debug;

use crate::access::{AccessWidth, ConfigAccess};
use crate::error::{BlockReason, WriteError};
use crate::policy::{classify, CommandFlags, RegisterPolicy, Safety};
use crate::Bdf;

/// Transform chosen for one write attempt. Produced per attempt, never
/// persisted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteDecision {
    /// Refused by policy; no fabric I/O happens.
    Blocked(BlockReason),
    /// The caller's value goes to the fabric unmodified.
    Raw(u32),
    /// Masked read-modify-write; `value` is the final word computed from the
    /// prior register value and the caller's input.
    MaskedRmw { mask: u32, value: u32 },
    /// The caller's bits are issued raw and hardware interprets set bits as
    /// a clear mask (RW1C). No transform is applied.
    ClearMask(u32),
}

/// Outcome of a write that reached the fabric.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriteReport {
    pub bdf: Bdf,
    pub offset: u8,
    pub width: AccessWidth,
    /// The caller's value, truncated to the access width.
    pub requested: u32,
    /// Register value read before the write (RMW and RW1C paths only).
    pub previous: Option<u32>,
    /// The value actually issued on the fabric.
    pub issued: u32,
    /// Verification read performed after the write.
    pub read_back: u32,
    pub decision: WriteDecision,
}

impl WriteReport {
    /// Whether the verification read differs from the issued value.
    ///
    /// A mismatch is a warning, not a failure: RW1C bits, read-only bit
    /// masking, and reserved-bit suppression all legitimately change what
    /// reads back.
    pub fn readback_mismatch(&self) -> bool {
        self.read_back != self.issued
    }
}

/// Applies `value` at `(bdf, offset, width)` under the write policy.
///
/// The offset is aligned down to the width first. Blocked attempts fail with
/// [`WriteError::AccessDenied`] before any fabric I/O. Successful writes are
/// always followed by a verification read at the same address and width;
/// mismatches are recorded on the report and never retried or escalated.
pub fn write_register<B: ConfigAccess + ?Sized>(
    bus: &mut B,
    bdf: Bdf,
    offset: u8,
    width: AccessWidth,
    value: u32,
    safety: Safety,
) -> Result<WriteReport, WriteError> {
    let offset = width.align(offset as u16) as u8;
    let value = width.truncate(value);

    let (decision, previous) = match classify(offset as u16, width) {
        RegisterPolicy::ReadOnly => (WriteDecision::Blocked(BlockReason::ReadOnly), None),
        RegisterPolicy::DangerousBar if !safety.unlock_dangerous => {
            (WriteDecision::Blocked(BlockReason::DangerousBar), None)
        }
        RegisterPolicy::DangerousCap if !safety.unlock_dangerous => {
            (WriteDecision::Blocked(BlockReason::DangerousCap), None)
        }
        // Unlocked dangerous areas get plain raw writes, no masking.
        RegisterPolicy::DangerousBar | RegisterPolicy::DangerousCap | RegisterPolicy::Direct => {
            (WriteDecision::Raw(value), None)
        }
        RegisterPolicy::ClearOnWrite => {
            // The prior status value is read for reporting only; the clear
            // mask itself is issued untransformed.
            let before = bus.read(bdf, offset, width)?;
            (WriteDecision::ClearMask(value), Some(before))
        }
        RegisterPolicy::CommandRmw => {
            let old = bus.read(bdf, offset, width)?;
            let mask = u32::from(CommandFlags::all().bits());
            let merged = (old & !mask) | (value & mask);
            (WriteDecision::MaskedRmw { mask, value: merged }, Some(old))
        }
    };

    let issued = match decision {
        WriteDecision::Blocked(reason) => return Err(WriteError::AccessDenied(reason)),
        WriteDecision::Raw(v) | WriteDecision::ClearMask(v) => v,
        WriteDecision::MaskedRmw { value: v, .. } => v,
    };

    bus.write(bdf, offset, width, issued)?;
    let read_back = bus.read(bdf, offset, width)?;
    if read_back != issued {
        debug!(
            %bdf,
            offset,
            issued,
            read_back,
            "readback mismatch (RW1C, read-only or reserved bits)"
        );
    }

    Ok(WriteReport {
        bdf,
        offset,
        width,
        requested: value,
        previous,
        issued,
        read_back,
        decision,
    })
}
