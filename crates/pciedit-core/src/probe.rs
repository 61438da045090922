//! Empirical writable-bit probing.

use tracing::{debug, warn};

use crate::access::{AccessWidth, ConfigAccess, CONFIG_SPACE_SIZE};
use crate::error::ProbeError;
use crate::Bdf;

/// Lowest offset the probe engine will touch.
///
/// Everything below covers standard header fields where a complement write
/// has immediate side effects, so the window applies regardless of the write
/// policy or the dangerous-write unlock.
pub const PROBE_WINDOW_START: u16 = 0x40;

/// Raw measurements from one probe sequence. Transient, scoped to the call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProbeReport {
    pub bdf: Bdf,
    pub offset: u8,
    pub width: AccessWidth,
    /// Register value before the probe.
    pub old: u32,
    /// The complement pattern that was written.
    pub test: u32,
    /// What the register held after the test write.
    pub read_back: u32,
    /// Bits that responded to the write (`old ^ read_back`).
    pub writable_mask: u32,
}

impl ProbeReport {
    /// How the register responded to the complement write.
    pub fn verdict(&self) -> ProbeVerdict {
        if self.writable_mask == 0 {
            ProbeVerdict::ReadOnly
        } else if self.read_back == self.test {
            ProbeVerdict::FullyWritable
        } else {
            ProbeVerdict::PartiallyWritable
        }
    }
}

/// Caller-facing interpretation of a [`ProbeReport`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProbeVerdict {
    /// No bit changed: effectively read-only, or the write was ignored.
    ReadOnly,
    /// The readback matched the test pattern exactly.
    FullyWritable,
    /// Only the bits in the writable mask responded.
    PartiallyWritable,
}

impl core::fmt::Display for ProbeVerdict {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "likely read-only or write ignored",
            Self::FullyWritable => "fully read/write",
            Self::PartiallyWritable => "masked read/write: only mask bits respond",
        })
    }
}

/// Measures which bits at `offset` respond to writes.
///
/// Sequence: read the current value, write its bitwise complement, read
/// back, then restore the original value. The restore is best-effort: once
/// the test write has landed, the original value is written back even when
/// the readback failed, and a failed restore is logged rather than surfaced
/// (only the original read/write/readback status is returned).
///
/// Offsets are aligned down first and must fall inside
/// [`PROBE_WINDOW_START`, 0x100); anything else is rejected without touching
/// the fabric.
pub fn probe<B: ConfigAccess + ?Sized>(
    bus: &mut B,
    bdf: Bdf,
    offset: u16,
    width: AccessWidth,
) -> Result<ProbeReport, ProbeError> {
    let offset = width.align(offset);
    if !(PROBE_WINDOW_START..CONFIG_SPACE_SIZE as u16).contains(&offset) {
        return Err(ProbeError::Rejected { offset });
    }
    let offset = offset as u8;

    let old = bus.read(bdf, offset, width)?;
    let test = width.truncate(!old);
    bus.write(bdf, offset, width, test)?;

    let read_back = bus.read(bdf, offset, width);

    // The test pattern is on the register now; put the old value back before
    // inspecting the readback result.
    if let Err(restore) = bus.write(bdf, offset, width, old) {
        warn!(%bdf, offset, "best-effort probe restore failed: {restore}");
    }

    let read_back = read_back?;
    let report = ProbeReport {
        bdf,
        offset,
        width,
        old,
        test,
        read_back,
        writable_mask: old ^ read_back,
    };
    debug!(
        %bdf,
        offset,
        mask = report.writable_mask,
        "probe complete"
    );
    Ok(report)
}
