#![forbid(unsafe_code)]

//! Core engines for `pciedit`: enumeration of PCI functions, the
//! config-space write-safety policy, the empirical writable-bit prober, the
//! write engine with post-write verification, and the interactive editing
//! session state machine.
//!
//! All fabric I/O flows through [`ConfigAccess`]; nothing in this crate
//! touches hardware directly.

use std::fmt;
use std::str::FromStr;

pub mod access;
pub mod enumerate;
pub mod error;
pub mod policy;
pub mod probe;
pub mod session;
pub mod testing;
pub mod write;

pub use access::{read_config_space, AccessWidth, ConfigAccess, CONFIG_SPACE_SIZE};
pub use enumerate::{scan, DeviceRecord, MAX_DEVICE_RECORDS};
pub use error::{BdfParseError, BlockReason, FabricError, FabricOp, ProbeError, WriteError};
pub use policy::{classify, CommandFlags, RegisterPolicy, Safety};
pub use probe::{probe, ProbeReport, ProbeVerdict, PROBE_WINDOW_START};
pub use session::{InputSource, KeyEvent, Notice, Session, SessionStatus, SessionView};
pub use write::{write_register, WriteDecision, WriteReport};

/// PCI bus/device/function identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Bdf {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl Bdf {
    /// Creates a new BDF.
    ///
    /// The caller is responsible for ensuring the values are within the PCI
    /// ranges: bus < 256, device < 32, function < 8.
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }
}

impl fmt::Display for Bdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{:x}", self.bus, self.device, self.function)
    }
}

impl FromStr for Bdf {
    type Err = BdfParseError;

    /// Parses the `bb:dd.f` form (hex, the shape `lspci` prints).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || BdfParseError {
            input: s.to_owned(),
        };

        let (bus, rest) = s.split_once(':').ok_or_else(err)?;
        let (device, function) = rest.split_once('.').ok_or_else(err)?;

        let bus = u8::from_str_radix(bus, 16).map_err(|_| err())?;
        let device = u8::from_str_radix(device, 16).map_err(|_| err())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| err())?;

        if device >= 32 || function >= 8 {
            return Err(err());
        }

        Ok(Self::new(bus, device, function))
    }
}

impl core::cmp::Ord for Bdf {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.bus, self.device, self.function).cmp(&(other.bus, other.device, other.function))
    }
}

impl core::cmp::PartialOrd for Bdf {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
