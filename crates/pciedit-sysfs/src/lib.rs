#![forbid(unsafe_code)]

//! Linux sysfs backend for the configuration fabric.
//!
//! The kernel exposes each function's config space as
//! `/sys/bus/pci/devices/<dddd:bb:dd.f>/config`. This backend maps
//! [`ConfigAccess`] onto positioned I/O against those files: reads are
//! unprivileged, writes require root (the platform's policy, not ours). An
//! absent device node surfaces as a [`FabricError`], which the enumerator
//! interprets as function-absent.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use pciedit_core::{AccessWidth, Bdf, ConfigAccess, FabricError, FabricOp};
use tracing::trace;

/// [`ConfigAccess`] over the kernel's per-function `config` files.
pub struct SysfsBus {
    root: PathBuf,
    domain: u16,
}

impl SysfsBus {
    /// Default sysfs location of PCI device nodes.
    pub const DEFAULT_ROOT: &'static str = "/sys/bus/pci/devices";

    pub fn new() -> Self {
        Self::with_root(Self::DEFAULT_ROOT)
    }

    /// Uses a different device-node directory (tests, chroots).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            domain: 0,
        }
    }

    /// Selects the PCI domain (segment) the bus addresses live in.
    pub fn domain(mut self, domain: u16) -> Self {
        self.domain = domain;
        self
    }

    fn config_path(&self, bdf: Bdf) -> PathBuf {
        self.root
            .join(format!(
                "{:04x}:{:02x}:{:02x}.{:x}",
                self.domain, bdf.bus, bdf.device, bdf.function
            ))
            .join("config")
    }

    fn open(&self, bdf: Bdf, writable: bool) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(writable)
            .open(self.config_path(bdf))
    }
}

impl Default for SysfsBus {
    fn default() -> Self {
        Self::new()
    }
}

fn fabric_error(
    op: FabricOp,
    bdf: Bdf,
    offset: u8,
    width: AccessWidth,
    err: &io::Error,
) -> FabricError {
    FabricError {
        op,
        bdf,
        offset,
        width,
        detail: err.to_string(),
    }
}

impl ConfigAccess for SysfsBus {
    fn read(&mut self, bdf: Bdf, offset: u8, width: AccessWidth) -> Result<u32, FabricError> {
        let len = width.bytes() as usize;
        let mut buf = [0u8; 4];

        self.open(bdf, false)
            .and_then(|file| file.read_exact_at(&mut buf[..len], u64::from(offset)))
            .map_err(|err| fabric_error(FabricOp::Read, bdf, offset, width, &err))?;

        // Unfilled upper bytes stay zero, so one LE decode fits every width.
        let value = u32::from_le_bytes(buf);
        trace!(%bdf, offset, value, "sysfs config read");
        Ok(value)
    }

    fn write(
        &mut self,
        bdf: Bdf,
        offset: u8,
        width: AccessWidth,
        value: u32,
    ) -> Result<(), FabricError> {
        let len = width.bytes() as usize;
        let bytes = value.to_le_bytes();

        self.open(bdf, true)
            .and_then(|file| file.write_all_at(&bytes[..len], u64::from(offset)))
            .map_err(|err| fabric_error(FabricOp::Write, bdf, offset, width, &err))?;

        trace!(%bdf, offset, value, "sysfs config write");
        Ok(())
    }
}
