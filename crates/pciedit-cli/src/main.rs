#![forbid(unsafe_code)]

//! `pciedit`: scriptable front-end for the config-space engines.
//!
//! One-shot subcommands over the sysfs backend; the interactive session
//! state machine lives in `pciedit-core` for front-ends with a real key
//! source.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pciedit_core::{
    probe, read_config_space, scan, write_register, AccessWidth, Bdf, ConfigAccess, Safety,
    WriteDecision,
};
use pciedit_sysfs::SysfsBus;

#[derive(Debug, Parser)]
#[command(about = "Inspect and mutate PCI configuration space", version)]
struct Args {
    /// Directory holding the kernel's per-device PCI nodes.
    #[arg(long, default_value = SysfsBus::DEFAULT_ROOT)]
    sysfs_root: PathBuf,

    /// PCI domain (segment) the bus addresses live in.
    #[arg(long, default_value_t = 0)]
    domain: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan the whole bus space and list discovered functions.
    List,

    /// Hex-dump a function's 256-byte configuration space.
    Dump {
        bdf: Bdf,

        #[arg(long, value_enum, default_value_t = WidthArg::Dword)]
        width: WidthArg,
    },

    /// Read one register (hex offset, rounded down to the width).
    Read {
        bdf: Bdf,

        #[arg(value_parser = parse_hex_offset)]
        offset: u8,

        #[arg(long, value_enum, default_value_t = WidthArg::Dword)]
        width: WidthArg,
    },

    /// Write one register through the safety policy.
    Write {
        bdf: Bdf,

        #[arg(value_parser = parse_hex_offset)]
        offset: u8,

        #[arg(value_parser = parse_hex_value)]
        value: u32,

        #[arg(long, value_enum, default_value_t = WidthArg::Dword)]
        width: WidthArg,

        /// Allow writes to the BARs and the capability area.
        #[arg(long)]
        unlock_dangerous: bool,
    },

    /// Empirically measure which bits of a register respond to writes.
    Probe {
        bdf: Bdf,

        #[arg(value_parser = parse_hex_probe_offset)]
        offset: u16,

        #[arg(long, value_enum, default_value_t = WidthArg::Dword)]
        width: WidthArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WidthArg {
    Byte,
    Word,
    Dword,
}

impl From<WidthArg> for AccessWidth {
    fn from(value: WidthArg) -> Self {
        match value {
            WidthArg::Byte => AccessWidth::Byte,
            WidthArg::Word => AccessWidth::Word,
            WidthArg::Dword => AccessWidth::Dword,
        }
    }
}

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|err| format!("invalid hex value `{s}`: {err}"))
}

fn parse_hex_value(s: &str) -> Result<u32, String> {
    parse_hex(s)
}

fn parse_hex_offset(s: &str) -> Result<u8, String> {
    let value = parse_hex(s)?;
    u8::try_from(value).map_err(|_| format!("offset {value:#x} out of range (00-ff)"))
}

fn parse_hex_probe_offset(s: &str) -> Result<u16, String> {
    let value = parse_hex(s)?;
    u16::try_from(value).map_err(|_| format!("offset {value:#x} out of range"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Args {
        sysfs_root,
        domain,
        command,
    } = Args::parse();
    let mut bus = SysfsBus::with_root(sysfs_root).domain(domain);

    match command {
        Command::List => cmd_list(&mut bus),
        Command::Dump { bdf, width } => cmd_dump(&mut bus, bdf, width.into()),
        Command::Read { bdf, offset, width } => cmd_read(&mut bus, bdf, offset, width.into()),
        Command::Write {
            bdf,
            offset,
            value,
            width,
            unlock_dangerous,
        } => cmd_write(
            &mut bus,
            bdf,
            offset,
            value,
            width.into(),
            Safety { unlock_dangerous },
        ),
        Command::Probe { bdf, offset, width } => cmd_probe(&mut bus, bdf, offset, width.into()),
    }
}

fn cmd_list(bus: &mut SysfsBus) -> Result<()> {
    let records = scan(bus);
    if records.is_empty() {
        bail!("no PCI functions found");
    }

    println!("vendor  device  class     address");
    for record in &records {
        println!(
            "{:04x}    {:04x}    {:02x}{:02x}{:02x}    {}",
            record.vendor_id,
            record.device_id,
            record.base_class,
            record.sub_class,
            record.prog_if,
            record.bdf
        );
    }
    println!("{} function(s)", records.len());
    Ok(())
}

fn cmd_dump(bus: &mut SysfsBus, bdf: Bdf, width: AccessWidth) -> Result<()> {
    let space =
        read_config_space(bus, bdf).with_context(|| format!("reading config space of {bdf}"))?;
    let step = width.bytes() as usize;
    let digits = width.hex_digits();

    println!("config space of {bdf}");
    for row in (0..space.len()).step_by(16) {
        print!("{row:02x} ");
        for column in (0..16).step_by(step) {
            let mut value = 0u32;
            for i in 0..step {
                value |= u32::from(space[row + column + i]) << (8 * i);
            }
            print!(" {value:0digits$x}");
        }
        println!();
    }
    Ok(())
}

fn cmd_read(bus: &mut SysfsBus, bdf: Bdf, offset: u8, width: AccessWidth) -> Result<()> {
    let offset = width.align(u16::from(offset)) as u8;
    let value = bus.read(bdf, offset, width)?;
    let digits = width.hex_digits();
    println!("{bdf} {offset:#04x}: {value:0digits$x}");
    Ok(())
}

fn cmd_write(
    bus: &mut SysfsBus,
    bdf: Bdf,
    offset: u8,
    value: u32,
    width: AccessWidth,
    safety: Safety,
) -> Result<()> {
    let report = write_register(bus, bdf, offset, width, value, safety)
        .with_context(|| format!("writing {bdf} offset {offset:#04x}"))?;
    let digits = report.width.hex_digits();
    let previous = report.previous.unwrap_or_default();

    match report.decision {
        // Blocked attempts come back as errors above.
        WriteDecision::Blocked(reason) => bail!("write blocked: {reason}"),
        WriteDecision::Raw(_) => {
            println!(
                "wrote {:0digits$x} at {} offset {:#04x}",
                report.issued, report.bdf, report.offset
            );
            println!("read back: {:0digits$x}", report.read_back);
        }
        WriteDecision::MaskedRmw { mask, .. } => {
            println!(
                "command old: {previous:0digits$x}  input: {:0digits$x}  final (rmw, mask {mask:#06x}): {:0digits$x}",
                report.requested, report.issued
            );
            println!("read back: {:0digits$x}", report.read_back);
        }
        WriteDecision::ClearMask(_) => {
            println!(
                "status before: {previous:0digits$x}  clear mask: {:0digits$x}  after: {:0digits$x}",
                report.issued, report.read_back
            );
        }
    }

    // Expected on the RW1C path; everywhere else it is worth a note.
    if report.readback_mismatch() && !matches!(report.decision, WriteDecision::ClearMask(_)) {
        println!("NOTE: read-back mismatch (RW1C, read-only or reserved bits)");
    }
    Ok(())
}

fn cmd_probe(bus: &mut SysfsBus, bdf: Bdf, offset: u16, width: AccessWidth) -> Result<()> {
    let report = probe(bus, bdf, offset, width)
        .with_context(|| format!("probing {bdf} offset {offset:#04x}"))?;
    let digits = report.width.hex_digits();

    println!("old      : {:0digits$x}", report.old);
    println!("test (~) : {:0digits$x}", report.test);
    println!("read back: {:0digits$x}", report.read_back);
    println!("mask     : {:0digits$x}", report.writable_mask);
    println!("{}", report.verdict());
    Ok(())
}
