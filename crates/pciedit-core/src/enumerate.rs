//! Discovery walk over the 256x32x8 function space.

use tracing::{debug, trace};

use crate::access::{AccessWidth, ConfigAccess};
use crate::Bdf;

/// Cap on the number of records a scan returns.
///
/// Topologies that overflow it are silently truncated; this is an accepted
/// loss, not an error.
pub const MAX_DEVICE_RECORDS: usize = 4096;

const VENDOR_ID_OFFSET: u8 = 0x00;
const DEVICE_ID_OFFSET: u8 = 0x02;
const PROG_IF_OFFSET: u8 = 0x09;
const SUB_CLASS_OFFSET: u8 = 0x0A;
const BASE_CLASS_OFFSET: u8 = 0x0B;
const HEADER_TYPE_OFFSET: u8 = 0x0E;

const HEADER_TYPE_MULTIFUNCTION: u8 = 0x80;
const VENDOR_ID_ABSENT: u16 = 0xFFFF;

/// One discovered function. Immutable once recorded; the collection order is
/// the discovery order and the UI relies on it for stable indexing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceRecord {
    pub bdf: Bdf,
    pub vendor_id: u16,
    pub device_id: u16,
    pub base_class: u8,
    pub sub_class: u8,
    pub prog_if: u8,
}

/// Walks every (bus, device) pair and returns the functions that answered,
/// in ascending (bus, device, function) order.
///
/// Function 0 gates the device: if its vendor ID reads as 0xFFFF or the read
/// fails, functions 1-7 are not probed (a device that implements any
/// function implements function 0). Functions 1-7 are probed only when
/// function 0 reports the multifunction header-type bit.
pub fn scan<B: ConfigAccess + ?Sized>(bus: &mut B) -> Vec<DeviceRecord> {
    let mut records = Vec::new();

    for bus_nr in 0..=u8::MAX {
        for device in 0..32u8 {
            let Some(record) = read_function(bus, Bdf::new(bus_nr, device, 0)) else {
                continue;
            };
            push_capped(&mut records, record);

            if !is_multifunction(bus, record.bdf) {
                continue;
            }

            for function in 1..8u8 {
                if let Some(record) = read_function(bus, Bdf::new(bus_nr, device, function)) {
                    push_capped(&mut records, record);
                }
            }
        }
    }

    debug!(count = records.len(), "config-space scan complete");
    records
}

/// Reads one function's identity fields.
///
/// Any failed read treats the function as absent; enumeration never
/// escalates per-function fabric errors.
fn read_function<B: ConfigAccess + ?Sized>(bus: &mut B, bdf: Bdf) -> Option<DeviceRecord> {
    let vendor_id = bus.read(bdf, VENDOR_ID_OFFSET, AccessWidth::Word).ok()? as u16;
    if vendor_id == VENDOR_ID_ABSENT {
        return None;
    }

    let device_id = bus.read(bdf, DEVICE_ID_OFFSET, AccessWidth::Word).ok()? as u16;
    let prog_if = bus.read(bdf, PROG_IF_OFFSET, AccessWidth::Byte).ok()? as u8;
    let sub_class = bus.read(bdf, SUB_CLASS_OFFSET, AccessWidth::Byte).ok()? as u8;
    let base_class = bus.read(bdf, BASE_CLASS_OFFSET, AccessWidth::Byte).ok()? as u8;

    trace!(%bdf, vendor_id, device_id, "function present");

    Some(DeviceRecord {
        bdf,
        vendor_id,
        device_id,
        base_class,
        sub_class,
        prog_if,
    })
}

fn is_multifunction<B: ConfigAccess + ?Sized>(bus: &mut B, function0: Bdf) -> bool {
    // An unreadable header type is treated as single-function.
    bus.read(function0, HEADER_TYPE_OFFSET, AccessWidth::Byte)
        .map(|header| header as u8 & HEADER_TYPE_MULTIFUNCTION != 0)
        .unwrap_or(false)
}

fn push_capped(records: &mut Vec<DeviceRecord>, record: DeviceRecord) {
    if records.len() < MAX_DEVICE_RECORDS {
        records.push(record);
    } else {
        trace!(bdf = %record.bdf, "record cap reached, dropping function");
    }
}
