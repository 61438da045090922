use pciedit_core::testing::MemBus;
use pciedit_core::{
    write_register, AccessWidth, Bdf, BlockReason, Safety, WriteDecision, WriteError,
};

const BDF: Bdf = Bdf::new(0, 3, 0);

const UNLOCKED: Safety = Safety {
    unlock_dangerous: true,
};

fn bus_with_function() -> MemBus {
    let mut bus = MemBus::new();
    bus.add_function(BDF, 0x8086, 0x100E);
    bus
}

#[test]
fn standard_read_only_fields_deny_without_fabric_io() {
    let mut bus = bus_with_function();

    for offset in [0x00, 0x01, 0x02, 0x03, 0x08, 0x09, 0x0A, 0x0B, 0x0E] {
        for width in [AccessWidth::Byte, AccessWidth::Word, AccessWidth::Dword] {
            let err = write_register(&mut bus, BDF, offset, width, 0xFFFF_FFFF, Safety::default())
                .unwrap_err();
            assert_eq!(
                err,
                WriteError::AccessDenied(BlockReason::ReadOnly),
                "offset {offset:#04x} width {width}"
            );
        }
    }

    assert_eq!(bus.read_count(), 0);
    assert_eq!(bus.write_count(), 0);
}

#[test]
fn dangerous_areas_require_the_unlock() {
    let mut bus = bus_with_function();

    let err =
        write_register(&mut bus, BDF, 0x10, AccessWidth::Dword, 0xE000_0000, Safety::default())
            .unwrap_err();
    assert_eq!(err, WriteError::AccessDenied(BlockReason::DangerousBar));

    let err = write_register(&mut bus, BDF, 0x40, AccessWidth::Dword, 0, Safety::default())
        .unwrap_err();
    assert_eq!(err, WriteError::AccessDenied(BlockReason::DangerousCap));

    // Blocked means blocked before any I/O.
    assert_eq!(bus.read_count(), 0);
    assert_eq!(bus.write_count(), 0);

    // Unlocked dangerous areas get plain raw writes, no masking.
    let report =
        write_register(&mut bus, BDF, 0x10, AccessWidth::Dword, 0xE000_0000, UNLOCKED).unwrap();
    assert_eq!(report.decision, WriteDecision::Raw(0xE000_0000));
    assert_eq!(report.read_back, 0xE000_0000);
    assert!(!report.readback_mismatch());
}

#[test]
fn readback_mismatch_is_a_warning_not_a_failure() {
    let mut bus = MemBus::new();
    let space = bus.add_function(BDF, 0x8086, 0x100E);
    // BAR0 with a hardwired low bit, as on a real I/O BAR.
    space.set_writable_mask(0x10, 0xFE);

    let report =
        write_register(&mut bus, BDF, 0x10, AccessWidth::Dword, 0xE000_0001, UNLOCKED).unwrap();
    assert_eq!(report.issued, 0xE000_0001);
    assert_eq!(report.read_back, 0xE000_0000);
    assert!(report.readback_mismatch());
}

#[test]
fn command_word_writes_are_masked_read_modify_write() {
    let mut bus = MemBus::new();
    let space = bus.add_function(BDF, 0x8086, 0x100E);
    // Parity-error-response and SERR-enable set by firmware; neither is in
    // the RMW mask and both must survive untouched.
    space.set_u16(0x04, 0x0140);

    let report =
        write_register(&mut bus, BDF, 0x04, AccessWidth::Word, 0xFFFF, Safety::default()).unwrap();
    assert_eq!(report.previous, Some(0x0140));
    assert_eq!(report.issued, 0x0547);
    assert_eq!(
        report.decision,
        WriteDecision::MaskedRmw {
            mask: 0x0407,
            value: 0x0547,
        }
    );
    assert_eq!(bus.space(BDF).unwrap().u16_at(0x04), 0x0547);

    // Clearing the maskable bits leaves the preserved ones in place.
    let report =
        write_register(&mut bus, BDF, 0x04, AccessWidth::Word, 0x0000, Safety::default()).unwrap();
    assert_eq!(report.issued, 0x0140);
    assert_eq!(bus.space(BDF).unwrap().u16_at(0x04), 0x0140);
}

#[test]
fn command_register_byte_and_dword_accesses_stay_raw() {
    let mut bus = bus_with_function();

    let report =
        write_register(&mut bus, BDF, 0x04, AccessWidth::Byte, 0xFF, Safety::default()).unwrap();
    assert_eq!(report.decision, WriteDecision::Raw(0xFF));
}

#[test]
fn status_word_writes_issue_the_clear_mask_raw() {
    let mut bus = MemBus::new();
    let space = bus.add_function(BDF, 0x8086, 0x100E);
    // Status: low byte read-only, high byte carries RW1C error bits.
    space.set_u16(0x06, 0xC100);
    space.set_writable_mask(0x06, 0x00);
    space.set_rw1c_mask(0x07, 0xF9);

    let report =
        write_register(&mut bus, BDF, 0x06, AccessWidth::Word, 0x8000, Safety::default()).unwrap();
    assert_eq!(report.previous, Some(0xC100));
    // The engine must not transform the clear mask.
    assert_eq!(report.decision, WriteDecision::ClearMask(0x8000));
    assert_eq!(report.issued, 0x8000);
    // Bit 15 cleared, everything else untouched.
    assert_eq!(report.read_back, 0x4100);
    assert_eq!(bus.space(BDF).unwrap().u16_at(0x06), 0x4100);
    // Expected for RW1C; reported, never escalated.
    assert!(report.readback_mismatch());
}

#[test]
fn unaligned_offsets_round_down_before_any_access() {
    let mut bus = bus_with_function();

    let report = write_register(
        &mut bus,
        BDF,
        0x2D,
        AccessWidth::Dword,
        0x1122_3344,
        Safety::default(),
    )
    .unwrap();
    assert_eq!(report.offset, 0x2C);
    assert_eq!(bus.space(BDF).unwrap().u32_at(0x2C), 0x1122_3344);
}

#[test]
fn values_are_truncated_to_the_access_width() {
    let mut bus = bus_with_function();

    let report =
        write_register(&mut bus, BDF, 0x0C, AccessWidth::Byte, 0xABCD, Safety::default()).unwrap();
    assert_eq!(report.requested, 0xCD);
    assert_eq!(report.issued, 0xCD);
}

#[test]
fn fabric_write_failures_propagate_without_retry_or_verification() {
    let mut bus = bus_with_function();
    bus.fail_writes_after(BDF, 0x0C, 0);

    let err = write_register(&mut bus, BDF, 0x0C, AccessWidth::Byte, 0xAA, Safety::default())
        .unwrap_err();
    assert!(matches!(err, WriteError::Fabric(_)));
    // One attempt, no retry, and no verification read after a failed write.
    assert_eq!(bus.write_count(), 1);
    assert_eq!(bus.read_count(), 0);
}
