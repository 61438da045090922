//! Write-safety policy for the standard type-0 configuration header.

use bitflags::bitflags;

use crate::access::AccessWidth;

bitflags! {
    /// Command-register bits the masked read-modify-write path lets through.
    ///
    /// Everything else in the command word (reserved bits included) is
    /// preserved from the value read back before the write.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct CommandFlags: u16 {
        const IO_SPACE = 1 << 0;
        const MEMORY_SPACE = 1 << 1;
        const BUS_MASTER = 1 << 2;
        const INTX_DISABLE = 1 << 10;
    }
}

/// Safety switches for policy-sensitive operations.
///
/// Passed explicitly into every policy evaluation and write so the policy
/// stays a pure function of its inputs. A session starts locked.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Safety {
    pub unlock_dangerous: bool,
}

/// Classification of a write target, evaluated after alignment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegisterPolicy {
    /// Standard header field that is read-only by definition.
    ReadOnly,
    /// Plain register; the value goes to the fabric unmodified.
    Direct,
    /// Command register word: masked read-modify-write limited to
    /// [`CommandFlags`].
    CommandRmw,
    /// Status register word: bits set in the input clear the matching RW1C
    /// bits, they are not stored.
    ClearOnWrite,
    /// Base address registers; refused while dangerous writes are locked.
    DangerousBar,
    /// Capabilities pointer and capability area; refused while dangerous
    /// writes are locked.
    DangerousCap,
}

/// Classifies `(offset, width)` against the fixed type-0 header layout.
///
/// `offset` is rounded down to the width's alignment first, so e.g. a dword
/// access at 0x06 is judged as an access at 0x04. The boundaries are policy,
/// not discovered metadata, and are deliberately not derived from the device.
pub fn classify(offset: u16, width: AccessWidth) -> RegisterPolicy {
    let offset = width.align(offset);

    if offset < 0x04 {
        return RegisterPolicy::ReadOnly; // vendor/device ID
    }
    if (0x08..=0x0B).contains(&offset) {
        return RegisterPolicy::ReadOnly; // revision + class code
    }
    if offset == 0x0E {
        return RegisterPolicy::ReadOnly; // header type
    }
    if offset == 0x04 && width == AccessWidth::Word {
        return RegisterPolicy::CommandRmw;
    }
    if offset == 0x06 && width == AccessWidth::Word {
        return RegisterPolicy::ClearOnWrite;
    }
    if (0x10..=0x24).contains(&offset) {
        return RegisterPolicy::DangerousBar;
    }
    if offset >= 0x34 {
        return RegisterPolicy::DangerousCap;
    }

    RegisterPolicy::Direct
}

#[cfg(test)]
mod tests {
    use super::{classify, RegisterPolicy};
    use crate::access::AccessWidth;

    const WIDTHS: [AccessWidth; 3] = [AccessWidth::Byte, AccessWidth::Word, AccessWidth::Dword];

    #[test]
    fn standard_read_only_fields_block_at_every_width() {
        for offset in [0x00, 0x01, 0x02, 0x03, 0x08, 0x09, 0x0A, 0x0B, 0x0E] {
            for width in WIDTHS {
                assert_eq!(
                    classify(offset, width),
                    RegisterPolicy::ReadOnly,
                    "offset {offset:#04x} width {width}"
                );
            }
        }
    }

    #[test]
    fn status_register_is_rw1c_only_at_word_width() {
        assert_eq!(
            classify(0x06, AccessWidth::Word),
            RegisterPolicy::ClearOnWrite
        );
        // Byte stays at 0x06 but is not the status word; dword aligns down to
        // the command register.
        assert_eq!(classify(0x06, AccessWidth::Byte), RegisterPolicy::Direct);
        assert_eq!(classify(0x06, AccessWidth::Dword), RegisterPolicy::Direct);
    }

    #[test]
    fn command_register_word_is_masked_rmw() {
        assert_eq!(
            classify(0x04, AccessWidth::Word),
            RegisterPolicy::CommandRmw
        );
        // Unaligned word access in the command register rounds down into it.
        assert_eq!(
            classify(0x05, AccessWidth::Word),
            RegisterPolicy::CommandRmw
        );
        assert_eq!(classify(0x04, AccessWidth::Byte), RegisterPolicy::Direct);
        assert_eq!(classify(0x04, AccessWidth::Dword), RegisterPolicy::Direct);
    }

    #[test]
    fn bars_and_capability_area_are_dangerous() {
        for offset in [0x10, 0x14, 0x1B, 0x24] {
            for width in WIDTHS {
                assert_eq!(
                    classify(offset, width),
                    RegisterPolicy::DangerousBar,
                    "offset {offset:#04x} width {width}"
                );
            }
        }
        for offset in [0x34, 0x40, 0x80, 0xFF] {
            // Judged after alignment; all of these stay >= 0x34.
            for width in WIDTHS {
                assert_eq!(
                    classify(offset, width),
                    RegisterPolicy::DangerousCap,
                    "offset {offset:#04x} width {width}"
                );
            }
        }
    }

    #[test]
    fn remaining_header_fields_are_direct() {
        // Cache line size, latency timer, BIST, cardbus CIS, subsystem IDs,
        // expansion ROM gap bytes.
        for offset in [0x0C, 0x0D, 0x0F, 0x28, 0x2C, 0x30] {
            assert_eq!(
                classify(offset, AccessWidth::Byte),
                RegisterPolicy::Direct,
                "offset {offset:#04x}"
            );
        }
    }
}
