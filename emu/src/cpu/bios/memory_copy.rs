use crate::bitwise::Bits;
use crate::bus::Bus;

/// Reads past the cartridge return these instead of open bus.
const CPU_SET_OPEN_BUS: u32 = 0x1CAD_1CAD;
const CPU_FAST_SET_OPEN_BUS: u32 = 0xBAFF_FFFB;

/// The BIOS refuses to copy from itself.
pub const fn reads_bios(source: u32, length: u32) -> bool {
    source & 0x0E00_0000 == 0 || source.wrapping_add(length) & 0x0E00_0000 == 0
}

const fn copy_length(control: u32) -> u32 {
    ((control << 11) >> 9) & 0x1F_FFFF
}

/// CpuSet: `control` bits 0-20 count the units, bit 24 selects fill and
/// bit 26 selects words.
pub fn cpu_set(bus: &mut Bus, source: u32, destination: u32, control: u32) {
    if reads_bios(source, copy_length(control)) {
        return;
    }

    let count = control & 0x1F_FFFF;
    let fill = control.is_bit_on(24);

    if control.is_bit_on(26) {
        let mut source = source & !3;
        let mut destination = destination & !3;
        let read = |bus: &mut Bus, address: u32| {
            if address > 0x0EFF_FFFF {
                CPU_SET_OPEN_BUS
            } else {
                bus.read_word(address)
            }
        };

        let mut value = read(bus, source);
        for _ in 0..count {
            if !fill {
                value = read(bus, source);
                source = source.wrapping_add(4);
            }
            bus.write_word(destination, value);
            destination = destination.wrapping_add(4);
        }
    } else {
        let mut source = source & !1;
        let mut destination = destination & !1;
        let read = |bus: &mut Bus, address: u32| {
            if address > 0x0EFF_FFFF {
                CPU_SET_OPEN_BUS as u16
            } else {
                bus.read_half_word(address)
            }
        };

        let mut value = read(bus, source);
        for _ in 0..count {
            if !fill {
                value = read(bus, source);
                source = source.wrapping_add(2);
            }
            bus.write_half_word(destination, value);
            destination = destination.wrapping_add(2);
        }
    }
}

/// CpuFastSet: words only, in blocks of 8.
pub fn cpu_fast_set(bus: &mut Bus, source: u32, destination: u32, control: u32) {
    if reads_bios(source, copy_length(control)) {
        return;
    }

    let mut source = source & !3;
    let mut destination = destination & !3;
    let fill = control.is_bit_on(24);
    let read = |bus: &mut Bus, address: u32| {
        if address > 0x0EFF_FFFF {
            CPU_FAST_SET_OPEN_BUS
        } else {
            bus.read_word(address)
        }
    };

    let mut count = (control & 0x1F_FFFF) as i32;
    while count > 0 {
        let fill_value = read(bus, source);
        for _ in 0..8 {
            let value = if fill {
                fill_value
            } else {
                let value = read(bus, source);
                source = source.wrapping_add(4);
                value
            };
            bus.write_word(destination, value);
            destination = destination.wrapping_add(4);
        }
        count -= 8;
    }
}

/// BitUnPack: widens every `source_width`-bit field of the source to
/// `destination_width` bits, adding an offset, and packs the results in words.
///
/// ```text
///  header:  +0  u16  source length in bytes
///           +2  u8   source width (1, 2, 4, 8)
///           +3  u8   destination width (1, 2, 4, 8, 16, 32)
///           +4  u32  offset, bit 31: add it to zero fields too
/// ```
pub fn bit_unpack(bus: &mut Bus, source: u32, destination: u32, header: u32) {
    let length = bus.read_half_word(header & !1);
    if reads_bios(source, u32::from(length)) {
        return;
    }

    let source_width = u32::from(bus.read_byte(header.wrapping_add(2)));
    let destination_width = u32::from(bus.read_byte(header.wrapping_add(3)));
    let offset_word = bus.read_word(header.wrapping_add(4) & !3);
    let add_to_zero = offset_word.is_bit_on(31);
    let offset = offset_word & 0x7FFF_FFFF;

    if !matches!(source_width, 1 | 2 | 4 | 8) || destination_width == 0 || destination_width > 32 {
        tracing::debug!("BitUnPack with widths {source_width}/{destination_width} ignored");
        return;
    }

    let mut source = source;
    let mut destination = destination & !3;
    let mut packed = 0_u32;
    let mut written_bits = 0;

    for _ in 0..length {
        let byte = u32::from(bus.read_byte(source));
        source = source.wrapping_add(1);

        let mut mask = 0xFF >> (8 - source_width);
        for shift in (0..8).step_by(source_width as usize) {
            let field = byte & mask;
            let mut value = field >> shift;
            if field != 0 || add_to_zero {
                value = value.wrapping_add(offset);
            }
            packed |= value.wrapping_shl(written_bits);
            written_bits += destination_width;

            if written_bits >= 32 {
                bus.write_word(destination, packed);
                destination = destination.wrapping_add(4);
                packed = 0;
                written_bits = 0;
            }
            mask <<= source_width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_bios_source_refused() {
        assert!(reads_bios(0x0000_0100, 4));
        assert!(reads_bios(0x01FF_0000, 4));
        assert!(!reads_bios(0x0800_0000, 0x100));
        assert!(!reads_bios(0x0300_0000, 0x100));
    }

    #[test]
    fn check_cpu_set_word_fill() {
        let mut bus = Bus::default();
        bus.write_word(0x0300_0000, 0xDEAD_BEEF);
        cpu_set(&mut bus, 0x0300_0000, 0x0200_0000, (1 << 26) | (1 << 24) | 4);

        for i in 0..4 {
            assert_eq!(bus.read_word(0x0200_0000 + i * 4), 0xDEAD_BEEF);
        }
        assert_eq!(bus.read_word(0x0200_0010), 0);
    }

    #[test]
    fn check_cpu_set_half_word_copy() {
        let mut bus = Bus::default();
        for i in 0..3 {
            bus.write_half_word(0x0300_0000 + i * 2, 0x1110 + i as u16);
        }
        cpu_set(&mut bus, 0x0300_0001, 0x0200_0000, 3);

        assert_eq!(bus.read_half_word(0x0200_0000), 0x1110);
        assert_eq!(bus.read_half_word(0x0200_0002), 0x1111);
        assert_eq!(bus.read_half_word(0x0200_0004), 0x1112);
    }

    #[test]
    fn check_cpu_fast_set_rounds_up_to_blocks() {
        let mut bus = Bus::default();
        for i in 0..16 {
            bus.write_word(0x0300_0000 + i * 4, i + 1);
        }
        cpu_fast_set(&mut bus, 0x0300_0000, 0x0200_0000, 3);

        assert_eq!(bus.read_word(0x0200_0000), 1);
        assert_eq!(bus.read_word(0x0200_001C), 8);
        assert_eq!(bus.read_word(0x0200_0020), 0);
    }

    #[test]
    fn check_cpu_fast_set_fill() {
        let mut bus = Bus::default();
        bus.write_word(0x0300_0000, 0x0101_0101);
        cpu_fast_set(&mut bus, 0x0300_0000, 0x0600_0000, (1 << 24) | 16);

        assert_eq!(bus.read_word(0x0600_003C), 0x0101_0101);
        assert_eq!(bus.read_word(0x0600_0040), 0);
    }

    #[test]
    fn check_bit_unpack_1bpp_to_4bpp() {
        let mut bus = Bus::default();
        bus.write_byte(0x0300_0000, 0b1000_0001);
        bus.write_half_word(0x0300_0100, 1);
        bus.write_byte(0x0300_0102, 1);
        bus.write_byte(0x0300_0103, 4);
        bus.write_word(0x0300_0104, 2);

        bit_unpack(&mut bus, 0x0300_0000, 0x0200_0000, 0x0300_0100);

        // Set bits become 1 + 2, clear bits stay 0.
        assert_eq!(bus.read_word(0x0200_0000), 0x3000_0003);
    }

    #[test]
    fn check_bit_unpack_offset_on_zero() {
        let mut bus = Bus::default();
        bus.write_byte(0x0300_0000, 0x21);
        bus.write_half_word(0x0300_0100, 1);
        bus.write_byte(0x0300_0102, 4);
        bus.write_byte(0x0300_0103, 16);
        bus.write_word(0x0300_0104, 0x8000_0010);

        bit_unpack(&mut bus, 0x0300_0000, 0x0200_0000, 0x0300_0100);

        assert_eq!(bus.read_word(0x0200_0000), 0x0012_0011);
    }
}
