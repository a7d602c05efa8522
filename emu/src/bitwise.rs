use std::ops::RangeInclusive;

/// Bit helpers used all over the core to pick fields out of opcodes and registers.
///
/// Bit indexes go from the lsb to the msb (right to left).
pub trait Bits: Copy {
    fn is_bit_on(self, bit_idx: u8) -> bool;

    fn is_bit_off(self, bit_idx: u8) -> bool {
        !self.is_bit_on(bit_idx)
    }

    fn set_bit_on(&mut self, bit_idx: u8);

    fn set_bit_off(&mut self, bit_idx: u8);

    fn set_bit(&mut self, bit_idx: u8, value: bool) {
        if value {
            self.set_bit_on(bit_idx);
        } else {
            self.set_bit_off(bit_idx);
        }
    }

    fn get_bit(self, bit_idx: u8) -> bool {
        self.is_bit_on(bit_idx)
    }

    /// Extracts `bits_range` and moves it down to bit 0.
    fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self;

    /// True when every bit of the range is set.
    fn are_bits_on(self, bits_range: RangeInclusive<u8>) -> bool {
        bits_range.into_iter().all(|bit_idx| self.is_bit_on(bit_idx))
    }

    fn get_byte(self, byte_nth: u8) -> u8;

    fn set_byte(&mut self, byte_nth: u8, value: u8);

    /// Sign-extends the lowest `number_of_bits` bits to the full width of the type.
    fn sign_extended(self, number_of_bits: u8) -> Self;
}

macro_rules! impl_bits {
    ($($ty:ty => $signed:ty),*) => {
        $(
            impl Bits for $ty {
                #[inline]
                fn is_bit_on(self, bit_idx: u8) -> bool {
                    debug_assert!(u32::from(bit_idx) < <$ty>::BITS);
                    (self >> bit_idx) & 1 == 1
                }

                #[inline]
                fn set_bit_on(&mut self, bit_idx: u8) {
                    debug_assert!(u32::from(bit_idx) < <$ty>::BITS);
                    *self |= 1 << bit_idx;
                }

                #[inline]
                fn set_bit_off(&mut self, bit_idx: u8) {
                    debug_assert!(u32::from(bit_idx) < <$ty>::BITS);
                    *self &= !(1 << bit_idx);
                }

                #[inline]
                fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self {
                    let start = u32::from(*bits_range.start());
                    let length = u32::from(*bits_range.end()) - start + 1;
                    debug_assert!(start + length <= <$ty>::BITS);

                    let shifted = self >> start;
                    if length == <$ty>::BITS {
                        shifted
                    } else {
                        shifted & ((1 << length) - 1)
                    }
                }

                #[inline]
                fn get_byte(self, byte_nth: u8) -> u8 {
                    debug_assert!(u32::from(byte_nth) * 8 < <$ty>::BITS);
                    (self >> (u32::from(byte_nth) * 8)) as u8
                }

                #[inline]
                fn set_byte(&mut self, byte_nth: u8, value: u8) {
                    debug_assert!(u32::from(byte_nth) * 8 < <$ty>::BITS);
                    let shift = u32::from(byte_nth) * 8;
                    *self = (*self & !(0xFF << shift)) | (<$ty>::from(value) << shift);
                }

                #[inline]
                fn sign_extended(self, number_of_bits: u8) -> Self {
                    debug_assert!(number_of_bits > 0);
                    let unused = <$ty>::BITS - u32::from(number_of_bits);
                    (((self << unused) as $signed) >> unused) as $ty
                }
            }
        )*
    };
}

impl_bits!(u8 => i8, u16 => i16, u32 => i32, u64 => i64);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_on() {
        let b = 0b1_1001_1101_u32;
        assert!(b.is_bit_on(0));
        assert!(!b.is_bit_on(1));
        assert!(b.is_bit_on(2));
        assert!(b.is_bit_on(3));
        assert!(b.is_bit_on(8));
        assert!(!b.is_bit_on(31));
    }

    #[test]
    fn test_set_on_off() {
        let mut b = 0b1_1001_1101_u32;
        b.set_bit_on(1);
        b.set_bit_on(11);
        b.set_bit_off(0);
        assert_eq!(b, 0b1001_1001_1110);
    }

    #[test]
    fn set_bit() {
        let mut b = 0b110_0110_u32;
        b.set_bit(0, true);
        b.set_bit(1, true);
        b.set_bit(2, false);
        b.set_bit(3, false);
        assert_eq!(b, 0b110_0011);
    }

    #[test]
    fn get_bits() {
        let b = 0b10_1100_1110_u32;
        assert_eq!(b.get_bits(0..=3), 0b1110);
        assert_eq!(b.get_bits(1..=1), 0b1);
        assert_eq!(b.get_bits(4..=7), 0b1100);
        assert_eq!(b.get_bits(8..=9), 0b10);
        assert_eq!(b.get_bits(0..=31), 0b10_1100_1110);
        assert_eq!(b.get_bits(28..=31), 0b0);
        assert_eq!(0xF000_u16.get_bits(12..=15), 0xF);
    }

    #[test]
    fn are_bits_on() {
        let b = 0b10_1100_1110_u32;
        assert!(!b.are_bits_on(0..=3));
        assert!(b.are_bits_on(1..=3));
    }

    #[test]
    fn get_and_set_byte() {
        let mut b = 0x0122_0448_u32;
        assert_eq!(b.get_byte(0), 0x48);
        assert_eq!(b.get_byte(1), 0x04);
        assert_eq!(b.get_byte(2), 0x22);
        assert_eq!(b.get_byte(3), 0x01);

        b.set_byte(2, 0xAA);
        assert_eq!(b, 0x01AA_0448);
    }

    #[test]
    fn check_sign_extended() {
        let a: u32 = 0b1001; // -7 in i4
        assert_eq!(a.sign_extended(4) as i32, -7);
        assert_eq!(0x7F_u32.sign_extended(8), 0x7F);
        assert_eq!(0x00FF_FFFE_u32.sign_extended(24), 0xFFFF_FFFE);
        assert_eq!(0x80_u16.sign_extended(8), 0xFF80);
    }
}
