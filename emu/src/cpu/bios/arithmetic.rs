/// Result of the Div call: R0, R1 and R3.
#[derive(Debug, PartialEq, Eq)]
pub struct Division {
    pub quotient: i32,
    pub remainder: i32,
    pub absolute_quotient: u32,
}

/// Signed division rounding toward zero. Dividing by zero gives ±1 with the
/// numerator as remainder instead of hanging like the real routine.
pub fn div(numerator: i32, denominator: i32) -> Division {
    if denominator == 0 {
        return Division {
            quotient: if numerator < 0 { -1 } else { 1 },
            remainder: numerator,
            absolute_quotient: 1,
        };
    }

    let quotient = numerator.wrapping_div(denominator);
    Division {
        quotient,
        remainder: numerator.wrapping_rem(denominator),
        absolute_quotient: quotient.unsigned_abs(),
    }
}

pub const fn sqrt(value: u32) -> u32 {
    value.isqrt()
}

/// Arc tangent of a 1.14 fixed point tangent. A full turn is 0x10000.
pub const fn arctan(tangent: i32) -> i32 {
    let a = -(tangent.wrapping_mul(tangent) >> 14);
    let mut b = (0xA9_i32.wrapping_mul(a) >> 14) + 0x390;
    b = (b.wrapping_mul(a) >> 14) + 0x91C;
    b = (b.wrapping_mul(a) >> 14) + 0xFB6;
    b = (b.wrapping_mul(a) >> 14) + 0x16AA;
    b = (b.wrapping_mul(a) >> 14) + 0x2081;
    b = (b.wrapping_mul(a) >> 14) + 0x3651;
    b = (b.wrapping_mul(a) >> 14) + 0xA2F9;
    tangent.wrapping_mul(b) >> 16
}

/// Angle of the vector (x, y), 0..0xFFFF for a full turn.
pub fn arctan2(x: i32, y: i32) -> u32 {
    let sign = |value: i32| ((value >> 16) as u32) & 0x8000;

    let angle = if y == 0 {
        sign(x)
    } else if x == 0 {
        sign(y) + 0x4000
    } else if x.unsigned_abs() > y.unsigned_abs()
        || (x.unsigned_abs() == y.unsigned_abs() && !(x < 0 && y < 0))
    {
        let tangent = arctan(div(y.wrapping_shl(14), x).quotient) as u32;
        if x < 0 {
            0x8000_u32.wrapping_add(tangent)
        } else {
            (sign(y) << 1).wrapping_add(tangent)
        }
    } else {
        let tangent = arctan(div(x.wrapping_shl(14), y).quotient) as u32;
        (0x4000 + sign(y)).wrapping_sub(tangent)
    };

    angle & 0xFFFF
}

/// Sample rate for playing `key` (plus `fraction`/256) of a sample recorded
/// at `frequency` for middle key 180.
pub fn midi_key_to_frequency(frequency: u32, key: u32, fraction: u32) -> u32 {
    let semitones = (180.0 - f64::from(key)) - f64::from(fraction) / 256.0;
    (f64::from(frequency) / 2_f64.powf(semitones / 12.0)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_div() {
        assert_eq!(
            div(-7, 2),
            Division {
                quotient: -3,
                remainder: -1,
                absolute_quotient: 3,
            }
        );
        assert_eq!(div(i32::MIN, -1).quotient, i32::MIN);
        assert_eq!(
            div(-5, 0),
            Division {
                quotient: -1,
                remainder: -5,
                absolute_quotient: 1,
            }
        );
    }

    #[test]
    fn check_sqrt() {
        assert_eq!(sqrt(0), 0);
        assert_eq!(sqrt(15), 3);
        assert_eq!(sqrt(16), 4);
        assert_eq!(sqrt(u32::MAX), 0xFFFF);
    }

    #[test]
    fn check_arctan() {
        assert_eq!(arctan(0), 0);
        // tan(π/4) = 1.0
        assert_eq!(arctan(0x4000), 0x2000);
        assert_eq!(arctan(-0x4000), -0x2000);
    }

    #[test]
    fn check_arctan2_axes() {
        assert_eq!(arctan2(0x100, 0), 0);
        assert_eq!(arctan2(-0x100, 0), 0x8000);
        assert_eq!(arctan2(0, 0x100), 0x4000);
        assert_eq!(arctan2(0, -0x100), 0xC000);
    }

    #[test]
    fn check_arctan2_quadrants() {
        assert_eq!(arctan2(0x1000, 0x1000), 0x2000);
        assert_eq!(arctan2(-0x1000, 0x1000), 0x6000);
        let third = arctan2(-0x1000, -0x2000);
        assert!(third > 0x8000 && third < 0xC000);
    }

    #[test]
    fn check_midi_key() {
        assert_eq!(midi_key_to_frequency(44100, 180, 0), 44100);
        assert_eq!(midi_key_to_frequency(44100, 168, 0), 22050);
    }
}
