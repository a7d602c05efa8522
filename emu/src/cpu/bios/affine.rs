use std::f64::consts::TAU;

use crate::bus::Bus;

/// sin(2π · angle / 256) in 1.14 fixed point.
fn sine(angle: u16) -> i32 {
    ((f64::from(angle & 0xFF) * TAU / 256.0).sin() * 16384.0) as i32
}

/// The 2x2 matrix for a scale and a rotation. Only the top byte of `theta`
/// is used.
fn matrix(scale_x: i16, scale_y: i16, theta: u16) -> [i16; 4] {
    let angle = theta >> 8;
    let cos = sine(angle.wrapping_add(0x40));
    let sin = sine(angle);

    let dx = (i32::from(scale_x) * cos) >> 14;
    let dmx = (i32::from(scale_x) * sin) >> 14;
    let dy = (i32::from(scale_y) * sin) >> 14;
    let dmy = (i32::from(scale_y) * cos) >> 14;

    [dx as i16, (-dmx) as i16, dy as i16, dmy as i16]
}

/// BgAffineSet: `count` entries of 20 bytes at `source`
///
/// ```text
///  +0  i32  texture center x (19.8)
///  +4  i32  texture center y
///  +8  i16  screen center x
///  +10 i16  screen center y
///  +12 i16  scale x (8.8)
///  +14 i16  scale y
///  +16 u16  angle (top byte used)
/// ```
///
/// become PA, PB, PC, PD and the reference point X, Y at `destination`.
pub fn bg_affine_set(bus: &mut Bus, source: u32, destination: u32, count: u32) {
    let mut source = source;
    let mut destination = destination;

    for _ in 0..count {
        let center_x = bus.read_word(source & !3) as i32;
        let center_y = bus.read_word(source.wrapping_add(4) & !3) as i32;
        let screen_x = i32::from(bus.read_half_word(source.wrapping_add(8) & !1) as i16);
        let screen_y = i32::from(bus.read_half_word(source.wrapping_add(10) & !1) as i16);
        let scale_x = bus.read_half_word(source.wrapping_add(12) & !1) as i16;
        let scale_y = bus.read_half_word(source.wrapping_add(14) & !1) as i16;
        let theta = bus.read_half_word(source.wrapping_add(16) & !1);
        source = source.wrapping_add(20);

        let parameters = matrix(scale_x, scale_y, theta);
        for (i, &parameter) in parameters.iter().enumerate() {
            bus.write_half_word(destination.wrapping_add(i as u32 * 2), parameter as u16);
        }

        let [pa, pb, pc, pd] = parameters.map(i32::from);
        let start_x = center_x
            .wrapping_sub(pa.wrapping_mul(screen_x))
            .wrapping_sub(pb.wrapping_mul(screen_y));
        let start_y = center_y
            .wrapping_sub(pc.wrapping_mul(screen_x))
            .wrapping_sub(pd.wrapping_mul(screen_y));
        bus.write_word(destination.wrapping_add(8), start_x as u32);
        bus.write_word(destination.wrapping_add(12), start_y as u32);
        destination = destination.wrapping_add(16);
    }
}

/// ObjAffineSet: `count` entries of 8 bytes (scale x, scale y, angle) become
/// PA, PB, PC, PD written `stride` bytes apart.
pub fn obj_affine_set(bus: &mut Bus, source: u32, destination: u32, count: u32, stride: u32) {
    let mut source = source;
    let mut destination = destination;

    for _ in 0..count {
        let scale_x = bus.read_half_word(source & !1) as i16;
        let scale_y = bus.read_half_word(source.wrapping_add(2) & !1) as i16;
        let theta = bus.read_half_word(source.wrapping_add(4) & !1);
        source = source.wrapping_add(8);

        for parameter in matrix(scale_x, scale_y, theta) {
            bus.write_half_word(destination & !1, parameter as u16);
            destination = destination.wrapping_add(stride);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_sine() {
        assert_eq!(sine(0), 0);
        assert_eq!(sine(0x40), 0x4000);
        assert_eq!(sine(0xC0), -0x4000);
        assert_eq!(sine(0x100), 0);
    }

    #[test]
    fn check_matrix() {
        assert_eq!(matrix(0x100, 0x100, 0), [0x100, 0, 0, 0x100]);
        // Quarter turn.
        assert_eq!(matrix(0x100, 0x100, 0x4000), [0, -0x100, 0x100, 0]);
        // Half size, half turn.
        assert_eq!(matrix(0x200, 0x200, 0x8000), [-0x200, 0, 0, -0x200]);
    }

    #[test]
    fn check_obj_affine_set() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0300_0000, 0x100);
        bus.write_half_word(0x0300_0002, 0x80);
        bus.write_half_word(0x0300_0004, 0);

        obj_affine_set(&mut bus, 0x0300_0000, 0x0700_0006, 1, 8);

        assert_eq!(bus.read_half_word(0x0700_0006), 0x100);
        assert_eq!(bus.read_half_word(0x0700_000E), 0);
        assert_eq!(bus.read_half_word(0x0700_0016), 0);
        assert_eq!(bus.read_half_word(0x0700_001E), 0x80);
    }

    #[test]
    fn check_bg_affine_set() {
        let mut bus = Bus::default();
        bus.write_word(0x0300_0000, 0x1000);
        bus.write_word(0x0300_0004, 0x2000);
        bus.write_half_word(0x0300_0008, 0x10);
        bus.write_half_word(0x0300_000A, 0x20);
        bus.write_half_word(0x0300_000C, 0x100);
        bus.write_half_word(0x0300_000E, 0x100);
        bus.write_half_word(0x0300_0010, 0);

        bg_affine_set(&mut bus, 0x0300_0000, 0x0300_0100, 1);

        assert_eq!(bus.read_half_word(0x0300_0100), 0x100);
        assert_eq!(bus.read_half_word(0x0300_0102), 0);
        assert_eq!(bus.read_half_word(0x0300_0104), 0);
        assert_eq!(bus.read_half_word(0x0300_0106), 0x100);
        assert_eq!(bus.read_word(0x0300_0108), 0);
        assert_eq!(bus.read_word(0x0300_010C), 0);
    }
}
