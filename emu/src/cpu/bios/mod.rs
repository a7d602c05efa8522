//! # High-level BIOS
//!
//! Without a BIOS image a `SWI` does not enter Supervisor mode: the call is
//! carried out here, directly on the registers and the bus, and execution
//! continues after the `SWI` instruction. The time the real routine would
//! have taken is charged to the scheduler as a stall.

mod affine;
mod arithmetic;
mod decompress;
mod memory_copy;

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::bus::io_registers::{
    BG2PA, BG2PD, BG3PA, BG3PD, DISPCNT, IE, IF, IME, RCNT, SOUNDBIAS, WAITCNT,
};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::hardware::internal_memory::InternalMemory;

use self::decompress::Target;

/// Flags the game's IRQ handler ORs in for IntrWait.
const INTR_CHECK_FLAG: u32 = 0x0300_7FF8;
/// Non-zero when SoftReset must restart from work RAM.
const RETURN_ADDRESS_SELECT: u32 = 0x0300_7FFA;
/// Value returned by GetBiosChecksum on a retail console.
const BIOS_CHECKSUM: u32 = 0xBAAE_187F;

impl Arm7tdmi {
    /// Runs BIOS call `number` issued by the `SWI` at `address`.
    pub(crate) fn high_level_swi(&mut self, number: u32, address: u32) {
        let [r0, r1, r2, r3] = [0, 1, 2, 3].map(|register| self.reg(register));
        let stall = stall_cycles(&mut self.bus, number, r0, r1, r2);

        match number {
            0x00 => self.soft_reset(),
            0x01 => self.register_ram_reset(r0),
            0x02 => {
                self.bus.scheduler.halted = true;
                self.bus.scheduler.force_event();
            }
            0x03 => {
                self.bus.scheduler.stopped = true;
                self.bus.scheduler.force_event();
            }
            0x04 => self.intr_wait(r0 != 0, r1 as u16, address),
            0x05 => {
                self.set_reg(0, 1);
                self.set_reg(1, 1);
                self.intr_wait(true, 1, address);
            }
            0x06 => self.write_division(r0 as i32, r1 as i32),
            0x07 => self.write_division(r1 as i32, r0 as i32),
            0x08 => self.set_reg(0, arithmetic::sqrt(r0)),
            0x09 => self.set_reg(0, arithmetic::arctan(r0 as i32) as u32),
            0x0A => self.set_reg(0, arithmetic::arctan2(r0 as i32, r1 as i32)),
            0x0B => memory_copy::cpu_set(&mut self.bus, r0, r1, r2),
            0x0C => memory_copy::cpu_fast_set(&mut self.bus, r0, r1, r2),
            0x0D => self.set_reg(0, BIOS_CHECKSUM),
            0x0E => affine::bg_affine_set(&mut self.bus, r0, r1, r2),
            0x0F => affine::obj_affine_set(&mut self.bus, r0, r1, r2, r3),
            0x10 => memory_copy::bit_unpack(&mut self.bus, r0, r1, r2),
            0x11 => decompress::lz77(&mut self.bus, r0, r1, Target::Wram),
            0x12 => decompress::lz77(&mut self.bus, r0, r1, Target::Vram),
            0x13 => decompress::huffman(&mut self.bus, r0, r1),
            0x14 => decompress::run_length(&mut self.bus, r0, r1, Target::Wram),
            0x15 => decompress::run_length(&mut self.bus, r0, r1, Target::Vram),
            0x16 => decompress::diff8(&mut self.bus, r0, r1, Target::Wram),
            0x17 => decompress::diff8(&mut self.bus, r0, r1, Target::Vram),
            0x18 => decompress::diff16(&mut self.bus, r0, r1),
            0x19 => self.sound_bias(r0),
            // Sound driver entry points: only their duration is modelled.
            0x1A..=0x1E | 0x28 | 0x2A => {}
            0x1F => {
                let frequency = self.bus.read_word(r0.wrapping_add(4) & !3);
                self.set_reg(0, arithmetic::midi_key_to_frequency(frequency, r1, r2));
            }
            _ => {
                if self.unsupported_swi.insert(number) {
                    tracing::warn!("unsupported BIOS call 0x{number:02X} at 0x{address:08X}");
                }
            }
        }

        if stall > 0 {
            self.bus.scheduler.swi_ticks = stall;
            self.bus.scheduler.force_event();
        }
    }

    fn soft_reset(&mut self) {
        let from_working_ram = self.bus.read_byte(RETURN_ADDRESS_SELECT) != 0;
        let start = InternalMemory::working_iram_offset(0x0300_7E00);
        self.bus.memory.working_iram[start..].fill(0);

        let entry = if from_working_ram {
            0x0200_0000
        } else {
            0x0800_0000
        };
        tracing::debug!("soft reset to 0x{entry:08X}");

        self.reset(entry, false);
        self.branch_to(entry);
    }

    fn register_ram_reset(&mut self, flags: u32) {
        self.bus.write_io(DISPCNT, 0x0080);

        let memory = &mut self.bus.memory;
        if flags.is_bit_on(0) {
            memory.working_ram.fill(0);
        }
        if flags.is_bit_on(1) {
            // The top 512 bytes hold the stacks and the IRQ vector.
            memory.working_iram[..0x7E00].fill(0);
        }
        if flags.is_bit_on(2) {
            memory.palette_ram.fill(0);
        }
        if flags.is_bit_on(3) {
            memory.video_ram.fill(0);
        }
        if flags.is_bit_on(4) {
            memory.object_attributes.fill(0);
        }

        if flags.is_bit_on(5) {
            self.bus.io.clear(0x120..0x130);
            self.bus.io.set(RCNT, 0x8000);
            self.bus.io.clear(0x140..0x15A);
        }

        if flags.is_bit_on(6) {
            self.bus.io.clear(0x060..0x0A8);
            self.bus.sound.reset();
            self.bus.io.set(SOUNDBIAS, 0x0200);
        }

        if flags.is_bit_on(7) {
            for offset in (0x004..0x060).step_by(2).chain((0x0B0..0x0E0).step_by(2)) {
                self.bus.write_io(offset, 0);
            }
            for offset in [IE, WAITCNT, IME] {
                self.bus.write_io(offset, 0);
            }
            self.bus.io.set(IF, 0);
            for offset in [BG2PA, BG2PD, BG3PA, BG3PD] {
                self.bus.write_io(offset, 0x0100);
            }
        }
    }

    /// Waits for one of the `wanted` interrupts to be flagged at
    /// [`INTR_CHECK_FLAG`]. While none is, the CPU halts and the `SWI` runs
    /// again after the IRQ handler returns.
    fn intr_wait(&mut self, discard_old: bool, wanted: u16, address: u32) {
        self.bus.write_io(IME, 1);

        let mut flags = self.bus.read_half_word(INTR_CHECK_FLAG);
        if !self.intr_wait_pending && discard_old {
            flags &= !wanted;
        }

        if flags & wanted != 0 {
            self.bus.write_half_word(INTR_CHECK_FLAG, flags & !wanted);
            self.intr_wait_pending = false;
            return;
        }

        self.bus.write_half_word(INTR_CHECK_FLAG, flags);
        self.intr_wait_pending = true;
        self.bus.scheduler.halted = true;
        self.bus.scheduler.force_event();
        self.branch_to(address);
    }

    fn write_division(&mut self, numerator: i32, denominator: i32) {
        let result = arithmetic::div(numerator, denominator);
        self.set_reg(0, result.quotient as u32);
        self.set_reg(1, result.remainder as u32);
        self.set_reg(3, result.absolute_quotient);
    }

    /// Moves the bias level to 0x200, or to 0 when `level` is 0. The
    /// resolution bits are kept.
    fn sound_bias(&mut self, level: u32) {
        let target = if level == 0 { 0 } else { 0x0200 };
        let bias = self.bus.io.get(SOUNDBIAS);
        self.bus.io.set(SOUNDBIAS, (bias & !0x03FE) | target);
    }
}

/// Cycles the real routine would spend, 0 when the source lies in the BIOS.
fn stall_cycles(bus: &mut Bus, number: u32, r0: u32, r1: u32, r2: u32) -> i32 {
    let waits = bus.wait_states.clone();
    let region = |address: u32| ((address >> 24) & 0xF) as usize;
    let wait = |address: u32| i32::from(waits.wait[region(address)]);
    let wait_32 = |address: u32| i32::from(waits.wait_32[region(address)]);
    let wait_seq_32 = |address: u32| i32::from(waits.wait_seq_32[region(address)]);

    let (length, cycles) = match number {
        0x1A => return 252_000,
        0x1B => return 280_000,
        0x1C => return 11_050,
        0x1D => return 44,
        0x0B => {
            let length = ((r2 & 0x1F_FFFF) >> 1) as i32;
            let cycles = match (r2.is_bit_on(24), r2.is_bit_on(26)) {
                (true, true) => (7 + wait_32(r1)) * (length >> 1),
                (true, false) => (8 + wait(r1)) * length,
                (false, true) => (10 + wait_32(r0) + wait_32(r1)) * (length >> 1),
                (false, false) => (11 + wait(r0) + wait(r1)) * length,
            };
            (length, cycles)
        }
        0x0C => {
            let length = ((r2 & 0x1F_FFFF) >> 5) as i32;
            let cycles = if r2.is_bit_on(24) {
                (6 + wait_32(r1) + 7 * (wait_seq_32(r1) + 1)) * length
            } else {
                (9 + wait_32(r0) + wait_32(r1) + 7 * (wait_seq_32(r0) + wait_seq_32(r1) + 2))
                    * length
            };
            (length, cycles)
        }
        0x10 => {
            let length = i32::from(bus.read_half_word(r2 & !1));
            (length, (32 + wait(r0)) * length)
        }
        0x11..=0x18 => {
            let shift = if matches!(number, 0x15 | 0x17 | 0x18) { 9 } else { 8 };
            let length = (bus.read_word(r0 & !3) >> shift) as i32;
            let per_unit = match number {
                0x11 => 9 + wait(r1),
                0x12 => 19 + wait(r1),
                0x13 => 29 + (wait(r0) << 1),
                0x14 => 11 + wait(r0) + wait(r1),
                0x15 => 34 + (wait(r0) << 1) + wait(r1),
                0x16 => 13 + wait(r0) + wait(r1),
                0x17 => 39 + (wait(r0) << 1) + wait(r1),
                _ => 13 + wait(r0) + wait(r1),
            };
            (length, per_unit.wrapping_mul(length))
        }
        _ => return 0,
    };

    if memory_copy::reads_bios(r0, length as u32) {
        0
    } else {
        cycles.max(0)
    }
}
