//! I/O register file (0x0400_0000 - 0x0400_03FF).
//!
//! Registers are kept as a flat array of halfwords, indexed by `offset / 2`.
//! Every halfword has an entry in [`WRITE_HANDLERS`] telling the bus how a
//! write to it behaves: most registers just store the value through a mask,
//! the rest have a side effect on some peripheral.
//!
//! ```text
//!   0x000 ┌──────────────┐
//!         │ LCD          │  DISPCNT, DISPSTAT, VCOUNT, BGxCNT, scroll, affine, windows, blend
//!   0x060 ├──────────────┤
//!         │ Sound        │  PSG registers (stored only), SOUNDCNT, SOUNDBIAS, FIFO A/B
//!   0x0B0 ├──────────────┤
//!         │ DMA 0-3      │  SAD, DAD, CNT_L, CNT_H (stride 0xC)
//!   0x100 ├──────────────┤
//!         │ Timers 0-3   │  TMxCNT_L, TMxCNT_H
//!   0x120 ├──────────────┤
//!         │ Serial/Keys  │  SIO*, KEYINPUT, KEYCNT, RCNT
//!   0x200 ├──────────────┤
//!         │ System       │  IE, IF, WAITCNT, IME, POSTFLG/HALTCNT
//!   0x3FF └──────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

pub const IO_REGISTERS_SIZE: usize = 0x400;

pub const DISPCNT: u32 = 0x000;
pub const DISPSTAT: u32 = 0x004;
pub const VCOUNT: u32 = 0x006;
pub const BG2PA: u32 = 0x020;
pub const BG2PD: u32 = 0x026;
pub const BG3PA: u32 = 0x030;
pub const BG3PD: u32 = 0x036;
pub const SOUNDCNT_H: u32 = 0x082;
pub const SOUNDCNT_X: u32 = 0x084;
pub const SOUNDBIAS: u32 = 0x088;
pub const FIFO_A: u32 = 0x0A0;
pub const FIFO_B: u32 = 0x0A4;
pub const DMA_BASE: u32 = 0x0B0;
pub const DMA_STRIDE: u32 = 0x00C;
pub const TIMER_BASE: u32 = 0x100;
pub const SIOCNT: u32 = 0x128;
pub const SIODATA8: u32 = 0x12A;
pub const KEYINPUT: u32 = 0x130;
pub const KEYCNT: u32 = 0x132;
pub const RCNT: u32 = 0x134;
pub const IE: u32 = 0x200;
pub const IF: u32 = 0x202;
pub const WAITCNT: u32 = 0x204;
pub const IME: u32 = 0x208;
pub const POSTFLG: u32 = 0x300;

/// Offsets of the DMA channel registers, relative to [`DMA_BASE`] + channel * [`DMA_STRIDE`].
pub mod dma_offset {
    pub const SOURCE_LOW: u32 = 0x0;
    pub const SOURCE_HIGH: u32 = 0x2;
    pub const DESTINATION_LOW: u32 = 0x4;
    pub const DESTINATION_HIGH: u32 = 0x6;
    pub const COUNT: u32 = 0x8;
    pub const CONTROL: u32 = 0xA;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fifo {
    A,
    B,
}

/// What a halfword write to a register does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteHandler {
    /// Stores `value & mask`.
    Store(u16),
    ReadOnly,
    /// Only the IRQ enables and the VCOUNT setting are writable.
    DisplayStatus,
    DmaControl(usize),
    TimerReload(usize),
    TimerControl(usize),
    SoundFifo(Fifo),
    SoundControlHigh,
    SerialControl,
    InterruptEnable,
    /// Writing 1 to an IF bit clears it.
    InterruptAcknowledge,
    WaitControl,
    MasterEnable,
    /// POSTFLG in the low byte, HALTCNT in the high byte.
    PowerControl,
}

const fn build_write_handlers() -> [WriteHandler; IO_REGISTERS_SIZE / 2] {
    use WriteHandler::{
        DisplayStatus, DmaControl, InterruptAcknowledge, InterruptEnable, MasterEnable,
        PowerControl, ReadOnly, SerialControl, SoundControlHigh, SoundFifo, Store, TimerControl,
        TimerReload, WaitControl,
    };

    let mut table = [Store(0xFFFF); IO_REGISTERS_SIZE / 2];

    table[(DISPCNT / 2) as usize] = Store(0xFFF7);
    table[(DISPSTAT / 2) as usize] = DisplayStatus;
    table[(VCOUNT / 2) as usize] = ReadOnly;
    table[0x08 / 2] = Store(0xDFCF);
    table[0x0A / 2] = Store(0xDFCF);
    table[0x0C / 2] = Store(0xFFCF);
    table[0x0E / 2] = Store(0xFFCF);

    let mut offset = 0x10;
    while offset <= 0x1E {
        table[offset / 2] = Store(0x01FF);
        offset += 2;
    }

    table[0x2A / 2] = Store(0x0FFF);
    table[0x2E / 2] = Store(0x0FFF);
    table[0x3A / 2] = Store(0x0FFF);
    table[0x3E / 2] = Store(0x0FFF);
    table[0x48 / 2] = Store(0x3F3F);
    table[0x4A / 2] = Store(0x3F3F);
    table[0x50 / 2] = Store(0x3FFF);
    table[0x52 / 2] = Store(0x1F1F);
    table[0x54 / 2] = Store(0x001F);

    table[(SOUNDCNT_H / 2) as usize] = SoundControlHigh;
    table[(SOUNDCNT_X / 2) as usize] = Store(0x0080);
    table[(SOUNDBIAS / 2) as usize] = Store(0xC3FE);
    table[(FIFO_A / 2) as usize] = SoundFifo(Fifo::A);
    table[(FIFO_A / 2) as usize + 1] = SoundFifo(Fifo::A);
    table[(FIFO_B / 2) as usize] = SoundFifo(Fifo::B);
    table[(FIFO_B / 2) as usize + 1] = SoundFifo(Fifo::B);

    let mut channel = 0;
    while channel < 4 {
        let base = (DMA_BASE + channel as u32 * DMA_STRIDE) as usize / 2;
        let last = channel == 3;
        table[base] = Store(0xFFFF);
        table[base + 1] = Store(if channel == 0 { 0x07FF } else { 0x0FFF });
        table[base + 2] = Store(0xFFFF);
        table[base + 3] = Store(if last { 0x0FFF } else { 0x07FF });
        table[base + 4] = Store(if last { 0xFFFF } else { 0x3FFF });
        table[base + 5] = DmaControl(channel);
        channel += 1;
    }

    let mut timer = 0;
    while timer < 4 {
        let base = TIMER_BASE as usize / 2 + timer * 2;
        table[base] = TimerReload(timer);
        table[base + 1] = TimerControl(timer);
        timer += 1;
    }

    table[(SIOCNT / 2) as usize] = SerialControl;
    table[(KEYINPUT / 2) as usize] = ReadOnly;
    table[(KEYCNT / 2) as usize] = Store(0xC3FF);

    table[(IE / 2) as usize] = InterruptEnable;
    table[(IF / 2) as usize] = InterruptAcknowledge;
    table[(WAITCNT / 2) as usize] = WaitControl;
    table[(IME / 2) as usize] = MasterEnable;
    table[(POSTFLG / 2) as usize] = PowerControl;

    table
}

/// Write behaviour of every I/O halfword.
pub static WRITE_HANDLERS: [WriteHandler; IO_REGISTERS_SIZE / 2] = build_write_handlers();

/// Registers that read back. The rest (scroll, affine, window bounds, mosaic,
/// FIFOs, DMA addresses and counts) are write-only and read as 0.
#[must_use]
pub const fn is_readable(offset: u32) -> bool {
    matches!(
        offset,
        0x000..=0x00F
            | 0x048..=0x053
            | 0x060..=0x09F
            | 0x0BA..=0x0BB
            | 0x0C6..=0x0C7
            | 0x0D2..=0x0D3
            | 0x0DE..=0x0DF
            | 0x100..=0x10F
            | 0x120..=0x12F
            | 0x130..=0x15B
            | 0x200..=0x20B
            | 0x300..=0x301
    )
}

#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct IoRegisters {
    #[serde_as(as = "[_; IO_REGISTERS_SIZE / 2]")]
    registers: [u16; IO_REGISTERS_SIZE / 2],
}

impl Default for IoRegisters {
    fn default() -> Self {
        Self {
            registers: [0; IO_REGISTERS_SIZE / 2],
        }
    }
}

impl IoRegisters {
    /// Power-on values.
    pub fn reset(&mut self) {
        self.registers.fill(0);
        self.set(DISPCNT, 0x0080);
        self.set(KEYINPUT, 0x03FF);
        self.set(SOUNDBIAS, 0x0200);
        for affine in [BG2PA, BG2PD, BG3PA, BG3PD] {
            self.set(affine, 0x0100);
        }
    }

    /// Raw halfword at `offset`, as last stored.
    #[must_use]
    pub const fn get(&self, offset: u32) -> u16 {
        self.registers[(offset as usize & (IO_REGISTERS_SIZE - 1)) >> 1]
    }

    pub const fn set(&mut self, offset: u32, value: u16) {
        self.registers[(offset as usize & (IO_REGISTERS_SIZE - 1)) >> 1] = value;
    }

    /// Raw 32-bit value made of the halfwords at `offset` and `offset + 2`.
    #[must_use]
    pub const fn get_word(&self, offset: u32) -> u32 {
        self.get(offset) as u32 | ((self.get(offset + 2) as u32) << 16)
    }

    /// Clears `range` (byte offsets, halfword aligned).
    pub fn clear(&mut self, range: std::ops::Range<u32>) {
        for offset in range.step_by(2) {
            self.set(offset, 0);
        }
    }

    #[must_use]
    pub const fn handler(offset: u32) -> WriteHandler {
        WRITE_HANDLERS[(offset as usize & (IO_REGISTERS_SIZE - 1)) >> 1]
    }
}
