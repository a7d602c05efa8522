//! The system bus.
//!
//! The top byte of an address selects the region, the low bits are masked by
//! the region size so mirrors come for free:
//!
//! | Region | Contents                | Width | Notes                                  |
//! |--------|-------------------------|-------|----------------------------------------|
//! | 0x00   | BIOS                    | 32    | readable only while executing it       |
//! | 0x02   | Work RAM (256K)         | 16    | mirrored every 256K                    |
//! | 0x03   | Internal work RAM (32K) | 32    | mirrored every 32K                     |
//! | 0x04   | I/O registers           | 32    | see [`io_registers`]                   |
//! | 0x05   | Palette RAM             | 16    | byte writes fill the halfword          |
//! | 0x06   | VRAM (96K)              | 16    | byte writes to OBJ tiles are dropped   |
//! | 0x07   | OAM                     | 32    | byte writes are dropped                |
//! | 0x08-D | Game Pak ROM            | 16    | 0x0D may be the EEPROM window          |
//! | 0x0E-F | SRAM / Flash            | 8     |                                        |
//!
//! Anything else reads as 0 and ignores writes.

pub mod io_registers;
pub mod wait_states;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::backup::BackupMemory;
use crate::cpu::hardware::dma::{AddressControl, Dma, DmaChannel, DmaControl, DmaTrigger, Transfer};
use crate::cpu::hardware::internal_memory::{InternalMemory, MAX_ROM_SIZE};
use crate::cpu::hardware::interrupt_control::Interrupt;
use crate::cpu::hardware::lcd::Lcd;
use crate::cpu::hardware::serial;
use crate::cpu::hardware::sound::Sound;
use crate::cpu::hardware::timers::Timers;
use crate::cpu::psr::CpuState;
use crate::host::{NoTrace, TraceHook};
use crate::scheduler::SchedulerState;

use self::io_registers::{
    DISPCNT, DISPSTAT, DMA_BASE, DMA_STRIDE, Fifo, IE, IF, IME, IO_REGISTERS_SIZE, IoRegisters,
    POSTFLG, SIOCNT, SIODATA8, TIMER_BASE, WAITCNT, WriteHandler, dma_offset, is_readable,
};
use self::wait_states::WaitStates;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    NonSequential,
    Sequential,
}

impl From<bool> for Access {
    fn from(sequential: bool) -> Self {
        if sequential {
            Self::Sequential
        } else {
            Self::NonSequential
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    HalfWord,
    Word,
}

fn no_trace() -> Box<dyn TraceHook> {
    Box::new(NoTrace)
}

#[derive(Serialize, Deserialize)]
pub struct Bus {
    pub memory: InternalMemory,
    pub io: IoRegisters,
    pub wait_states: WaitStates,
    pub lcd: Lcd,
    pub timers: Timers,
    pub dma: Dma,
    pub sound: Sound,
    pub backup: BackupMemory,
    pub scheduler: SchedulerState,

    bios_loaded: bool,
    /// Last opcode fetched from the BIOS, returned by protected BIOS reads.
    bios_latch: u32,
    /// Address of the instruction being executed.
    executing_pc: u32,
    /// Length of the DMA in progress, 0 outside DMA. The EEPROM uses it to
    /// tell its address width.
    dma_active_count: u32,

    #[serde(skip, default = "no_trace")]
    trace: Box<dyn TraceHook>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::with_memory(InternalMemory::default(), false)
    }
}

impl Bus {
    #[must_use]
    pub fn with_memory(memory: InternalMemory, bios_loaded: bool) -> Self {
        let mut bus = Self {
            memory,
            io: IoRegisters::default(),
            wait_states: WaitStates::default(),
            lcd: Lcd::default(),
            timers: Timers::default(),
            dma: Dma::default(),
            sound: Sound::default(),
            backup: BackupMemory::default(),
            scheduler: SchedulerState::default(),
            bios_loaded,
            bios_latch: 0,
            executing_pc: 0,
            dma_active_count: 0,
            trace: no_trace(),
        };
        bus.reset();
        bus
    }

    /// Power-on state of the registers and peripherals. Memory contents and
    /// backup data are left alone.
    pub fn reset(&mut self) {
        self.io.reset();
        self.lcd.reset(&mut self.io);
        self.timers = Timers::default();
        self.dma = Dma::default();
        self.sound.reset();
        self.wait_states = WaitStates::default();
        self.backup.reset_state();
        self.scheduler = SchedulerState::default();
        self.scheduler.next_event = self.next_event_deadline();
        self.dma_active_count = 0;
    }

    #[must_use]
    pub const fn bios_loaded(&self) -> bool {
        self.bios_loaded
    }

    pub const fn set_bios_latch(&mut self, opcode: u32) {
        self.bios_latch = opcode;
    }

    pub const fn set_executing_pc(&mut self, address: u32) {
        self.executing_pc = address;
    }

    pub fn set_trace_hook(&mut self, hook: Box<dyn TraceHook>) {
        self.trace = hook;
    }

    /// Takes the trace hook out, leaving [`NoTrace`] in its place.
    pub fn take_trace_hook(&mut self) -> Box<dyn TraceHook> {
        std::mem::replace(&mut self.trace, no_trace())
    }

    pub fn trace_instruction(&mut self, address: u32, opcode: u32, state: CpuState) {
        self.trace.on_instruction(address, opcode, state);
    }

    pub fn fetch_arm(&mut self, address: u32) -> u32 {
        let opcode = self.read_word(address);
        if address >> 24 == 0 {
            self.bios_latch = opcode;
        }
        opcode
    }

    pub fn fetch_thumb(&mut self, address: u32) -> u16 {
        let opcode = self.read_half_word(address);
        if address >> 24 == 0 {
            self.bios_latch = u32::from(opcode) | (u32::from(opcode) << 16);
        }
        opcode
    }

    /// Cycles of a data access: 1 plus the region wait states.
    #[must_use]
    pub fn access_cycles(&self, address: u32, width: Width, access: Access) -> u32 {
        let region = ((address >> 24) & 0xF) as usize;
        let table = match (width, access) {
            (Width::Word, Access::NonSequential) => &self.wait_states.wait_32,
            (Width::Word, Access::Sequential) => &self.wait_states.wait_seq_32,
            (_, Access::NonSequential) => &self.wait_states.wait,
            (_, Access::Sequential) => &self.wait_states.wait_seq,
        };
        1 + u32::from(table[region])
    }

    /// Cycles of an opcode fetch. With the prefetch buffer on, sequential
    /// Game Pak fetches take a single cycle.
    #[must_use]
    pub fn code_cycles(&self, address: u32, width: Width, access: Access) -> u32 {
        let region = (address >> 24) & 0xF;
        if self.wait_states.prefetch && (0x08..=0x0D).contains(&region) && access == Access::Sequential {
            1
        } else {
            self.access_cycles(address, width, access)
        }
    }

    fn eeprom_mapped(&self, address: u32) -> bool {
        self.backup.eeprom_window()
            && (self.memory.rom.len() <= MAX_ROM_SIZE / 2 || address & 0x01FF_FFFF >= 0x01FF_FF00)
    }

    fn read_bios_word(&self, address: u32) -> u32 {
        if address >= 0x4000 {
            0
        } else if self.executing_pc >> 24 != 0 {
            self.bios_latch
        } else {
            self.memory.bios_word(address)
        }
    }

    /// First byte of OBJ tiles in VRAM: the bitmap modes give 16K more to BGs.
    fn obj_vram_start(&self) -> usize {
        if self.io.get(DISPCNT) & 0b111 >= 3 {
            0x1_4000
        } else {
            0x1_0000
        }
    }

    pub fn read_byte(&mut self, address: u32) -> u8 {
        match address >> 24 {
            0x00 => self.read_bios_word(address).get_byte((address & 3) as u8),
            0x02 => self.memory.working_ram[InternalMemory::working_ram_offset(address)],
            0x03 => self.memory.working_iram[InternalMemory::working_iram_offset(address)],
            0x04 => self.read_io(address & 0x00FF_FFFE).get_byte((address & 1) as u8),
            0x05 => self.memory.palette_ram[address as usize & 0x3FF],
            0x06 => self.memory.video_ram[InternalMemory::video_ram_offset(address)],
            0x07 => self.memory.object_attributes[address as usize & 0x3FF],
            0x0D if self.eeprom_mapped(address) => self.backup.read_eeprom() as u8,
            0x08..=0x0D => self.memory.read_rom(address),
            0x0E | 0x0F => self.backup.read(address),
            _ => {
                tracing::debug!("byte read on unused memory {address:08X}");
                0
            }
        }
    }

    pub fn read_half_word(&mut self, address: u32) -> u16 {
        match address >> 24 {
            0x00 => (self.read_bios_word(address) >> ((address & 2) * 8)) as u16,
            0x04 => self.read_io(address & 0x00FF_FFFE),
            0x0D if self.eeprom_mapped(address) => self.backup.read_eeprom(),
            0x0E | 0x0F => u16::from(self.backup.read(address)) * 0x0101,
            _ => u16::from_le_bytes([self.read_byte(address), self.read_byte(address | 1)]),
        }
    }

    pub fn read_word(&mut self, address: u32) -> u32 {
        match address >> 24 {
            0x00 => self.read_bios_word(address),
            0x04 => {
                let offset = address & 0x00FF_FFFC;
                u32::from(self.read_io(offset)) | (u32::from(self.read_io(offset + 2)) << 16)
            }
            0x0D if self.eeprom_mapped(address) => u32::from(self.backup.read_eeprom()),
            0x0E | 0x0F => u32::from(self.backup.read(address)) * 0x0101_0101,
            _ => {
                u32::from(self.read_half_word(address))
                    | (u32::from(self.read_half_word(address | 2)) << 16)
            }
        }
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        match address >> 24 {
            0x02 => self.memory.working_ram[InternalMemory::working_ram_offset(address)] = value,
            0x03 => self.memory.working_iram[InternalMemory::working_iram_offset(address)] = value,
            0x04 => self.write_io_byte(address & 0x00FF_FFFF, value),
            0x05 => {
                let offset = address as usize & 0x3FE;
                self.memory.palette_ram[offset] = value;
                self.memory.palette_ram[offset + 1] = value;
            }
            0x06 => {
                let offset = InternalMemory::video_ram_offset(address) & !1;
                if offset < self.obj_vram_start() {
                    self.memory.video_ram[offset] = value;
                    self.memory.video_ram[offset + 1] = value;
                }
            }
            0x0E | 0x0F => self.backup.write(address, value),
            _ => tracing::trace!("byte write ignored at {address:08X}"),
        }
    }

    pub fn write_half_word(&mut self, address: u32, value: u16) {
        let bytes = value.to_le_bytes();
        match address >> 24 {
            0x02 => {
                let offset = InternalMemory::working_ram_offset(address) & !1;
                self.memory.working_ram[offset..offset + 2].copy_from_slice(&bytes);
            }
            0x03 => {
                let offset = InternalMemory::working_iram_offset(address) & !1;
                self.memory.working_iram[offset..offset + 2].copy_from_slice(&bytes);
            }
            0x04 => self.write_io(address & 0x00FF_FFFE, value),
            0x05 => {
                let offset = address as usize & 0x3FE;
                self.memory.palette_ram[offset..offset + 2].copy_from_slice(&bytes);
            }
            0x06 => {
                let offset = InternalMemory::video_ram_offset(address) & !1;
                self.memory.video_ram[offset..offset + 2].copy_from_slice(&bytes);
            }
            0x07 => {
                let offset = address as usize & 0x3FE;
                self.memory.object_attributes[offset..offset + 2].copy_from_slice(&bytes);
            }
            0x0D if self.eeprom_mapped(address) => {
                self.backup.write_eeprom(value, self.dma_active_count);
            }
            0x0E | 0x0F => self.backup.write(address, value as u8),
            _ => tracing::trace!("halfword write ignored at {address:08X}"),
        }
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        match address >> 24 {
            0x02 | 0x03 | 0x05 | 0x06 | 0x07 => {
                self.write_half_word(address & !3, value as u16);
                self.write_half_word((address & !3) | 2, (value >> 16) as u16);
            }
            0x04 => {
                let offset = address & 0x00FF_FFFC;
                self.write_io(offset, value as u16);
                self.write_io(offset + 2, (value >> 16) as u16);
            }
            0x0D if self.eeprom_mapped(address) => {
                self.backup.write_eeprom(value as u16, self.dma_active_count);
            }
            0x0E | 0x0F => self.backup.write(address, value as u8),
            _ => tracing::trace!("word write ignored at {address:08X}"),
        }
    }

    /// Halfword I/O read. Write-only and unused registers read as 0.
    fn read_io(&self, offset: u32) -> u16 {
        if offset as usize >= IO_REGISTERS_SIZE || !is_readable(offset) {
            return 0;
        }

        if (TIMER_BASE..TIMER_BASE + 0x10).contains(&offset) {
            let index = ((offset - TIMER_BASE) / 4) as usize;
            return if offset & 2 == 0 {
                self.timers.timers[index].counter_at(self.scheduler.total_ticks)
            } else {
                self.timers.control(index)
            };
        }

        self.io.get(offset)
    }

    fn write_io_byte(&mut self, offset: u32, value: u8) {
        if offset as usize >= IO_REGISTERS_SIZE {
            return;
        }

        match offset {
            0x300 => {
                let flag = (self.io.get(POSTFLG) & 0xFF00) | u16::from(value & 1);
                self.io.set(POSTFLG, flag);
            }
            0x301 => {
                self.trace.on_io_write(POSTFLG, u16::from(value) << 8);
                self.enter_low_power(value);
            }
            0x202 | 0x203 => self.write_io(IF, u16::from(value) << ((offset & 1) * 8)),
            0xA0..=0xA3 => self.sound.write_fifo(Fifo::A, &[value]),
            0xA4..=0xA7 => self.sound.write_fifo(Fifo::B, &[value]),
            _ => {
                let aligned = offset & !1;
                let mut merged = self.io.get(aligned);
                merged.set_byte((offset & 1) as u8, value);
                self.write_io(aligned, merged);
            }
        }
    }

    /// Halfword I/O write, dispatched through [`io_registers::WRITE_HANDLERS`].
    pub fn write_io(&mut self, offset: u32, value: u16) {
        if offset as usize >= IO_REGISTERS_SIZE {
            return;
        }
        self.trace.on_io_write(offset, value);

        match IoRegisters::handler(offset) {
            WriteHandler::Store(mask) => self.io.set(offset, value & mask),
            WriteHandler::ReadOnly => {}
            WriteHandler::DisplayStatus => {
                let status = self.io.get(DISPSTAT);
                self.io.set(DISPSTAT, (value & 0xFF38) | (status & 0b111));
            }
            WriteHandler::DmaControl(channel) => self.write_dma_control(channel, value),
            WriteHandler::TimerReload(timer) => {
                self.timers.write_reload(timer, value);
                self.io.set(offset, value);
            }
            WriteHandler::TimerControl(timer) => {
                self.timers.write_control(timer, value);
                self.io.set(offset, self.timers.control(timer));
                self.scheduler.force_event();
            }
            WriteHandler::SoundFifo(fifo) => self.sound.write_fifo(fifo, &value.to_le_bytes()),
            WriteHandler::SoundControlHigh => {
                let stored = self.sound.write_control_high(value);
                self.io.set(offset, stored);
            }
            WriteHandler::SerialControl => {
                let outcome = serial::write_control(value);
                self.io.set(SIOCNT, outcome.control);
                if let Some(data) = outcome.data {
                    self.io.set(SIODATA8, data);
                }
                if outcome.interrupt {
                    self.io.request_interrupt(Interrupt::Serial as u16);
                    self.scheduler.force_event();
                }
            }
            WriteHandler::InterruptEnable => {
                self.io.set(IE, value & 0x3FFF);
                if self.io.interrupt_master_enable() && self.io.pending_interrupts() != 0 {
                    self.scheduler.force_event();
                }
            }
            WriteHandler::InterruptAcknowledge => {
                let requested = self.io.get(IF);
                self.io.set(IF, requested ^ (value & requested));
            }
            WriteHandler::WaitControl => {
                self.wait_states.update_from_waitcnt(value);
                self.io.set(WAITCNT, value & 0x7FFF);
            }
            WriteHandler::MasterEnable => {
                self.io.set(IME, value & 1);
                self.scheduler.force_event();
            }
            WriteHandler::PowerControl => {
                self.io.set(POSTFLG, value & 1);
                self.enter_low_power((value >> 8) as u8);
            }
        }
    }

    /// HALTCNT: bit 7 selects Stop instead of Halt.
    fn enter_low_power(&mut self, value: u8) {
        if value.is_bit_on(7) {
            tracing::debug!("CPU stopped");
            self.scheduler.stopped = true;
        } else {
            self.scheduler.halted = true;
        }
        self.scheduler.force_event();
    }

    fn write_dma_control(&mut self, channel: usize, value: u16) {
        let base = DMA_BASE + channel as u32 * DMA_STRIDE;
        // Bit 11 (Game Pak DRQ) only exists on channel 3.
        let value = value & if channel == 3 { 0xFFE0 } else { 0xF7E0 };
        let previous = self.io.get(base + dma_offset::CONTROL);
        self.io.set(base + dma_offset::CONTROL, value);

        if previous.is_bit_off(15) && value.is_bit_on(15) {
            self.dma.channels[channel] = DmaChannel {
                source: self.io.get_word(base + dma_offset::SOURCE_LOW),
                destination: self.io.get_word(base + dma_offset::DESTINATION_LOW),
            };
            self.check_dma(DmaTrigger::Immediate, 1 << channel);
        }
    }

    /// Runs, in priority order, the channels of `channels` (bit mask) that
    /// wait for `trigger`.
    pub fn check_dma(&mut self, trigger: DmaTrigger, channels: u8) {
        for channel in 0..4 {
            if channels.is_bit_off(channel as u8) {
                continue;
            }

            let base = DMA_BASE + channel as u32 * DMA_STRIDE;
            let control = DmaControl(self.io.get(base + dma_offset::CONTROL));
            let count = self.io.get(base + dma_offset::COUNT);
            if let Some(transfer) = Dma::plan(channel, control, count, trigger) {
                self.run_transfer(&transfer, control, trigger);
            }
        }
    }

    fn run_transfer(&mut self, transfer: &Transfer, control: DmaControl, trigger: DmaTrigger) {
        let channel = transfer.channel;
        let DmaChannel {
            mut source,
            mut destination,
        } = self.dma.channels[channel];

        let (source_step, destination_step) = if transfer.word {
            source &= !3;
            destination &= !3;
            (transfer.source_step, transfer.destination_step)
        } else {
            source &= !1;
            destination &= !1;
            (transfer.source_step >> 1, transfer.destination_step >> 1)
        };

        tracing::trace!(
            "DMA{channel} {trigger:?}: {} x{} {source:08X} -> {destination:08X}",
            if transfer.word { "word" } else { "halfword" },
            transfer.count
        );

        let cycles = transfer.cycles(source, destination, &self.wait_states);
        // BIOS contents cannot be copied from outside the BIOS.
        let from_bios = source < 0x0200_0000 && self.executing_pc >> 24 != 0;

        self.dma_active_count = transfer.count;
        for _ in 0..transfer.count {
            if transfer.word {
                let value = if from_bios { 0 } else { self.read_word(source) };
                self.write_word(destination, value);
            } else {
                let value = if from_bios { 0 } else { self.read_half_word(source) };
                self.write_half_word(destination, value);
            }
            if !from_bios {
                source = source.wrapping_add_signed(source_step);
            }
            destination = destination.wrapping_add_signed(destination_step);
        }
        self.dma_active_count = 0;
        self.scheduler.dma_ticks += cycles;

        let base = DMA_BASE + channel as u32 * DMA_STRIDE;
        self.dma.channels[channel] = DmaChannel {
            source,
            destination,
        };

        if control.irq_enabled() {
            self.io.request_interrupt((Interrupt::Dma0 as u16) << channel);
        }
        if control.repeat() && control.destination_control() == AddressControl::IncrementReload {
            self.dma.channels[channel].destination =
                self.io.get_word(base + dma_offset::DESTINATION_LOW);
        }
        if !control.repeat() || trigger == DmaTrigger::Immediate {
            self.io.set(base + dma_offset::CONTROL, control.0 & 0x7FFF);
        }

        self.scheduler.force_event();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::cpu::hardware::internal_memory::BIOS_SIZE;
    use crate::options::{FlashSize, SaveType};

    fn bus_with_rom(rom: Vec<u8>) -> Bus {
        Bus::with_memory(InternalMemory::new(vec![0; BIOS_SIZE], rom), false)
    }

    #[test]
    fn check_ram_mirrors() {
        let mut bus = Bus::default();
        bus.write_word(0x0200_0010, 0xDEAD_BEEF);
        assert_eq!(bus.read_word(0x0204_0010), 0xDEAD_BEEF);
        assert_eq!(bus.read_half_word(0x02FC_0012), 0xDEAD);

        bus.write_byte(0x0300_8001, 0x42);
        assert_eq!(bus.read_byte(0x0300_0001), 0x42);
        assert_eq!(bus.memory.working_iram[1], 0x42);
    }

    #[test]
    fn check_unmapped_reads_zero() {
        let mut bus = Bus::default();
        bus.write_word(0x1000_0000, 0xFFFF_FFFF);
        assert_eq!(bus.read_word(0x1000_0000), 0);
        assert_eq!(bus.read_byte(0x0100_0000), 0);
    }

    #[test]
    fn check_rom_is_read_only() {
        let mut bus = bus_with_rom(vec![0x11, 0x22, 0x33, 0x44]);
        bus.write_word(0x0800_0000, 0);
        assert_eq!(bus.read_word(0x0800_0000), 0x4433_2211);
        assert_eq!(bus.read_word(0x0A00_0000), 0x4433_2211);
        // Open bus past the image.
        assert_eq!(bus.read_half_word(0x0800_0010), 0x0008);
    }

    #[test]
    fn check_bios_protection() {
        let mut bios = vec![0; BIOS_SIZE];
        bios[0x10..0x14].copy_from_slice(&0x1234_5678_u32.to_le_bytes());
        let mut bus = Bus::with_memory(InternalMemory::new(bios, vec![]), true);

        bus.set_executing_pc(0x0000_0100);
        assert_eq!(bus.read_word(0x10), 0x1234_5678);

        bus.set_bios_latch(0xE3A0_2004);
        bus.set_executing_pc(0x0800_0000);
        assert_eq!(bus.read_word(0x10), 0xE3A0_2004);
        assert_eq!(bus.read_half_word(0x12), 0xE3A0);
    }

    #[test]
    fn check_byte_writes_to_video_memory() {
        let mut bus = Bus::default();

        bus.write_byte(0x0500_0003, 0x7C);
        assert_eq!(bus.read_half_word(0x0500_0002), 0x7C7C);

        bus.write_byte(0x0600_0001, 0x12);
        assert_eq!(bus.read_half_word(0x0600_0000), 0x1212);

        bus.write_byte(0x0601_0000, 0x12);
        assert_eq!(bus.read_half_word(0x0601_0000), 0);

        bus.write_byte(0x0700_0000, 0x12);
        assert_eq!(bus.read_half_word(0x0700_0000), 0);

        // In bitmap modes BG data reaches 0x14000.
        bus.write_half_word(0x0400_0000, 3);
        bus.write_byte(0x0601_0000, 0x34);
        assert_eq!(bus.read_half_word(0x0601_0000), 0x3434);
    }

    #[test]
    fn check_vram_upper_mirror() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0601_8004, 0xBEEF);
        assert_eq!(bus.read_half_word(0x0601_0004), 0xBEEF);
    }

    #[test]
    fn check_io_masks_and_read_only() {
        let mut bus = Bus::default();

        bus.write_half_word(0x0400_0006, 55);
        assert_eq!(bus.read_half_word(0x0400_0006), 0);

        bus.write_half_word(0x0400_0004, 0xFFFF);
        assert_eq!(bus.read_half_word(0x0400_0004), 0xFF38);

        // Scroll registers are write-only.
        bus.write_half_word(0x0400_0010, 0x1FF);
        assert_eq!(bus.io.get(0x10), 0x1FF);
        assert_eq!(bus.read_half_word(0x0400_0010), 0);

        assert_eq!(bus.read_half_word(0x0400_0130), 0x03FF);
        bus.write_half_word(0x0400_0130, 0);
        assert_eq!(bus.read_half_word(0x0400_0130), 0x03FF);
    }

    #[test]
    fn check_interrupt_acknowledge() {
        let mut bus = Bus::default();
        bus.io.request_interrupt(0b1011);

        bus.write_half_word(0x0400_0202, 0b0001);
        assert_eq!(bus.io.get(IF), 0b1010);

        bus.write_byte(0x0400_0202, 0b1000);
        assert_eq!(bus.io.get(IF), 0b0010);
    }

    #[test]
    fn check_ime_forces_event() {
        let mut bus = Bus::default();
        bus.scheduler.total_ticks = 12;
        bus.write_word(0x0400_0208, 1);
        assert!(bus.io.interrupt_master_enable());
        assert_eq!(bus.scheduler.next_event, 12);
    }

    #[test]
    fn check_halt_and_stop() {
        let mut bus = Bus::default();
        bus.write_byte(0x0400_0301, 0);
        assert!(bus.scheduler.halted);

        let mut bus = Bus::default();
        bus.write_byte(0x0400_0301, 0x80);
        assert!(bus.scheduler.stopped);
        assert!(!bus.scheduler.halted);
    }

    #[test]
    fn check_timer_counter_read() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0400_0100, 0xFF00);
        bus.write_half_word(0x0400_0102, 0x00C4);
        // The write is visible at once, the counter starts after the slice.
        assert_eq!(bus.read_half_word(0x0400_0102), 0x00C0);
        assert!(!bus.timers.timers[0].enabled);
        bus.timers.apply_pending_controls();

        assert_eq!(bus.read_half_word(0x0400_0102), 0x00C0);
        bus.scheduler.total_ticks = 0x10;
        assert_eq!(bus.read_half_word(0x0400_0100), 0xFF0F);
    }

    #[test]
    fn check_immediate_dma_to_fixed_destination() {
        let mut bus = Bus::default();
        for (index, value) in [0x1111_1111_u32, 0x2222_2222, 0x3333_3333, 0x4444_4444]
            .into_iter()
            .enumerate()
        {
            bus.write_word(0x0200_0000 + index as u32 * 4, value);
        }

        bus.write_word(0x0400_00D4, 0x0200_0000);
        bus.write_word(0x0400_00D8, 0x0300_0100);
        bus.write_half_word(0x0400_00DC, 4);
        // Enable, 32-bit, destination fixed, immediate.
        bus.write_half_word(0x0400_00DE, 0x8440);

        assert_eq!(bus.read_word(0x0300_0100), 0x4444_4444);
        assert_eq!(bus.read_word(0x0300_0104), 0);
        assert_eq!(bus.io.get(0xDE) & 0x8000, 0);
        assert_eq!(bus.dma.channels[3].source, 0x0200_0010);
        assert!(bus.scheduler.dma_ticks > 0);
    }

    #[test]
    fn check_dma_irq_and_halfword_decrement() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0200_0002, 0xAAAA);
        bus.write_half_word(0x0200_0000, 0xBBBB);

        bus.write_word(0x0400_00B0, 0x0200_0002);
        bus.write_word(0x0400_00B4, 0x0300_0000);
        bus.write_half_word(0x0400_00B8, 2);
        // Enable, IRQ, 16-bit, source decrement.
        bus.write_half_word(0x0400_00BA, 0xC080);

        assert_eq!(bus.read_half_word(0x0300_0000), 0xAAAA);
        assert_eq!(bus.read_half_word(0x0300_0002), 0xBBBB);
        assert_eq!(bus.io.get(IF), Interrupt::Dma0 as u16);
    }

    #[test]
    fn check_hblank_repeat_reloads_destination() {
        let mut bus = Bus::default();
        for index in 0..4 {
            bus.write_word(0x0200_0500 + index * 4, 0x1000 + index);
        }

        bus.write_word(0x0400_00B0, 0x0200_0500);
        bus.write_word(0x0400_00B4, 0x0300_0000);
        bus.write_half_word(0x0400_00B8, 2);
        // Enable, HBlank, 32-bit, repeat, destination increment/reload.
        bus.write_half_word(0x0400_00BA, 0xA660);
        assert_eq!(bus.read_word(0x0300_0000), 0);

        bus.check_dma(DmaTrigger::VBlank, 0x0F);
        assert_eq!(bus.read_word(0x0300_0000), 0);

        bus.check_dma(DmaTrigger::HBlank, 0x0F);
        assert_eq!(bus.read_word(0x0300_0000), 0x1000);
        assert_eq!(bus.read_word(0x0300_0004), 0x1001);
        assert_eq!(bus.dma.channels[0].source, 0x0200_0508);
        assert_eq!(bus.dma.channels[0].destination, 0x0300_0000);
        assert_eq!(bus.io.get(0xBA), 0xA660);

        bus.check_dma(DmaTrigger::HBlank, 0x0F);
        assert_eq!(bus.read_word(0x0300_0000), 0x1002);
        assert_eq!(bus.read_word(0x0300_0004), 0x1003);
        assert_eq!(bus.read_word(0x0300_0008), 0);
    }

    #[test]
    fn check_vblank_dma_runs_in_channel_order() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0200_0000, 0x1111);
        bus.write_half_word(0x0200_0010, 0x2222);

        for (channel, source) in [(0, 0x0200_0000_u32), (1, 0x0200_0010)] {
            let base = 0x0400_00B0 + channel * 12;
            bus.write_word(base, source);
            bus.write_word(base + 4, 0x0300_0040);
            bus.write_half_word(base + 8, 1);
            // Enable, IRQ, VBlank, 16-bit.
            bus.write_half_word(base + 10, 0xD000);
        }

        bus.check_dma(DmaTrigger::VBlank, 0x0F);

        // Channel 1 runs last and leaves its value.
        assert_eq!(bus.read_half_word(0x0300_0040), 0x2222);
        assert_eq!(bus.io.get(IF), Interrupt::Dma0 as u16 | Interrupt::Dma1 as u16);
        assert_eq!(bus.io.get(0xBA) & 0x8000, 0);
        assert_eq!(bus.io.get(0xC6) & 0x8000, 0);

        bus.write_half_word(0x0300_0040, 0);
        bus.check_dma(DmaTrigger::VBlank, 0x0F);
        assert_eq!(bus.read_half_word(0x0300_0040), 0);
    }

    #[test]
    fn check_immediate_repeat_clears_enable() {
        let mut bus = Bus::default();
        bus.write_word(0x0400_00D4, 0x0200_0000);
        bus.write_word(0x0400_00D8, 0x0300_0000);
        bus.write_half_word(0x0400_00DC, 1);
        bus.write_half_word(0x0400_00DE, 0x8200);
        assert_eq!(bus.io.get(0xDE), 0x0200);
    }

    #[test]
    fn check_dma_from_bios_writes_zeros() {
        let mut bus = Bus::default();
        bus.write_word(0x0300_0000, 0xFFFF_FFFF);
        bus.set_executing_pc(0x0800_0000);

        bus.write_word(0x0400_00D4, 0x0000_0000);
        bus.write_word(0x0400_00D8, 0x0300_0000);
        bus.write_half_word(0x0400_00DC, 1);
        bus.write_half_word(0x0400_00DE, 0x8400);

        assert_eq!(bus.read_word(0x0300_0000), 0);
    }

    #[test]
    fn check_fifo_writes() {
        let mut bus = Bus::default();
        bus.write_word(0x0400_00A0, 0x0403_0201);
        bus.write_byte(0x0400_00A4, 9);
        assert_eq!(bus.sound.fifo_len(Fifo::A), 4);
        assert_eq!(bus.sound.fifo_len(Fifo::B), 1);
    }

    #[test]
    fn check_serial_transfer_completes() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0400_0128, 0x4081);
        assert_eq!(bus.io.get(SIOCNT) & 0x80, 0);
        assert_eq!(bus.io.get(SIODATA8), 0xFF);
        assert_eq!(bus.io.get(IF), Interrupt::Serial as u16);
    }

    #[test]
    fn check_waitcnt_changes_rom_timing() {
        let mut bus = Bus::default();
        assert_eq!(bus.access_cycles(0x0800_0000, Width::HalfWord, Access::NonSequential), 5);

        bus.write_half_word(0x0400_0204, 0x4017);
        assert_eq!(bus.access_cycles(0x0800_0000, Width::HalfWord, Access::NonSequential), 4);
        assert_eq!(bus.code_cycles(0x0800_0002, Width::HalfWord, Access::Sequential), 1);
        assert_eq!(bus.read_half_word(0x0400_0204), 0x4017);
    }

    #[test]
    fn check_backup_windows() {
        let mut bus = bus_with_rom(vec![0; 0x100]);
        bus.backup = BackupMemory::new(SaveType::Flash, FlashSize::Flash64K);

        bus.write_byte(0x0E00_5555, 0xAA);
        bus.write_byte(0x0E00_2AAA, 0x55);
        bus.write_byte(0x0E00_5555, 0x90);
        assert_eq!(bus.read_byte(0x0E00_0000), 0x32);
        assert_eq!(bus.read_half_word(0x0E00_0001), 0x1B1B);

        let mut bus = bus_with_rom(vec![0; 0x100]);
        bus.write_half_word(0x0E00_0000, 0x1234);
        assert_eq!(bus.read_word(0x0E00_0000), 0x3434_3434);
    }
}
