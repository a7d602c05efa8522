//! # ARM7TDMI
//!
//! The CPU owns the [`Bus`] and executes one instruction per [`Arm7tdmi::step`],
//! returning how many cycles it took.
//!
//! ```text
//!   step():
//!   ┌─────────┐   ┌──────────┐   ┌────────────────────────┐   ┌───────────┐
//!   │  fetch  │──►│  decode  │──►│ execute with R15 = A+8 │──►│ R15 = A+4 │
//!   │  at A   │   │          │   │ (Thumb: A+4)           │   │ unless it │
//!   └─────────┘   └──────────┘   └────────────────────────┘   │ branched  │
//!                                                             └───────────┘
//! ```
//!
//! Between two instructions R15 holds the address of the next one. Exception
//! entry (IRQ, SWI, undefined) switches mode through the register bank and
//! jumps to the vector.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::{Access, Bus, Width};
use crate::cpu::arm::instructions::ArmModeInstruction;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::register_bank::RegisterBank;
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER, REG_SP, Registers};
use crate::cpu::thumb::instruction::Instruction;

pub const SIZE_OF_ARM_INSTRUCTION: u32 = 4;
pub const SIZE_OF_THUMB_INSTRUCTION: u32 = 2;

/// BIOS opcode latched after returning from an IRQ.
pub const BIOS_LATCH_AFTER_IRQ: u32 = 0xE55E_C002;
/// BIOS opcode latched after returning from a SWI.
pub const BIOS_LATCH_AFTER_SWI: u32 = 0xE3A0_2004;
/// BIOS opcode latched at startup.
pub const BIOS_LATCH_STARTUP: u32 = 0xE129_F000;

const IRQ_VECTOR: u32 = 0x18;
const SWI_VECTOR: u32 = 0x08;
const UNDEFINED_VECTOR: u32 = 0x04;

#[derive(Serialize, Deserialize)]
pub struct Arm7tdmi {
    pub bus: Bus,

    pub cpsr: Psr,
    pub registers: Registers,
    pub register_bank: RegisterBank,

    /// The next code fetch continues the previous one.
    sequential_fetch: bool,

    /// The current instruction wrote R15.
    #[serde(skip)]
    branched: bool,

    /// Cycles charged to the current instruction so far.
    #[serde(skip)]
    pub(crate) cycles: u32,

    /// BIOS calls without a high-level implementation, logged once each.
    #[serde(skip)]
    pub(crate) unsupported_swi: BTreeSet<u32>,

    /// IntrWait is halted and will run again once an IRQ wakes it.
    #[serde(default)]
    pub(crate) intr_wait_pending: bool,
}

impl Default for Arm7tdmi {
    fn default() -> Self {
        Self::new(Bus::default())
    }
}

impl Arm7tdmi {
    #[must_use]
    pub fn new(bus: Bus) -> Self {
        let mut cpsr = Psr::from(Mode::Supervisor);
        cpsr.set_cpu_state(CpuState::Arm);
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);

        Self {
            bus,
            cpsr,
            registers: Registers::default(),
            register_bank: RegisterBank::default(),
            sequential_fetch: false,
            branched: false,
            cycles: 0,
            unsupported_swi: BTreeSet::new(),
            intr_wait_pending: false,
        }
    }

    /// Puts the CPU in its power-on state and jumps to `entry`.
    ///
    /// With `boot_from_bios` the CPU starts in Supervisor mode with IRQs
    /// masked, otherwise it starts in System mode with the stacks the BIOS
    /// would have set up.
    pub fn reset(&mut self, entry: u32, boot_from_bios: bool) {
        self.registers = Registers::default();
        self.register_bank = RegisterBank::default();

        if boot_from_bios {
            let mut cpsr = Psr::from(Mode::Supervisor);
            cpsr.set_irq_disable(true);
            cpsr.set_fiq_disable(true);
            self.cpsr = cpsr;
        } else {
            self.cpsr = Psr::from(Mode::System);
            self.registers.set_register_at(REG_SP, 0x0300_7F00);
            self.register_bank.set_stack_pointer(Mode::Irq, 0x0300_7FA0);
            self.register_bank.set_stack_pointer(Mode::Supervisor, 0x0300_7FE0);
        }

        self.registers.set_program_counter(entry);
        self.sequential_fetch = false;
        self.branched = false;
        self.intr_wait_pending = false;
        self.bus.set_bios_latch(BIOS_LATCH_STARTUP);
    }

    /// Address of the next instruction to execute.
    #[must_use]
    pub const fn next_instruction_address(&self) -> u32 {
        self.registers.program_counter()
    }

    /// Executes one instruction and returns its cost in cycles.
    pub fn step(&mut self) -> u32 {
        match self.cpsr.cpu_state() {
            CpuState::Arm => {
                let address = self.registers.program_counter() & !3;
                self.bus.set_executing_pc(address);
                self.cycles = self
                    .bus
                    .code_cycles(address, Width::Word, self.sequential_fetch.into());
                self.sequential_fetch = true;

                let op_code = self.bus.fetch_arm(address);
                self.bus.trace_instruction(address, op_code, CpuState::Arm);

                self.registers
                    .set_program_counter(address.wrapping_add(2 * SIZE_OF_ARM_INSTRUCTION));
                self.branched = false;

                let instruction = ArmModeInstruction::from(op_code);
                tracing::trace!("{address:08X}: {instruction}");
                if self.cpsr.can_execute(instruction.condition()) {
                    self.execute_arm(instruction, address);
                }

                if !self.branched {
                    self.registers
                        .set_program_counter(address.wrapping_add(SIZE_OF_ARM_INSTRUCTION));
                }
            }
            CpuState::Thumb => {
                let address = self.registers.program_counter() & !1;
                self.bus.set_executing_pc(address);
                self.cycles = self
                    .bus
                    .code_cycles(address, Width::HalfWord, self.sequential_fetch.into());
                self.sequential_fetch = true;

                let op_code = self.bus.fetch_thumb(address);
                self.bus
                    .trace_instruction(address, u32::from(op_code), CpuState::Thumb);

                self.registers
                    .set_program_counter(address.wrapping_add(2 * SIZE_OF_THUMB_INSTRUCTION));
                self.branched = false;

                let instruction = Instruction::from(op_code);
                tracing::trace!("{address:08X}: {instruction}");
                self.execute_thumb(instruction, address);

                if !self.branched {
                    self.registers
                        .set_program_counter(address.wrapping_add(SIZE_OF_THUMB_INSTRUCTION));
                }
            }
        }

        self.cycles
    }

    /// Reads a register as the executing instruction sees it.
    #[must_use]
    pub const fn reg(&self, register: u32) -> u32 {
        self.registers.register_at(register as usize)
    }

    /// Writes a register. Writing R15 is a branch.
    pub fn set_reg(&mut self, register: u32, value: u32) {
        if register as usize == REG_PROGRAM_COUNTER {
            self.branch_to(value);
        } else {
            self.registers.set_register_at(register as usize, value);
        }
    }

    /// Jumps to `address`, aligned for the current state, and refills the pipeline.
    pub fn branch_to(&mut self, address: u32) {
        let (target, width) = match self.cpsr.cpu_state() {
            CpuState::Arm => (address & !3, Width::Word),
            CpuState::Thumb => (address & !1, Width::HalfWord),
        };

        self.registers.set_program_counter(target);
        self.cycles += self.bus.code_cycles(target, width, Access::Sequential);
        self.sequential_fetch = false;
        self.branched = true;
    }

    /// Changes the operating mode, swapping the banked registers.
    pub fn switch_mode(&mut self, new_mode: Mode) {
        let old_mode = self.cpsr.mode();
        if old_mode.bank_index() != new_mode.bank_index() {
            self.register_bank.store(old_mode, &self.registers);
            self.register_bank.restore(new_mode, &mut self.registers);
        }
        self.cpsr.set_mode(new_mode);
    }

    /// Copies SPSR back into CPSR, used by exception returns.
    pub fn restore_cpsr_from_spsr(&mut self) {
        let mode = self.cpsr.mode();
        if let Some(spsr) = self.register_bank.spsr(mode) {
            self.switch_mode(spsr.mode());
            self.cpsr = spsr;
        }
    }

    /// Writes a full PSR value into CPSR, switching mode if the mode bits change.
    /// Mode bits naming no mode are ignored.
    pub fn write_cpsr(&mut self, value: u32, mask: u32) {
        let mut mask = mask & !0x20;
        if self.cpsr.mode() == Mode::User {
            mask &= 0xF000_0000;
        }

        if mask & 0x1F != 0 {
            let mut updated = self.cpsr;
            updated.write_masked(value, mask);
            match Mode::try_from(u32::from(updated) & 0x1F) {
                Ok(mode) => self.switch_mode(mode),
                Err(_) => mask &= !0x1F,
            }
        }
        self.cpsr.write_masked(value, mask);
    }

    fn enter_exception(&mut self, mode: Mode, vector: u32, link: u32) {
        let cpsr = self.cpsr;
        self.switch_mode(mode);
        self.register_bank.set_spsr(mode, cpsr);
        self.registers.set_register_at(REG_LR, link);
        self.cpsr.set_cpu_state(CpuState::Arm);
        self.cpsr.set_irq_disable(true);
        self.branch_to(vector);
    }

    /// Takes the IRQ exception. Called between instructions.
    pub fn interrupt(&mut self) {
        let next = self.registers.program_counter();
        tracing::trace!("IRQ taken, return to 0x{next:08X}");
        self.enter_exception(Mode::Irq, IRQ_VECTOR, next.wrapping_add(4));
        self.bus.set_bios_latch(BIOS_LATCH_AFTER_IRQ);
    }

    /// Software interrupt raised by the instruction at `address`.
    pub(crate) fn software_interrupt(&mut self, number: u32, address: u32) {
        let size = self.instruction_size();
        if self.bus.bios_loaded() {
            self.enter_exception(Mode::Supervisor, SWI_VECTOR, address.wrapping_add(size));
            self.bus.set_bios_latch(BIOS_LATCH_AFTER_SWI);
        } else {
            self.high_level_swi(number, address);
        }
    }

    pub(crate) fn undefined_instruction(&mut self, address: u32) {
        tracing::debug!("undefined instruction at 0x{address:08X}");
        let size = self.instruction_size();
        self.enter_exception(Mode::Undefined, UNDEFINED_VECTOR, address.wrapping_add(size));
    }

    #[must_use]
    pub fn instruction_size(&self) -> u32 {
        match self.cpsr.cpu_state() {
            CpuState::Arm => SIZE_OF_ARM_INSTRUCTION,
            CpuState::Thumb => SIZE_OF_THUMB_INSTRUCTION,
        }
    }

    /// Internal cycles (multiply, shift by register, load writeback).
    pub(crate) fn idle(&mut self, cycles: u32) {
        self.cycles += cycles;
    }

    /// Word load with the rotation of unaligned addresses.
    pub(crate) fn load_word(&mut self, address: u32, access: Access) -> u32 {
        self.cycles += self.bus.access_cycles(address, Width::Word, access);
        let value = self.bus.read_word(address & !3);
        value.rotate_right((address & 3) * 8)
    }

    /// Halfword load, odd addresses rotate the value by a byte.
    pub(crate) fn load_half_word(&mut self, address: u32) -> u32 {
        self.cycles += self
            .bus
            .access_cycles(address, Width::HalfWord, Access::NonSequential);
        let value = u32::from(self.bus.read_half_word(address & !1));
        value.rotate_right((address & 1) * 8)
    }

    /// Signed halfword load, odd addresses load a signed byte.
    pub(crate) fn load_signed_half_word(&mut self, address: u32) -> u32 {
        if address.is_bit_on(0) {
            return self.load_signed_byte(address);
        }
        self.cycles += self
            .bus
            .access_cycles(address, Width::HalfWord, Access::NonSequential);
        u32::from(self.bus.read_half_word(address)).sign_extended(16)
    }

    pub(crate) fn load_byte(&mut self, address: u32) -> u32 {
        self.cycles += self
            .bus
            .access_cycles(address, Width::Byte, Access::NonSequential);
        u32::from(self.bus.read_byte(address))
    }

    pub(crate) fn load_signed_byte(&mut self, address: u32) -> u32 {
        self.load_byte(address).sign_extended(8)
    }

    pub(crate) fn store_word(&mut self, address: u32, value: u32, access: Access) {
        self.cycles += self.bus.access_cycles(address, Width::Word, access);
        self.bus.write_word(address & !3, value);
    }

    pub(crate) fn store_half_word(&mut self, address: u32, value: u32) {
        self.cycles += self
            .bus
            .access_cycles(address, Width::HalfWord, Access::NonSequential);
        self.bus.write_half_word(address & !1, value as u16);
    }

    pub(crate) fn store_byte(&mut self, address: u32, value: u32) {
        self.cycles += self
            .bus
            .access_cycles(address, Width::Byte, Access::NonSequential);
        self.bus.write_byte(address, value as u8);
    }

    /// Cycles of a multiply by `rs`: fewer when the upper bytes are all 0 or all 1.
    #[must_use]
    pub(crate) const fn multiply_cycles(rs: u32) -> u32 {
        let rs = if rs & 0x8000_0000 != 0 { !rs } else { rs };
        if rs & 0xFFFF_FF00 == 0 {
            1
        } else if rs & 0xFFFF_0000 == 0 {
            2
        } else if rs & 0xFF00_0000 == 0 {
            3
        } else {
            4
        }
    }

    #[must_use]
    pub const fn stack_pointer(&self) -> u32 {
        self.registers.register_at(REG_SP)
    }
}
