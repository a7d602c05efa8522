//! # Banked Registers for Exception Modes
//!
//! Each exception mode owns its R13 (SP), R14 (LR) and SPSR. FIQ additionally
//! banks R8-R12. The table is indexed by [`Mode::bank_index`], User and
//! System share the first slot.
//!
//! A mode switch copies the outgoing mode's banked registers out of the
//! visible register file and copies the incoming mode's ones in, so nothing
//! ever reads a stale view.

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::Psr;
use crate::cpu::registers::{REG_LR, REG_SP, Registers};

const BANK_SLOTS: usize = 6;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankedRegisters {
    pub r13: u32,
    pub r14: u32,
    pub spsr: Psr,
}

#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBank {
    banks: [BankedRegisters; BANK_SLOTS],
    /// R8-R12 of every mode except FIQ.
    user_r8_r12: [u32; 5],
    /// R8-R12 of FIQ mode.
    fiq_r8_r12: [u32; 5],
}

impl RegisterBank {
    /// Copies the banked registers of `mode` out of the visible register file.
    pub fn store(&mut self, mode: Mode, registers: &Registers) {
        let bank = &mut self.banks[mode.bank_index()];
        bank.r13 = registers.register_at(REG_SP);
        bank.r14 = registers.register_at(REG_LR);

        let high = if mode == Mode::Fiq {
            &mut self.fiq_r8_r12
        } else {
            &mut self.user_r8_r12
        };
        for (i, value) in high.iter_mut().enumerate() {
            *value = registers.register_at(8 + i);
        }
    }

    /// Copies the banked registers of `mode` into the visible register file.
    pub fn restore(&self, mode: Mode, registers: &mut Registers) {
        let bank = &self.banks[mode.bank_index()];
        registers.set_register_at(REG_SP, bank.r13);
        registers.set_register_at(REG_LR, bank.r14);

        let high = if mode == Mode::Fiq {
            &self.fiq_r8_r12
        } else {
            &self.user_r8_r12
        };
        for (i, value) in high.iter().enumerate() {
            registers.set_register_at(8 + i, *value);
        }
    }

    /// SPSR of `mode`, `None` for User and System.
    #[must_use]
    pub fn spsr(&self, mode: Mode) -> Option<Psr> {
        mode.has_spsr().then(|| self.banks[mode.bank_index()].spsr)
    }

    pub fn set_spsr(&mut self, mode: Mode, psr: Psr) {
        if mode.has_spsr() {
            self.banks[mode.bank_index()].spsr = psr;
        }
    }

    /// Stack pointer stored for a mode that isn't the current one.
    pub fn set_stack_pointer(&mut self, mode: Mode, value: u32) {
        self.banks[mode.bank_index()].r13 = value;
    }

    #[must_use]
    pub fn bank(&self, mode: Mode) -> BankedRegisters {
        self.banks[mode.bank_index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_store_and_restore_fiq() {
        let mut bank = RegisterBank::default();
        let mut registers = Registers::default();
        for i in 0..=14 {
            registers.set_register_at(i, i as u32);
        }

        bank.store(Mode::User, &registers);
        bank.restore(Mode::Fiq, &mut registers);
        for i in 8..=14 {
            assert_eq!(registers.register_at(i), 0);
        }
        assert_eq!(registers.register_at(7), 7);

        registers.set_register_at(8, 0x88);
        bank.store(Mode::Fiq, &registers);
        bank.restore(Mode::User, &mut registers);
        for i in 8..=14 {
            assert_eq!(registers.register_at(i), i as u32);
        }

        bank.restore(Mode::Fiq, &mut registers);
        assert_eq!(registers.register_at(8), 0x88);
    }

    #[test]
    fn check_irq_shares_high_registers() {
        let mut bank = RegisterBank::default();
        let mut registers = Registers::default();
        registers.set_register_at(10, 0xAA);
        registers.set_register_at(REG_SP, 0x0300_7F00);

        bank.set_stack_pointer(Mode::Irq, 0x0300_7FA0);
        bank.store(Mode::System, &registers);
        bank.restore(Mode::Irq, &mut registers);

        assert_eq!(registers.register_at(10), 0xAA);
        assert_eq!(registers.register_at(REG_SP), 0x0300_7FA0);
        assert_eq!(bank.bank(Mode::User).r13, 0x0300_7F00);
    }

    #[test]
    fn check_spsr_per_mode() {
        let mut bank = RegisterBank::default();
        bank.set_spsr(Mode::Irq, Psr::from(0x1F));
        bank.set_spsr(Mode::User, Psr::from(0x10));

        assert_eq!(bank.spsr(Mode::Irq), Some(Psr::from(0x1F)));
        assert_eq!(bank.spsr(Mode::Supervisor), Some(Psr::default()));
        assert_eq!(bank.spsr(Mode::User), None);
    }
}
