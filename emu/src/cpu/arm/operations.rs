use crate::bitwise::Bits;
use crate::bus::Access;
use crate::cpu::arm::alu_instruction::{
    AluInstructionKind, AluSecondOperandInfo, ArmModeAluInstr, MsrSource, PsrKind, PsrOpKind,
    ShiftOperator, add, add_with_carry, shift, shift_by_register, sub, sub_with_carry,
};
use crate::cpu::arm::instructions::{
    ArmModeInstruction, ArmModeMultiplyLongVariant, ArmModeMultiplyVariant, HalfwordTransferKind,
    SingleDataTransferOffsetInfo,
};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::flags::{
    HalfwordDataTransferOffsetKind, Indexing, LoadStoreKind, Offsetting, ReadWriteKind,
};
use crate::cpu::psr::CpuState;
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER};

const PC: u32 = REG_PROGRAM_COUNTER as u32;

impl Arm7tdmi {
    pub(crate) fn execute_arm(&mut self, instruction: ArmModeInstruction, address: u32) {
        use ArmModeInstruction::{
            BlockDataTransfer, Branch, BranchAndExchange, DataProcessing, HalfwordDataTransfer,
            Multiply, MultiplyLong, PSRTransfer, SingleDataSwap, SingleDataTransfer,
            SoftwareInterrupt, Undefined,
        };

        match instruction {
            DataProcessing {
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
                ..
            } => self.data_processing(alu_instruction, set_conditions, rn, destination, op2),
            PSRTransfer { psr_kind, kind, .. } => self.psr_transfer(psr_kind, kind),
            Multiply {
                variant,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
                ..
            } => self.multiply(
                variant,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
            ),
            MultiplyLong {
                variant,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
                ..
            } => self.multiply_long(
                variant,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
            ),
            SingleDataSwap { byte, rn, rd, rm, .. } => self.single_data_swap(byte, rn, rd, rm),
            BranchAndExchange { register, .. } => self.branch_and_exchange(register as u32),
            HalfwordDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
                ..
            } => self.halfword_data_transfer(
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
            ),
            SingleDataTransfer {
                kind,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
                ..
            } => self.single_data_transfer(
                kind,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
            ),
            BlockDataTransfer {
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
                ..
            } => self.block_data_transfer(
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
            ),
            Branch { link, offset, .. } => self.branch(link, offset),
            SoftwareInterrupt { comment, .. } => self.software_interrupt(comment >> 16, address),
            Undefined { .. } => self.undefined_instruction(address),
        }
    }

    /// Register operand as seen by a shift-by-register instruction (R15 reads as A+12).
    fn reg_with_register_shift(&self, register: u32) -> u32 {
        if register == PC {
            self.reg(PC).wrapping_add(4)
        } else {
            self.reg(register)
        }
    }

    /// Computes operand 2 and the shifter carry out.
    fn second_operand(&mut self, op2: AluSecondOperandInfo) -> (u32, bool) {
        let carry = self.cpsr.carry_flag();
        match op2 {
            AluSecondOperandInfo::Immediate { base, shift } => {
                let value = base.rotate_right(shift);
                let carry_out = if shift == 0 { carry } else { value.get_bit(31) };
                (value, carry_out)
            }
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Immediate(amount),
                shift_kind,
                register,
            } => {
                let result = shift(shift_kind, amount, self.reg(register), carry);
                (result.result, result.carry)
            }
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(rs),
                shift_kind,
                register,
            } => {
                self.idle(1);
                let amount = self.reg(rs) & 0xFF;
                let rm = self.reg_with_register_shift(register);
                let result = shift_by_register(shift_kind, amount, rm, carry);
                (result.result, result.carry)
            }
        }
    }

    fn data_processing(
        &mut self,
        alu_instruction: ArmModeAluInstr,
        set_conditions: bool,
        rn: u32,
        destination: u32,
        op2: AluSecondOperandInfo,
    ) {
        let register_shift = matches!(
            op2,
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(_),
                ..
            }
        );
        let (op2, shifter_carry) = self.second_operand(op2);
        let op1 = if register_shift {
            self.reg_with_register_shift(rn)
        } else {
            self.reg(rn)
        };
        let carry = self.cpsr.carry_flag();

        use ArmModeAluInstr::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };
        let arithmetic = match alu_instruction {
            Sub | Cmp => Some(sub(op1, op2)),
            Rsb => Some(sub(op2, op1)),
            Add | Cmn => Some(add(op1, op2)),
            Adc => Some(add_with_carry(op1, op2, carry)),
            Sbc => Some(sub_with_carry(op1, op2, carry)),
            Rsc => Some(sub_with_carry(op2, op1, carry)),
            And | Eor | Tst | Teq | Orr | Mov | Bic | Mvn => None,
        };
        let result = match alu_instruction {
            And | Tst => op1 & op2,
            Eor | Teq => op1 ^ op2,
            Orr => op1 | op2,
            Mov => op2,
            Bic => op1 & !op2,
            Mvn => !op2,
            _ => arithmetic.map_or(0, |r| r.result),
        };

        if set_conditions {
            if destination == PC && alu_instruction.writes_result() {
                self.restore_cpsr_from_spsr();
            } else {
                match (alu_instruction.kind(), arithmetic) {
                    (AluInstructionKind::Arithmetic, Some(flags)) => self.cpsr.set_flags(&flags),
                    _ => {
                        self.cpsr.set_sign_zero(result);
                        self.cpsr.set_carry_flag(shifter_carry);
                    }
                }
            }
        }

        if alu_instruction.writes_result() {
            self.set_reg(destination, result);
        }
    }

    fn psr_transfer(&mut self, psr_kind: PsrKind, kind: PsrOpKind) {
        let mode = self.cpsr.mode();
        match kind {
            PsrOpKind::Mrs {
                destination_register,
            } => {
                let value = match psr_kind {
                    PsrKind::Cpsr => u32::from(self.cpsr),
                    PsrKind::Spsr => self
                        .register_bank
                        .spsr(mode)
                        .map_or_else(|| u32::from(self.cpsr), u32::from),
                };
                self.set_reg(destination_register, value);
            }
            PsrOpKind::Msr { field_mask, source } => {
                let value = match source {
                    MsrSource::Register(register) => self.reg(register),
                    MsrSource::Immediate { base, shift } => base.rotate_right(shift),
                };
                let mask = PsrOpKind::byte_mask(field_mask);
                match psr_kind {
                    PsrKind::Cpsr => self.write_cpsr(value, mask),
                    PsrKind::Spsr => {
                        if let Some(mut spsr) = self.register_bank.spsr(mode) {
                            spsr.write_masked(value, mask);
                            self.register_bank.set_spsr(mode, spsr);
                        }
                    }
                }
            }
        }
    }

    fn multiply(
        &mut self,
        variant: ArmModeMultiplyVariant,
        should_set_codes: bool,
        rd: u32,
        rn: u32,
        rs: u32,
        rm: u32,
    ) {
        let rs_value = self.reg(rs);
        let mut result = self.reg(rm).wrapping_mul(rs_value);
        let mut cycles = Self::multiply_cycles(rs_value);

        if variant == ArmModeMultiplyVariant::Mla {
            result = result.wrapping_add(self.reg(rn));
            cycles += 1;
        }
        self.idle(cycles);

        if should_set_codes {
            self.cpsr.set_sign_zero(result);
        }
        self.set_reg(rd, result);
    }

    fn multiply_long(
        &mut self,
        variant: ArmModeMultiplyLongVariant,
        should_set_codes: bool,
        rd_hi: u32,
        rd_lo: u32,
        rs: u32,
        rm: u32,
    ) {
        let rs_value = self.reg(rs);
        let rm_value = self.reg(rm);
        let accumulate = (u64::from(self.reg(rd_hi)) << 32) | u64::from(self.reg(rd_lo));

        let (result, extra) = match variant {
            ArmModeMultiplyLongVariant::Umull => (u64::from(rm_value) * u64::from(rs_value), 1),
            ArmModeMultiplyLongVariant::Umlal => (
                (u64::from(rm_value) * u64::from(rs_value)).wrapping_add(accumulate),
                2,
            ),
            ArmModeMultiplyLongVariant::Smull => {
                ((i64::from(rm_value as i32) * i64::from(rs_value as i32)) as u64, 1)
            }
            ArmModeMultiplyLongVariant::Smlal => (
                ((i64::from(rm_value as i32) * i64::from(rs_value as i32)) as u64)
                    .wrapping_add(accumulate),
                2,
            ),
        };
        self.idle(Self::multiply_cycles(rs_value) + extra);

        if should_set_codes {
            self.cpsr.set_sign_flag(result.get_bit(63));
            self.cpsr.set_zero_flag(result == 0);
        }
        self.set_reg(rd_lo, result as u32);
        self.set_reg(rd_hi, (result >> 32) as u32);
    }

    fn single_data_swap(&mut self, byte: bool, rn: u32, rd: u32, rm: u32) {
        let address = self.reg(rn);
        let source = self.reg(rm);

        let loaded = if byte {
            let loaded = self.load_byte(address);
            self.store_byte(address, source);
            loaded
        } else {
            let loaded = self.load_word(address, Access::NonSequential);
            self.store_word(address, source, Access::NonSequential);
            loaded
        };
        self.idle(1);
        self.set_reg(rd, loaded);
    }

    fn branch_and_exchange(&mut self, register: u32) {
        let target = self.reg(register);
        if target.is_bit_on(0) {
            self.cpsr.set_cpu_state(CpuState::Thumb);
        } else {
            self.cpsr.set_cpu_state(CpuState::Arm);
        }
        self.branch_to(target);
    }

    fn branch(&mut self, link: bool, offset: u32) {
        let pc = self.reg(PC);
        if link {
            self.set_reg(REG_LR as u32, pc.wrapping_sub(4));
        }
        self.branch_to(pc.wrapping_add(offset));
    }

    /// Value of a register stored to memory, R15 stores A+12.
    fn stored_value(&self, register: u32) -> u32 {
        if register == PC {
            self.reg(PC).wrapping_add(4)
        } else {
            self.reg(register)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn halfword_data_transfer(
        &mut self,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store_kind: LoadStoreKind,
        offset_kind: HalfwordDataTransferOffsetKind,
        base_register: u32,
        rd: u32,
        transfer_kind: HalfwordTransferKind,
    ) {
        let offset = match offset_kind {
            HalfwordDataTransferOffsetKind::Immediate { offset } => offset,
            HalfwordDataTransferOffsetKind::Register { register } => self.reg(register),
        };
        let base = self.reg(base_register);
        let offset_address = offsetting.apply(base, offset);
        let address = match indexing {
            Indexing::Pre => offset_address,
            Indexing::Post => base,
        };

        match load_store_kind {
            LoadStoreKind::Store => {
                let value = self.stored_value(rd);
                self.store_half_word(address, value);
                if indexing == Indexing::Post || write_back {
                    self.set_reg(base_register, offset_address);
                }
            }
            LoadStoreKind::Load => {
                let value = match transfer_kind {
                    HalfwordTransferKind::UnsignedHalfwords => self.load_half_word(address),
                    HalfwordTransferKind::SignedByte => self.load_signed_byte(address),
                    HalfwordTransferKind::SignedHalfwords => self.load_signed_half_word(address),
                };
                self.idle(1);
                if indexing == Indexing::Post || write_back {
                    self.set_reg(base_register, offset_address);
                }
                self.set_reg(rd, value);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn single_data_transfer(
        &mut self,
        kind: LoadStoreKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        rd: u32,
        base_register: u32,
        offset_info: SingleDataTransferOffsetInfo,
        offsetting: Offsetting,
    ) {
        let offset = match offset_info {
            SingleDataTransferOffsetInfo::Immediate { offset } => offset,
            SingleDataTransferOffsetInfo::RegisterImmediate {
                shift_amount,
                shift_kind,
                reg_offset,
            } => {
                shift(
                    shift_kind,
                    shift_amount,
                    self.reg(reg_offset),
                    self.cpsr.carry_flag(),
                )
                .result
            }
        };
        let base = self.reg(base_register);
        let offset_address = offsetting.apply(base, offset);
        let address = match indexing {
            Indexing::Pre => offset_address,
            Indexing::Post => base,
        };

        match kind {
            LoadStoreKind::Store => {
                let value = self.stored_value(rd);
                match quantity {
                    ReadWriteKind::Word => self.store_word(address, value, Access::NonSequential),
                    ReadWriteKind::Byte => self.store_byte(address, value),
                }
                if indexing == Indexing::Post || write_back {
                    self.set_reg(base_register, offset_address);
                }
            }
            LoadStoreKind::Load => {
                let value = match quantity {
                    ReadWriteKind::Word => self.load_word(address, Access::NonSequential),
                    ReadWriteKind::Byte => self.load_byte(address),
                };
                self.idle(1);
                if indexing == Indexing::Post || write_back {
                    self.set_reg(base_register, offset_address);
                }
                self.set_reg(rd, value);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn block_data_transfer(
        &mut self,
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: u32,
        register_list: u32,
    ) {
        // An empty list transfers R15 and moves the base by 0x40.
        let (register_list, transfer_size) = if register_list & 0xFFFF == 0 {
            (1 << PC, 0x40)
        } else {
            (register_list, (register_list & 0xFFFF).count_ones() * 4)
        };

        let base = self.reg(rn);
        let (start, new_base) = match (offsetting, indexing) {
            (Offsetting::Up, Indexing::Post) => (base, base.wrapping_add(transfer_size)),
            (Offsetting::Up, Indexing::Pre) => (base.wrapping_add(4), base.wrapping_add(transfer_size)),
            (Offsetting::Down, Indexing::Post) => (
                base.wrapping_sub(transfer_size).wrapping_add(4),
                base.wrapping_sub(transfer_size),
            ),
            (Offsetting::Down, Indexing::Pre) => {
                (base.wrapping_sub(transfer_size), base.wrapping_sub(transfer_size))
            }
        };

        let loads_pc = load_store == LoadStoreKind::Load && register_list.is_bit_on(15);
        // With S set and no PC load, the User bank is transferred.
        let user_bank = load_psr && !loads_pc;
        let mode = self.cpsr.mode();
        if user_bank {
            self.switch_mode(Mode::System);
        }

        let first_register = register_list.trailing_zeros();
        let mut address = start;
        let mut access = Access::NonSequential;
        let mut base_loaded = false;

        for register in (0..16).filter(|r| register_list.is_bit_on(*r)) {
            let register = u32::from(register);
            match load_store {
                LoadStoreKind::Store => {
                    let value = if register == rn && register != first_register && write_back {
                        new_base
                    } else {
                        self.stored_value(register)
                    };
                    self.store_word(address, value, access);
                }
                LoadStoreKind::Load => {
                    let value = self.load_word(address & !3, access);
                    if register == PC {
                        if load_psr {
                            self.restore_cpsr_from_spsr();
                        }
                        self.branch_to(value);
                    } else {
                        base_loaded |= register == rn;
                        self.set_reg(register, value);
                    }
                }
            }
            address = address.wrapping_add(4);
            access = Access::Sequential;
        }

        if user_bank {
            self.switch_mode(mode);
        }
        if load_store == LoadStoreKind::Load {
            self.idle(1);
        }
        if write_back && !base_loaded {
            self.set_reg(rn, new_base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::psr::Psr;
    use crate::cpu::registers::REG_SP;
    use pretty_assertions::assert_eq;

    const CODE: u32 = 0x0300_0000;

    fn cpu_with_program(program: &[u32]) -> Arm7tdmi {
        let mut cpu = Arm7tdmi::default();
        cpu.reset(CODE, false);
        for (i, op_code) in program.iter().enumerate() {
            cpu.bus.write_word(CODE + (i as u32) * 4, *op_code);
        }
        cpu
    }

    #[test]
    fn check_mov_add_and_flags() {
        // mov r0, #1 ; mvn r1, #0 ; adds r2, r0, r1
        let mut cpu = cpu_with_program(&[0xE3A0_0001, 0xE3E0_1000, 0xE090_2001]);
        cpu.step();
        cpu.step();
        cpu.step();

        assert_eq!(cpu.reg(2), 0);
        assert!(cpu.cpsr.zero_flag());
        assert!(cpu.cpsr.carry_flag());
        assert!(!cpu.cpsr.overflow_flag());
        assert_eq!(cpu.next_instruction_address(), CODE + 12);
    }

    #[test]
    fn check_cmp_sets_carry_when_no_borrow() {
        // mov r0, #5 ; cmp r0, #3 ; movcs r1, #1
        let mut cpu = cpu_with_program(&[0xE3A0_0005, 0xE350_0003, 0x23A0_1001]);
        cpu.step();
        cpu.step();
        cpu.step();

        assert!(cpu.cpsr.carry_flag());
        assert_eq!(cpu.reg(1), 1);
    }

    #[test]
    fn check_pc_reads_two_instructions_ahead() {
        // mov r0, pc ; add r1, pc, r2, lsl r3
        let mut cpu = cpu_with_program(&[0xE1A0_000F, 0xE08F_1312]);
        cpu.step();
        cpu.step();

        assert_eq!(cpu.reg(0), CODE + 8);
        assert_eq!(cpu.reg(1), CODE + 4 + 12);
    }

    #[test]
    fn check_branch_with_link() {
        // bl +8
        let mut cpu = cpu_with_program(&[0xEB00_0002]);
        cpu.step();

        assert_eq!(cpu.reg(REG_LR as u32), CODE + 4);
        assert_eq!(cpu.next_instruction_address(), CODE + 16);
    }

    #[test]
    fn check_bx_to_thumb() {
        // add r0, pc, #1 ; bx r0
        let mut cpu = cpu_with_program(&[0xE28F_0001, 0xE12F_FF10]);
        cpu.step();
        cpu.step();

        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Thumb);
        assert_eq!(cpu.next_instruction_address(), CODE + 8);
    }

    #[test]
    fn check_load_store_word() {
        // mov r1, #0x02000000 ; ldr r0, =... via mvn ; str r0, [r1, #4]! ; ldrb r2, [r1]
        let mut cpu = cpu_with_program(&[0xE3A0_1402, 0xE3E0_0000, 0xE5A1_0004, 0xE5D1_2000]);
        for _ in 0..4 {
            cpu.step();
        }

        assert_eq!(cpu.bus.read_word(0x0200_0004), 0xFFFF_FFFF);
        assert_eq!(cpu.reg(1), 0x0200_0004);
        assert_eq!(cpu.reg(2), 0xFF);
    }

    #[test]
    fn check_unaligned_word_load_rotates() {
        // mov r1, #0x02000000 ; ldr r0, [r1, #1]
        let mut cpu = cpu_with_program(&[0xE3A0_1402, 0xE591_0001]);
        cpu.bus.write_word(0x0200_0000, 0x1122_3344);
        cpu.step();
        cpu.step();

        assert_eq!(cpu.reg(0), 0x4411_2233);
    }

    #[test]
    fn check_push_pop() {
        // stmdb sp!, {r0-r3, r12, lr} ; ldmia sp!, {r4-r7}
        let mut cpu = cpu_with_program(&[0xE92D_500F, 0xE8BD_00F0]);
        for r in 0..4 {
            cpu.set_reg(r, r + 10);
        }
        let sp = cpu.reg(REG_SP as u32);
        cpu.step();
        assert_eq!(cpu.reg(REG_SP as u32), sp - 24);
        cpu.step();

        assert_eq!(cpu.reg(REG_SP as u32), sp - 8);
        for r in 4..8 {
            assert_eq!(cpu.reg(r), r + 6);
        }
    }

    #[test]
    fn check_multiply_long_signed() {
        // mvn r2, #1 (r2 = -2) ; mov r3, #3 ; smull r0, r1, r2, r3
        let mut cpu = cpu_with_program(&[0xE3E0_2001, 0xE3A0_3003, 0xE0C1_0392]);
        for _ in 0..3 {
            cpu.step();
        }

        assert_eq!(cpu.reg(0), (-6_i32) as u32);
        assert_eq!(cpu.reg(1), 0xFFFF_FFFF);
    }

    #[test]
    fn check_msr_switches_mode() {
        // mov r0, #0x12 ; msr cpsr_c, r0 ; mrs r1, cpsr
        let mut cpu = cpu_with_program(&[0xE3A0_0012, 0xE121_F000, 0xE10F_1000]);
        cpu.step();
        cpu.step();
        cpu.step();

        assert_eq!(cpu.cpsr.mode(), Mode::Irq);
        assert_eq!(cpu.reg(REG_SP as u32), 0x0300_7FA0);
        assert_eq!(cpu.reg(1) & 0x1F, 0x12);
    }

    #[test]
    fn check_movs_pc_returns_from_exception() {
        // movs pc, lr
        let mut cpu = cpu_with_program(&[0xE1B0_F00E]);
        cpu.switch_mode(Mode::Supervisor);
        let mut spsr = Psr::from(Mode::System);
        spsr.set_cpu_state(CpuState::Thumb);
        cpu.register_bank.set_spsr(Mode::Supervisor, spsr);
        cpu.set_reg(REG_LR as u32, 0x0800_0101);
        cpu.step();

        assert_eq!(cpu.cpsr.mode(), Mode::System);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Thumb);
        assert_eq!(cpu.next_instruction_address(), 0x0800_0100);
    }

    #[test]
    fn check_condition_not_met_skips() {
        // moveq r0, #1 with Z clear
        let mut cpu = cpu_with_program(&[0x03A0_0001]);
        cpu.step();

        assert_eq!(cpu.reg(0), 0);
        assert_eq!(cpu.next_instruction_address(), CODE + 4);
    }
}
