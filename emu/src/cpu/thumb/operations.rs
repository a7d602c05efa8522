use crate::bitwise::Bits;
use crate::bus::Access;
use crate::cpu::arm::alu_instruction::{
    ArithmeticOpResult, add, add_with_carry, shift, shift_by_register, sub, sub_with_carry,
};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::condition::Condition;
use crate::cpu::flags::{LoadStoreKind, OperandKind, ReadWriteKind, ShiftKind};
use crate::cpu::psr::CpuState;
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER, REG_SP};
use crate::cpu::thumb::alu_instructions::{
    ThumbHighRegisterOperation, ThumbImmediateOperation, ThumbModeAluInstruction,
};
use crate::cpu::thumb::instruction::Instruction;

const PC: u32 = REG_PROGRAM_COUNTER as u32;
const SP: u32 = REG_SP as u32;
const LR: u32 = REG_LR as u32;

impl Arm7tdmi {
    #[allow(clippy::too_many_lines)]
    pub(crate) fn execute_thumb(&mut self, instruction: Instruction, address: u32) {
        use Instruction::{
            AddOffsetSP, AddSubtract, AluOp, CondBranch, HiRegisterOpBX, LoadAddress,
            LoadStoreHalfword, LoadStoreImmOffset, LoadStoreRegisterOffset,
            LoadStoreSignExtByteHalfword, LongBranchLink, MoveCompareAddSubtractImm,
            MoveShiftedRegister, MultipleLoadStore, PCRelativeLoad, PushPopReg,
            SPRelativeLoadStore, Swi, UncondBranch, Undefined,
        };

        match instruction {
            MoveShiftedRegister {
                shift_operation,
                offset5,
                source_register,
                destination_register,
            } => self.move_shifted_reg(
                shift_operation,
                offset5.into(),
                source_register.into(),
                destination_register.into(),
            ),
            AddSubtract {
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            } => self.add_subtract(
                operation_kind,
                subtract,
                rn_offset3.into(),
                source_register.into(),
                destination_register.into(),
            ),
            MoveCompareAddSubtractImm {
                operation,
                destination_register,
                offset,
            } => self.move_compare_add_sub_imm(operation, destination_register.into(), offset),
            AluOp {
                alu_operation,
                source_register,
                destination_register,
            } => self.alu_op(
                alu_operation,
                source_register.into(),
                destination_register.into(),
            ),
            HiRegisterOpBX {
                register_operation,
                source_register,
                destination_register,
            } => self.hi_reg_operation_branch_ex(
                register_operation,
                source_register.into(),
                destination_register.into(),
            ),
            PCRelativeLoad {
                destination_register,
                immediate_value,
            } => {
                let address = (self.reg(PC) & !2).wrapping_add(immediate_value.into());
                let value = self.load_word(address, Access::NonSequential);
                self.idle(1);
                self.set_reg(destination_register.into(), value);
            }
            LoadStoreRegisterOffset {
                load_store,
                byte_word,
                ro,
                base_register,
                destination_register,
            } => {
                let address = self
                    .reg(base_register.into())
                    .wrapping_add(self.reg(ro.into()));
                self.transfer(load_store, byte_word, address, destination_register.into());
            }
            LoadStoreSignExtByteHalfword {
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            } => {
                let address = self
                    .reg(base_register.into())
                    .wrapping_add(self.reg(offset_register.into()));
                let rd = u32::from(destination_register);
                match (sign_extend_flag, h) {
                    (false, false) => self.store_half_word(address, self.reg(rd)),
                    (false, true) => {
                        let value = self.load_half_word(address);
                        self.idle(1);
                        self.set_reg(rd, value);
                    }
                    (true, false) => {
                        let value = self.load_signed_byte(address);
                        self.idle(1);
                        self.set_reg(rd, value);
                    }
                    (true, true) => {
                        let value = self.load_signed_half_word(address);
                        self.idle(1);
                        self.set_reg(rd, value);
                    }
                }
            }
            LoadStoreImmOffset {
                load_store,
                byte_word,
                offset,
                base_register,
                destination_register,
            } => {
                let address = self
                    .reg(base_register.into())
                    .wrapping_add(offset.into());
                self.transfer(load_store, byte_word, address, destination_register.into());
            }
            LoadStoreHalfword {
                load_store,
                offset,
                base_register,
                source_destination_register,
            } => {
                let address = self
                    .reg(base_register.into())
                    .wrapping_add(offset.into());
                let rd = u32::from(source_destination_register);
                match load_store {
                    LoadStoreKind::Store => self.store_half_word(address, self.reg(rd)),
                    LoadStoreKind::Load => {
                        let value = self.load_half_word(address);
                        self.idle(1);
                        self.set_reg(rd, value);
                    }
                }
            }
            SPRelativeLoadStore {
                load_store,
                destination_register,
                word8,
            } => {
                let address = self.reg(SP).wrapping_add(word8.into());
                self.transfer(
                    load_store,
                    ReadWriteKind::Word,
                    address,
                    destination_register.into(),
                );
            }
            LoadAddress {
                sp,
                destination_register,
                offset,
            } => {
                let base = if sp { self.reg(SP) } else { self.reg(PC) & !2 };
                self.set_reg(destination_register.into(), base.wrapping_add(offset));
            }
            AddOffsetSP { negative, word7 } => {
                let sp = self.reg(SP);
                let sp = if negative {
                    sp.wrapping_sub(word7.into())
                } else {
                    sp.wrapping_add(word7.into())
                };
                self.set_reg(SP, sp);
            }
            PushPopReg {
                load_store,
                pc_lr,
                register_list,
            } => self.push_pop_register(load_store, pc_lr, register_list.into()),
            MultipleLoadStore {
                load_store,
                base_register,
                register_list,
            } => self.multiple_load_store(load_store, base_register.into(), register_list.into()),
            CondBranch {
                condition,
                immediate_offset,
            } => self.cond_branch(condition, immediate_offset),
            Swi { comment } => self.software_interrupt(u32::from(comment & 0xFF), address),
            UncondBranch { offset } => {
                let target = self.reg(PC).wrapping_add(offset);
                self.branch_to(target);
            }
            LongBranchLink { h, offset } => self.long_branch_link(h, offset, address),
            Undefined => self.undefined_instruction(address),
        }
    }

    fn move_shifted_reg(&mut self, kind: ShiftKind, amount: u32, rs: u32, rd: u32) {
        let result = shift(kind, amount, self.reg(rs), self.cpsr.carry_flag());
        self.cpsr.set_sign_zero(result.result);
        self.cpsr.set_carry_flag(result.carry);
        self.set_reg(rd, result.result);
    }

    fn add_subtract(
        &mut self,
        operation_kind: OperandKind,
        subtract: bool,
        rn_offset3: u32,
        rs: u32,
        rd: u32,
    ) {
        let operand = match operation_kind {
            OperandKind::Immediate => rn_offset3,
            OperandKind::Register => self.reg(rn_offset3),
        };
        let first = self.reg(rs);
        let result = if subtract {
            sub(first, operand)
        } else {
            add(first, operand)
        };
        self.cpsr.set_flags(&result);
        self.set_reg(rd, result.result);
    }

    fn move_compare_add_sub_imm(&mut self, operation: ThumbImmediateOperation, rd: u32, offset: u32) {
        match operation {
            ThumbImmediateOperation::Mov => {
                self.cpsr.set_sign_zero(offset);
                self.set_reg(rd, offset);
            }
            ThumbImmediateOperation::Cmp => {
                let result = sub(self.reg(rd), offset);
                self.cpsr.set_flags(&result);
            }
            ThumbImmediateOperation::Add => {
                let result = add(self.reg(rd), offset);
                self.cpsr.set_flags(&result);
                self.set_reg(rd, result.result);
            }
            ThumbImmediateOperation::Sub => {
                let result = sub(self.reg(rd), offset);
                self.cpsr.set_flags(&result);
                self.set_reg(rd, result.result);
            }
        }
    }

    fn alu_op(&mut self, operation: ThumbModeAluInstruction, rs: u32, rd: u32) {
        use ThumbModeAluInstruction::{
            Adc, And, Asr, Bic, Cmn, Cmp, Eor, Lsl, Lsr, Mul, Mvn, Neg, Orr, Ror, Sbc, Tst,
        };

        let first = self.reg(rd);
        let second = self.reg(rs);
        let carry = self.cpsr.carry_flag();

        let logical = |cpu: &mut Self, result: u32, write: bool| {
            cpu.cpsr.set_sign_zero(result);
            if write {
                cpu.set_reg(rd, result);
            }
        };
        let arithmetic = |cpu: &mut Self, result: ArithmeticOpResult, write: bool| {
            cpu.cpsr.set_flags(&result);
            if write {
                cpu.set_reg(rd, result.result);
            }
        };

        match operation {
            And => logical(self, first & second, true),
            Eor => logical(self, first ^ second, true),
            Orr => logical(self, first | second, true),
            Bic => logical(self, first & !second, true),
            Mvn => logical(self, !second, true),
            Tst => logical(self, first & second, false),
            Lsl | Lsr | Asr | Ror => {
                let kind = match operation {
                    Lsl => ShiftKind::Lsl,
                    Lsr => ShiftKind::Lsr,
                    Asr => ShiftKind::Asr,
                    _ => ShiftKind::Ror,
                };
                self.idle(1);
                let result = shift_by_register(kind, second & 0xFF, first, carry);
                self.cpsr.set_carry_flag(result.carry);
                logical(self, result.result, true);
            }
            Adc => arithmetic(self, add_with_carry(first, second, carry), true),
            Sbc => arithmetic(self, sub_with_carry(first, second, carry), true),
            Neg => arithmetic(self, sub(0, second), true),
            Cmp => arithmetic(self, sub(first, second), false),
            Cmn => arithmetic(self, add(first, second), false),
            Mul => {
                self.idle(Self::multiply_cycles(first));
                logical(self, first.wrapping_mul(second), true);
            }
        }
    }

    fn hi_reg_operation_branch_ex(&mut self, operation: ThumbHighRegisterOperation, rs: u32, rd: u32) {
        let source = self.reg(rs);
        match operation {
            ThumbHighRegisterOperation::Add => {
                let result = self.reg(rd).wrapping_add(source);
                self.set_reg(rd, result);
            }
            ThumbHighRegisterOperation::Cmp => {
                let result = sub(self.reg(rd), source);
                self.cpsr.set_flags(&result);
            }
            ThumbHighRegisterOperation::Mov => self.set_reg(rd, source),
            ThumbHighRegisterOperation::Bx => {
                if source.is_bit_on(0) {
                    self.cpsr.set_cpu_state(CpuState::Thumb);
                } else {
                    self.cpsr.set_cpu_state(CpuState::Arm);
                }
                self.branch_to(source);
            }
        }
    }

    /// Single register load or store shared by formats 7, 9 and 11.
    fn transfer(&mut self, load_store: LoadStoreKind, byte_word: ReadWriteKind, address: u32, rd: u32) {
        match (load_store, byte_word) {
            (LoadStoreKind::Store, ReadWriteKind::Word) => {
                self.store_word(address, self.reg(rd), Access::NonSequential);
            }
            (LoadStoreKind::Store, ReadWriteKind::Byte) => self.store_byte(address, self.reg(rd)),
            (LoadStoreKind::Load, ReadWriteKind::Word) => {
                let value = self.load_word(address, Access::NonSequential);
                self.idle(1);
                self.set_reg(rd, value);
            }
            (LoadStoreKind::Load, ReadWriteKind::Byte) => {
                let value = self.load_byte(address);
                self.idle(1);
                self.set_reg(rd, value);
            }
        }
    }

    fn push_pop_register(&mut self, load_store: LoadStoreKind, pc_lr: bool, register_list: u32) {
        match load_store {
            LoadStoreKind::Store => {
                let list = if pc_lr {
                    register_list | (1 << LR)
                } else {
                    register_list
                };
                let (list, size) = Self::thumb_transfer_list(list);
                let start = self.reg(SP).wrapping_sub(size);
                self.set_reg(SP, start);

                let mut address = start;
                let mut access = Access::NonSequential;
                for register in (0..16).filter(|r| list.is_bit_on(*r)) {
                    let value = self.thumb_stored_value(u32::from(register));
                    self.store_word(address, value, access);
                    address = address.wrapping_add(4);
                    access = Access::Sequential;
                }
            }
            LoadStoreKind::Load => {
                let list = if pc_lr {
                    register_list | (1 << PC)
                } else {
                    register_list
                };
                let (list, size) = Self::thumb_transfer_list(list);
                let mut address = self.reg(SP);
                self.set_reg(SP, address.wrapping_add(size));

                let mut access = Access::NonSequential;
                for register in (0..16).filter(|r| list.is_bit_on(*r)) {
                    let value = self.load_word(address, access);
                    self.set_reg(u32::from(register), value);
                    address = address.wrapping_add(4);
                    access = Access::Sequential;
                }
                self.idle(1);
            }
        }
    }

    fn multiple_load_store(&mut self, load_store: LoadStoreKind, rb: u32, register_list: u32) {
        let (list, size) = Self::thumb_transfer_list(register_list);
        let base = self.reg(rb);
        let new_base = base.wrapping_add(size);
        let first_register = list.trailing_zeros();

        let mut address = base;
        let mut access = Access::NonSequential;
        let mut base_loaded = false;
        for register in (0..16).filter(|r| list.is_bit_on(*r)) {
            let register = u32::from(register);
            match load_store {
                LoadStoreKind::Store => {
                    let value = if register == rb && register != first_register {
                        new_base
                    } else {
                        self.thumb_stored_value(register)
                    };
                    self.store_word(address, value, access);
                }
                LoadStoreKind::Load => {
                    let value = self.load_word(address, access);
                    base_loaded |= register == rb;
                    self.set_reg(register, value);
                }
            }
            address = address.wrapping_add(4);
            access = Access::Sequential;
        }

        if load_store == LoadStoreKind::Load {
            self.idle(1);
        }
        if !base_loaded {
            self.set_reg(rb, new_base);
        }
    }

    /// An empty list transfers R15 and moves the base by 0x40.
    const fn thumb_transfer_list(list: u32) -> (u32, u32) {
        if list == 0 {
            (1 << PC, 0x40)
        } else {
            (list, list.count_ones() * 4)
        }
    }

    /// R15 is stored as the address of the instruction plus 6.
    fn thumb_stored_value(&self, register: u32) -> u32 {
        if register == PC {
            self.reg(PC).wrapping_add(2)
        } else {
            self.reg(register)
        }
    }

    fn cond_branch(&mut self, condition: Condition, offset: i32) {
        if self.cpsr.can_execute(condition) {
            let target = self.reg(PC).wrapping_add_signed(offset);
            self.branch_to(target);
        }
    }

    fn long_branch_link(&mut self, h: bool, offset: u32, address: u32) {
        if h {
            let target = self.reg(LR).wrapping_add(offset << 1);
            self.set_reg(LR, address.wrapping_add(2) | 1);
            self.branch_to(target);
        } else {
            let high = (offset << 12).sign_extended(23);
            self.set_reg(LR, self.reg(PC).wrapping_add(high));
        }
    }
}
