//! # Thumb Instruction Decoding
//!
//! Thumb instructions are grouped into 19 formats, identified by their high bits:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Thumb Instruction Formats                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Format 1:  000 xx          Move shifted register                       │
//! │  Format 2:  00011           Add/subtract                                │
//! │  Format 3:  001 xx          Move/compare/add/subtract immediate         │
//! │  Format 4:  010000          ALU operations                              │
//! │  Format 5:  010001          Hi register operations / BX                 │
//! │  Format 6:  01001           PC-relative load                            │
//! │  Format 7:  0101 xx0        Load/store with register offset             │
//! │  Format 8:  0101 xx1        Load/store sign-extended byte/halfword      │
//! │  Format 9:  011 xx          Load/store with immediate offset            │
//! │  Format 10: 1000 x          Load/store halfword                         │
//! │  Format 11: 1001 x          SP-relative load/store                      │
//! │  Format 12: 1010 x          Load address                                │
//! │  Format 13: 10110000        Add offset to stack pointer                 │
//! │  Format 14: 1011 x10x       Push/pop registers                          │
//! │  Format 15: 1100 x          Multiple load/store                         │
//! │  Format 16: 1101 xxxx       Conditional branch                          │
//! │  Format 17: 11011111        Software interrupt                          │
//! │  Format 18: 11100           Unconditional branch                        │
//! │  Format 19: 1111 x          Long branch with link                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The BL instruction spans ±4MB with two 16-bit halves:
//!
//! ```text
//! First:  1111 0xxx xxxx xxxx  ; LR = PC + (offset_hi << 12)
//! Second: 1111 1xxx xxxx xxxx  ; PC = LR + (offset_lo << 1), LR = next | 1
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::condition::Condition;
use crate::cpu::flags::{LoadStoreKind, OperandKind, ReadWriteKind, ShiftKind};
use crate::cpu::thumb::alu_instructions::{
    ThumbHighRegisterOperation, ThumbImmediateOperation, ThumbModeAluInstruction,
};

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Instruction {
    MoveShiftedRegister {
        shift_operation: ShiftKind,
        offset5: u16,
        source_register: u16,
        destination_register: u16,
    },
    AddSubtract {
        operation_kind: OperandKind,
        subtract: bool,
        rn_offset3: u16,
        source_register: u16,
        destination_register: u16,
    },
    MoveCompareAddSubtractImm {
        operation: ThumbImmediateOperation,
        destination_register: u16,
        offset: u32,
    },
    AluOp {
        alu_operation: ThumbModeAluInstruction,
        source_register: u16,
        destination_register: u16,
    },
    HiRegisterOpBX {
        register_operation: ThumbHighRegisterOperation,
        source_register: u16,
        destination_register: u16,
    },
    PCRelativeLoad {
        destination_register: u16,
        immediate_value: u16,
    },
    LoadStoreRegisterOffset {
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        ro: u16,
        base_register: u16,
        destination_register: u16,
    },
    LoadStoreSignExtByteHalfword {
        h: bool,
        sign_extend_flag: bool,
        offset_register: u16,
        base_register: u16,
        destination_register: u16,
    },
    LoadStoreImmOffset {
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        offset: u16,
        base_register: u16,
        destination_register: u16,
    },
    LoadStoreHalfword {
        load_store: LoadStoreKind,
        offset: u16,
        base_register: u16,
        source_destination_register: u16,
    },
    SPRelativeLoadStore {
        load_store: LoadStoreKind,
        destination_register: u16,
        word8: u16,
    },
    LoadAddress {
        sp: bool,
        destination_register: u16,
        offset: u32,
    },
    AddOffsetSP {
        negative: bool,
        word7: u16,
    },
    PushPopReg {
        load_store: LoadStoreKind,
        pc_lr: bool,
        register_list: u16,
    },
    MultipleLoadStore {
        load_store: LoadStoreKind,
        base_register: u16,
        register_list: u16,
    },
    CondBranch {
        condition: Condition,
        immediate_offset: i32,
    },
    Swi {
        comment: u16,
    },
    UncondBranch {
        offset: u32,
    },
    LongBranchLink {
        h: bool,
        offset: u32,
    },
    Undefined,
}

impl From<u16> for Instruction {
    #[allow(clippy::too_many_lines)]
    fn from(op_code: u16) -> Self {
        use Instruction::{
            AddOffsetSP, AddSubtract, AluOp, CondBranch, HiRegisterOpBX, LoadAddress,
            LoadStoreHalfword, LoadStoreImmOffset, LoadStoreRegisterOffset,
            LoadStoreSignExtByteHalfword, LongBranchLink, MoveCompareAddSubtractImm,
            MoveShiftedRegister, MultipleLoadStore, PCRelativeLoad, PushPopReg,
            SPRelativeLoadStore, Swi, UncondBranch, Undefined,
        };

        if op_code.get_bits(8..=15) == 0b1101_1111 {
            Swi {
                comment: op_code.get_bits(0..=7),
            }
        } else if op_code.get_bits(8..=15) == 0b1011_0000 {
            AddOffsetSP {
                negative: op_code.get_bit(7),
                word7: op_code.get_bits(0..=6) << 2,
            }
        } else if op_code.get_bits(10..=15) == 0b01_0000 {
            AluOp {
                alu_operation: op_code.get_bits(6..=9).into(),
                source_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(10..=15) == 0b01_0001 {
            let rd_hd = op_code.get_bits(0..=2);
            let destination_register = if op_code.get_bit(7) { rd_hd | (1 << 3) } else { rd_hd };

            HiRegisterOpBX {
                register_operation: op_code.get_bits(8..=9).into(),
                source_register: op_code.get_bits(3..=6),
                destination_register,
            }
        } else if op_code.get_bits(12..=15) == 0b1011 && op_code.get_bits(9..=10) == 0b10 {
            PushPopReg {
                load_store: op_code.get_bit(11).into(),
                pc_lr: op_code.get_bit(8),
                register_list: op_code.get_bits(0..=7),
            }
        } else if op_code.get_bits(11..=15) == 0b00011 {
            AddSubtract {
                operation_kind: op_code.get_bit(10).into(),
                subtract: op_code.get_bit(9),
                rn_offset3: op_code.get_bits(6..=8),
                source_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(11..=15) == 0b01001 {
            PCRelativeLoad {
                destination_register: op_code.get_bits(8..=10),
                immediate_value: op_code.get_bits(0..=7) << 2,
            }
        } else if op_code.get_bits(12..=15) == 0b0101 && !op_code.get_bit(9) {
            LoadStoreRegisterOffset {
                load_store: op_code.get_bit(11).into(),
                byte_word: op_code.get_bit(10).into(),
                ro: op_code.get_bits(6..=8),
                base_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(12..=15) == 0b0101 {
            LoadStoreSignExtByteHalfword {
                h: op_code.get_bit(11),
                sign_extend_flag: op_code.get_bit(10),
                offset_register: op_code.get_bits(6..=8),
                base_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(11..=15) == 0b11100 {
            UncondBranch {
                offset: u32::from(op_code.get_bits(0..=10) << 1).sign_extended(12),
            }
        } else if op_code.get_bits(12..=15) == 0b1000 {
            LoadStoreHalfword {
                load_store: op_code.get_bit(11).into(),
                offset: op_code.get_bits(6..=10) << 1,
                base_register: op_code.get_bits(3..=5),
                source_destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(12..=15) == 0b1001 {
            SPRelativeLoadStore {
                load_store: op_code.get_bit(11).into(),
                destination_register: op_code.get_bits(8..=10),
                word8: op_code.get_bits(0..=7) << 2,
            }
        } else if op_code.get_bits(12..=15) == 0b1010 {
            LoadAddress {
                sp: op_code.get_bit(11),
                destination_register: op_code.get_bits(8..=10),
                offset: u32::from(op_code.get_bits(0..=7)) << 2,
            }
        } else if op_code.get_bits(12..=15) == 0b1100 {
            MultipleLoadStore {
                load_store: op_code.get_bit(11).into(),
                base_register: op_code.get_bits(8..=10),
                register_list: op_code.get_bits(0..=7),
            }
        } else if op_code.get_bits(12..=15) == 0b1101 {
            let condition = Condition::from(op_code.get_bits(8..=11) as u8);
            if condition == Condition::AL {
                tracing::debug!("undefined thumb conditional branch: 0x{op_code:04X}");
                return Undefined;
            }
            // 9 bits signed offset (assembler puts `label` >> 1 in this field so we should <<1)
            let offset = u32::from(op_code.get_bits(0..=7)) << 1;

            CondBranch {
                condition,
                immediate_offset: offset.sign_extended(9) as i32,
            }
        } else if op_code.get_bits(12..=15) == 0b1111 {
            LongBranchLink {
                h: op_code.get_bit(11),
                offset: u32::from(op_code.get_bits(0..=10)),
            }
        } else if op_code.get_bits(13..=15) == 0b000 {
            MoveShiftedRegister {
                shift_operation: op_code.get_bits(11..=12).into(),
                offset5: op_code.get_bits(6..=10),
                source_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(13..=15) == 0b001 {
            MoveCompareAddSubtractImm {
                operation: op_code.get_bits(11..=12).into(),
                destination_register: op_code.get_bits(8..=10),
                offset: op_code.get_bits(0..=7).into(),
            }
        } else if op_code.get_bits(13..=15) == 0b011 {
            let byte_word: ReadWriteKind = op_code.get_bit(12).into();
            let offset = match byte_word {
                ReadWriteKind::Word => op_code.get_bits(6..=10) << 2,
                ReadWriteKind::Byte => op_code.get_bits(6..=10),
            };

            LoadStoreImmOffset {
                load_store: op_code.get_bit(11).into(),
                byte_word,
                offset,
                base_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else {
            tracing::debug!("undefined thumb instruction: 0x{op_code:04X}");
            Undefined
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.disassembler())
    }
}

fn register_list_string(register_list: u16, extra: Option<&str>) -> String {
    let mut registers: Vec<String> = (0..8)
        .filter(|i| register_list.is_bit_on(*i))
        .map(|i| format!("R{i}"))
        .collect();
    if let Some(extra) = extra {
        registers.push(extra.to_string());
    }
    registers.join(", ")
}

impl Instruction {
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn disassembler(&self) -> String {
        match self {
            Self::MoveShiftedRegister {
                shift_operation,
                offset5,
                source_register,
                destination_register,
            } => format!("{shift_operation} R{destination_register}, R{source_register}, #{offset5}"),
            Self::AddSubtract {
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            } => {
                let op = if *subtract { "SUB" } else { "ADD" };
                let operand = match operation_kind {
                    OperandKind::Immediate => format!("#{rn_offset3}"),
                    OperandKind::Register => format!("R{rn_offset3}"),
                };
                format!("{op} R{destination_register}, R{source_register}, {operand}")
            }
            Self::MoveCompareAddSubtractImm {
                operation,
                destination_register,
                offset,
            } => format!("{operation} R{destination_register}, #{offset}"),
            Self::AluOp {
                alu_operation,
                source_register,
                destination_register,
            } => format!("{alu_operation} R{destination_register}, R{source_register}"),
            Self::HiRegisterOpBX {
                register_operation: ThumbHighRegisterOperation::Bx,
                source_register,
                ..
            } => format!("BX R{source_register}"),
            Self::HiRegisterOpBX {
                register_operation,
                source_register,
                destination_register,
            } => format!("{register_operation} R{destination_register}, R{source_register}"),
            Self::PCRelativeLoad {
                destination_register,
                immediate_value,
            } => format!("LDR R{destination_register}, [PC, #0x{immediate_value:X}]"),
            Self::LoadStoreRegisterOffset {
                load_store,
                byte_word,
                ro,
                base_register,
                destination_register,
            } => {
                let b = if *byte_word == ReadWriteKind::Byte { "B" } else { "" };
                format!("{load_store}{b} R{destination_register}, [R{base_register}, R{ro}]")
            }
            Self::LoadStoreSignExtByteHalfword {
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            } => {
                let name = match (sign_extend_flag, h) {
                    (false, false) => "STRH",
                    (false, true) => "LDRH",
                    (true, false) => "LDRSB",
                    (true, true) => "LDRSH",
                };
                format!("{name} R{destination_register}, [R{base_register}, R{offset_register}]")
            }
            Self::LoadStoreImmOffset {
                load_store,
                byte_word,
                offset,
                base_register,
                destination_register,
            } => {
                let b = if *byte_word == ReadWriteKind::Byte { "B" } else { "" };
                format!("{load_store}{b} R{destination_register}, [R{base_register}, #{offset}]")
            }
            Self::LoadStoreHalfword {
                load_store,
                offset,
                base_register,
                source_destination_register,
            } => format!(
                "{load_store}H R{source_destination_register}, [R{base_register}, #{offset}]"
            ),
            Self::SPRelativeLoadStore {
                load_store,
                destination_register,
                word8,
            } => format!("{load_store} R{destination_register}, [SP, #{word8}]"),
            Self::LoadAddress {
                sp,
                destination_register,
                offset,
            } => {
                let base = if *sp { "SP" } else { "PC" };
                format!("ADD R{destination_register}, {base}, #{offset}")
            }
            Self::AddOffsetSP { negative, word7 } => {
                let sign = if *negative { "-" } else { "" };
                format!("ADD SP, #{sign}{word7}")
            }
            Self::PushPopReg {
                load_store,
                pc_lr,
                register_list,
            } => match load_store {
                LoadStoreKind::Store => {
                    let extra = pc_lr.then_some("LR");
                    format!("PUSH {{{}}}", register_list_string(*register_list, extra))
                }
                LoadStoreKind::Load => {
                    let extra = pc_lr.then_some("PC");
                    format!("POP {{{}}}", register_list_string(*register_list, extra))
                }
            },
            Self::MultipleLoadStore {
                load_store,
                base_register,
                register_list,
            } => {
                let name = match load_store {
                    LoadStoreKind::Load => "LDMIA",
                    LoadStoreKind::Store => "STMIA",
                };
                format!(
                    "{name} R{base_register}!, {{{}}}",
                    register_list_string(*register_list, None)
                )
            }
            Self::CondBranch {
                condition,
                immediate_offset,
            } => format!("B{condition} #{immediate_offset}"),
            Self::Swi { comment } => format!("SWI 0x{comment:02X}"),
            Self::UncondBranch { offset } => format!("B #{}", *offset as i32),
            Self::LongBranchLink { h, offset } => {
                let part = if *h { "low" } else { "high" };
                format!("BL {part} #0x{offset:X}")
            }
            Self::Undefined => "UNDEFINED".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_multiple_load_store() {
        let output = Instruction::from(0b1100_1001_1010_0000);
        assert_eq!(
            Instruction::MultipleLoadStore {
                load_store: LoadStoreKind::Load,
                base_register: 1,
                register_list: 160,
            },
            output
        );
        assert_eq!("LDMIA R1!, {R5, R7}", output.disassembler());
    }

    #[test]
    fn decode_pc_relative_load() {
        let output = Instruction::from(0b0100_1001_0101_1000);
        assert_eq!(
            Instruction::PCRelativeLoad {
                destination_register: 1,
                immediate_value: 352,
            },
            output
        );
        assert_eq!("LDR R1, [PC, #0x160]", output.disassembler());
    }

    #[test]
    fn decode_load_store_register_offset() {
        let output = Instruction::from(0b0101_00_0_000_001_010);
        assert_eq!(
            Instruction::LoadStoreRegisterOffset {
                load_store: LoadStoreKind::Store,
                byte_word: ReadWriteKind::Word,
                ro: 0,
                base_register: 1,
                destination_register: 2,
            },
            output
        );
        assert_eq!("STR R2, [R1, R0]", output.disassembler());
    }

    #[test]
    fn decode_uncond_branch() {
        let output = Instruction::from(0b1110_0001_0010_1111);
        assert_eq!(Instruction::UncondBranch { offset: 606 }, output);
        assert_eq!("B #606", output.disassembler());

        // b . (offset -4)
        let output = Instruction::from(0xE7FE);
        assert_eq!(
            Instruction::UncondBranch {
                offset: (-4_i32) as u32
            },
            output
        );
    }

    #[test]
    fn decode_hi_reg_operation() {
        let output = Instruction::from(0b0100_0111_0111_0000);
        assert_eq!(
            Instruction::HiRegisterOpBX {
                register_operation: ThumbHighRegisterOperation::Bx,
                source_register: 14,
                destination_register: 0,
            },
            output
        );
        assert_eq!("BX R14", output.disassembler());

        let output = Instruction::from(0b010001_00_0_1_000_001);
        assert_eq!(
            Instruction::HiRegisterOpBX {
                register_operation: ThumbHighRegisterOperation::Add,
                source_register: 8,
                destination_register: 1,
            },
            output
        );
        assert_eq!("ADD R1, R8", output.disassembler());
    }

    #[test]
    fn decode_push_pop_register() {
        let output = Instruction::from(0b1011_0101_1111_0000);
        assert_eq!(
            Instruction::PushPopReg {
                load_store: LoadStoreKind::Store,
                pc_lr: true,
                register_list: 240,
            },
            output
        );
        assert_eq!("PUSH {R4, R5, R6, R7, LR}", output.disassembler());
    }

    #[test]
    fn decode_alu_operation() {
        let output = Instruction::from(0b0100_0011_0110_0000);
        assert_eq!(
            Instruction::AluOp {
                alu_operation: ThumbModeAluInstruction::Mul,
                source_register: 4,
                destination_register: 0,
            },
            output
        );
        assert_eq!("MUL R0, R4", output.disassembler());
    }

    #[test]
    fn decode_cond_branch_and_swi() {
        let output = Instruction::from(0xD0FE);
        assert_eq!(
            Instruction::CondBranch {
                condition: Condition::EQ,
                immediate_offset: -4,
            },
            output
        );
        assert_eq!("BEQ #-4", output.disassembler());

        assert_eq!(Instruction::from(0xDF05), Instruction::Swi { comment: 5 });
        assert_eq!(Instruction::from(0xDE00), Instruction::Undefined);
    }

    #[test]
    fn decode_long_branch_link() {
        assert_eq!(
            Instruction::from(0xF000),
            Instruction::LongBranchLink { h: false, offset: 0 }
        );
        assert_eq!(
            Instruction::from(0xF802),
            Instruction::LongBranchLink { h: true, offset: 2 }
        );
    }

    #[test]
    fn decode_add_offset_sp() {
        let output = Instruction::from(0b1011_0000_1000_0100);
        assert_eq!(
            Instruction::AddOffsetSP {
                negative: true,
                word7: 16
            },
            output
        );
        assert_eq!("ADD SP, #-16", output.disassembler());
    }
}
