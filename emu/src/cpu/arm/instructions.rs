//! # ARM Instruction Decoding
//!
//! Decodes 32-bit ARM opcodes into [`ArmModeInstruction`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    ARM Instruction Categories                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  000 + special patterns  →  Multiply, Multiply Long, SWP, BX            │
//! │  000                     →  Data Processing (register operand)          │
//! │  001                     →  Data Processing (immediate operand)         │
//! │  010                     →  Load/Store (immediate offset)               │
//! │  011                     →  Load/Store (register offset)                │
//! │  100                     →  Block Data Transfer (LDM/STM)               │
//! │  101                     →  Branch (B/BL)                               │
//! │  110, 1110               →  Coprocessor (none on the GBA, undefined)    │
//! │  1111                    →  Software Interrupt                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Overlapping patterns are checked in this order: BX, multiply long,
//! multiply, swap, halfword transfer, undefined, SWI, coprocessor, block
//! transfer, branch, single transfer, data processing and PSR transfer.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::{
    AluSecondOperandInfo, ArmModeAluInstr, MsrSource, PsrKind, PsrOpKind, ShiftOperator,
};
use crate::cpu::condition::Condition;
use crate::cpu::flags::{
    HalfwordDataTransferOffsetKind, Indexing, LoadStoreKind, Offsetting, OperandKind,
    ReadWriteKind, ShiftKind,
};

/// Bits 6-5 of a halfword transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HalfwordTransferKind {
    UnsignedHalfwords,
    SignedByte,
    SignedHalfwords,
}

impl From<u32> for HalfwordTransferKind {
    fn from(sh: u32) -> Self {
        match sh & 0b11 {
            0b10 => Self::SignedByte,
            0b11 => Self::SignedHalfwords,
            _ => Self::UnsignedHalfwords,
        }
    }
}

impl std::fmt::Display for HalfwordTransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsignedHalfwords => f.write_str("H"),
            Self::SignedByte => f.write_str("SB"),
            Self::SignedHalfwords => f.write_str("SH"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SingleDataTransferOffsetInfo {
    Immediate {
        offset: u32,
    },
    RegisterImmediate {
        shift_amount: u32,
        shift_kind: ShiftKind,
        reg_offset: u32,
    },
}

impl std::fmt::Display for SingleDataTransferOffsetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate { offset } => write!(f, "#0x{offset:X}"),
            Self::RegisterImmediate {
                shift_amount,
                shift_kind,
                reg_offset,
            } => write!(f, "R{reg_offset}, {shift_kind} #{shift_amount}"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmModeMultiplyVariant {
    Mul,
    Mla,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmModeMultiplyLongVariant {
    Umull,
    Umlal,
    Smull,
    Smlal,
}

impl std::fmt::Display for ArmModeMultiplyLongVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Umull => f.write_str("UMULL"),
            Self::Umlal => f.write_str("UMLAL"),
            Self::Smull => f.write_str("SMULL"),
            Self::Smlal => f.write_str("SMLAL"),
        }
    }
}

impl From<u32> for ArmModeMultiplyLongVariant {
    fn from(op_code: u32) -> Self {
        match op_code.get_bits(21..=22) {
            0b00 => Self::Umull,
            0b01 => Self::Umlal,
            0b10 => Self::Smull,
            _ => Self::Smlal,
        }
    }
}

/// A decoded ARM instruction.
///
/// | Variant                | Example Instructions      |
/// |------------------------|---------------------------|
/// | `DataProcessing`       | AND, ADD, CMP, MOV        |
/// | `PSRTransfer`          | MRS, MSR                  |
/// | `Multiply`             | MUL, MLA                  |
/// | `MultiplyLong`         | UMULL, SMLAL              |
/// | `SingleDataSwap`       | SWP, SWPB                 |
/// | `BranchAndExchange`    | BX                        |
/// | `HalfwordDataTransfer` | LDRH, STRH, LDRSB, LDRSH  |
/// | `SingleDataTransfer`   | LDR, STR, LDRB, STRB      |
/// | `BlockDataTransfer`    | LDM, STM                  |
/// | `Branch`               | B, BL                     |
/// | `SoftwareInterrupt`    | SWI                       |
/// | `Undefined`            | coprocessor and reserved  |
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ArmModeInstruction {
    DataProcessing {
        condition: Condition,
        alu_instruction: ArmModeAluInstr,
        set_conditions: bool,
        rn: u32,
        destination: u32,
        op2: AluSecondOperandInfo,
    },
    PSRTransfer {
        condition: Condition,
        psr_kind: PsrKind,
        kind: PsrOpKind,
    },
    Multiply {
        variant: ArmModeMultiplyVariant,
        condition: Condition,
        should_set_codes: bool,
        rd_destination_register: u32,
        rn_accumulate_register: u32,
        rs_operand_register: u32,
        rm_operand_register: u32,
    },
    MultiplyLong {
        variant: ArmModeMultiplyLongVariant,
        condition: Condition,
        should_set_codes: bool,
        rdhi_destination_register: u32,
        rdlo_destination_register: u32,
        rs_operand_register: u32,
        rm_operand_register: u32,
    },
    SingleDataSwap {
        condition: Condition,
        byte: bool,
        rn: u32,
        rd: u32,
        rm: u32,
    },
    BranchAndExchange {
        condition: Condition,
        register: usize,
    },
    HalfwordDataTransfer {
        condition: Condition,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store_kind: LoadStoreKind,
        offset_kind: HalfwordDataTransferOffsetKind,
        base_register: u32,
        source_destination_register: u32,
        transfer_kind: HalfwordTransferKind,
    },
    SingleDataTransfer {
        condition: Condition,
        kind: LoadStoreKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        rd: u32,
        base_register: u32,
        offset_info: SingleDataTransferOffsetInfo,
        offsetting: Offsetting,
    },
    BlockDataTransfer {
        condition: Condition,
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: u32,
        register_list: u32,
    },
    Branch {
        condition: Condition,
        link: bool,
        offset: u32,
    },
    SoftwareInterrupt {
        condition: Condition,
        comment: u32,
    },
    Undefined {
        condition: Condition,
    },
}

impl ArmModeInstruction {
    #[must_use]
    pub const fn condition(&self) -> Condition {
        match self {
            Self::DataProcessing { condition, .. }
            | Self::PSRTransfer { condition, .. }
            | Self::Multiply { condition, .. }
            | Self::MultiplyLong { condition, .. }
            | Self::SingleDataSwap { condition, .. }
            | Self::BranchAndExchange { condition, .. }
            | Self::HalfwordDataTransfer { condition, .. }
            | Self::SingleDataTransfer { condition, .. }
            | Self::BlockDataTransfer { condition, .. }
            | Self::Branch { condition, .. }
            | Self::SoftwareInterrupt { condition, .. }
            | Self::Undefined { condition } => *condition,
        }
    }

    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn disassembler(&self) -> String {
        match self {
            Self::DataProcessing {
                condition,
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
            } => {
                let set_string = if *set_conditions { "S" } else { "" };
                match alu_instruction {
                    ArmModeAluInstr::Mov | ArmModeAluInstr::Mvn => {
                        format!("{alu_instruction}{condition}{set_string} R{destination}, {op2}")
                    }
                    ArmModeAluInstr::Tst
                    | ArmModeAluInstr::Teq
                    | ArmModeAluInstr::Cmp
                    | ArmModeAluInstr::Cmn => format!("{alu_instruction}{condition} R{rn}, {op2}"),
                    _ => format!(
                        "{alu_instruction}{condition}{set_string} R{destination}, R{rn}, {op2}"
                    ),
                }
            }
            Self::PSRTransfer {
                condition,
                psr_kind,
                kind,
            } => match kind {
                PsrOpKind::Mrs {
                    destination_register,
                } => format!("MRS{condition} R{destination_register}, {psr_kind}"),
                PsrOpKind::Msr {
                    field_mask,
                    source: MsrSource::Register(source_register),
                } if *field_mask == 0b1001 => {
                    format!("MSR{condition} {psr_kind}, R{source_register}")
                }
                PsrOpKind::Msr { field_mask, source } => {
                    let fields: String = ['c', 'x', 's', 'f']
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| field_mask.is_bit_on(*i as u8))
                        .map(|(_, c)| *c)
                        .collect();
                    match source {
                        MsrSource::Register(r) => {
                            format!("MSR{condition} {psr_kind}_{fields}, R{r}")
                        }
                        MsrSource::Immediate { base, shift } => format!(
                            "MSR{condition} {psr_kind}_{fields}, #0x{:X}",
                            base.rotate_right(*shift)
                        ),
                    }
                }
            },
            Self::Multiply {
                variant,
                condition,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
            } => {
                let set_string = if *should_set_codes { "S" } else { "" };
                match variant {
                    ArmModeMultiplyVariant::Mul => format!(
                        "MUL{condition}{set_string} R{rd_destination_register}, R{rm_operand_register}, R{rs_operand_register}"
                    ),
                    ArmModeMultiplyVariant::Mla => format!(
                        "MLA{condition}{set_string} R{rd_destination_register}, R{rm_operand_register}, R{rs_operand_register}, R{rn_accumulate_register}"
                    ),
                }
            }
            Self::MultiplyLong {
                variant,
                condition,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
            } => {
                let set_string = if *should_set_codes { "S" } else { "" };
                format!(
                    "{variant}{condition}{set_string} R{rdlo_destination_register}, R{rdhi_destination_register}, R{rm_operand_register}, R{rs_operand_register}"
                )
            }
            Self::SingleDataSwap {
                condition,
                byte,
                rn,
                rd,
                rm,
            } => {
                let b = if *byte { "B" } else { "" };
                format!("SWP{condition}{b} R{rd}, R{rm}, [R{rn}]")
            }
            Self::BranchAndExchange {
                condition,
                register,
            } => format!("BX{condition} R{register}"),
            Self::HalfwordDataTransfer {
                condition,
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
            } => {
                let sign = if *offsetting == Offsetting::Down { "-" } else { "" };
                let offset = match offset_kind {
                    HalfwordDataTransferOffsetKind::Immediate { offset } => {
                        format!("#{sign}0x{offset:X}")
                    }
                    HalfwordDataTransferOffsetKind::Register { register } => {
                        format!("{sign}R{register}")
                    }
                };
                let address = match indexing {
                    Indexing::Pre => {
                        let w = if *write_back { "!" } else { "" };
                        format!("[R{base_register}, {offset}]{w}")
                    }
                    Indexing::Post => format!("[R{base_register}], {offset}"),
                };
                format!(
                    "{load_store_kind}{condition}{transfer_kind} R{source_destination_register}, {address}"
                )
            }
            Self::SingleDataTransfer {
                condition,
                kind,
                quantity,
                rd,
                offset_info,
                ..
            } => {
                let b = if *quantity == ReadWriteKind::Byte { "B" } else { "" };
                format!("{kind}{condition}{b} R{rd}, {offset_info}")
            }
            Self::BlockDataTransfer {
                condition,
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
            } => {
                let name = match load_store {
                    LoadStoreKind::Load => "LDM",
                    LoadStoreKind::Store => "STM",
                };
                let direction = match offsetting {
                    Offsetting::Up => "I",
                    Offsetting::Down => "D",
                };
                let when = match indexing {
                    Indexing::Pre => "B",
                    Indexing::Post => "A",
                };
                let w = if *write_back { "!" } else { "" };
                let hat = if *load_psr { "^" } else { "" };
                let registers = (0..16)
                    .filter(|i| register_list.is_bit_on(*i))
                    .map(|i| format!("R{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{name}{condition}{direction}{when} R{rn}{w}, {{{registers}}}{hat}")
            }
            Self::Branch {
                condition,
                link,
                offset,
            } => {
                let link = if *link { "L" } else { "" };
                format!("B{link}{condition} 0x{offset:08X}")
            }
            Self::SoftwareInterrupt { condition, comment } => {
                format!("SWI{condition} 0x{:02X}", comment >> 16)
            }
            Self::Undefined { .. } => "UNDEFINED".to_string(),
        }
    }

    fn decode_psr_transfer(op_code: u32, condition: Condition) -> Option<Self> {
        if op_code.get_bits(26..=27) != 0b00
            || op_code.get_bits(23..=24) != 0b10
            || op_code.get_bit(20)
        {
            return None;
        }

        let psr_kind = PsrKind::from(op_code.get_bit(22));
        let kind = if op_code.get_bit(21) {
            if op_code.get_bits(12..=15) != 0xF {
                return None;
            }
            let source = if op_code.get_bit(25) {
                MsrSource::Immediate {
                    base: op_code.get_bits(0..=7),
                    shift: op_code.get_bits(8..=11) * 2,
                }
            } else {
                MsrSource::Register(op_code.get_bits(0..=3))
            };
            PsrOpKind::Msr {
                field_mask: op_code.get_bits(16..=19),
                source,
            }
        } else {
            if op_code.get_bit(25) || op_code.get_bits(16..=19) != 0xF {
                return None;
            }
            PsrOpKind::Mrs {
                destination_register: op_code.get_bits(12..=15),
            }
        };

        Some(Self::PSRTransfer {
            condition,
            psr_kind,
            kind,
        })
    }
}

impl From<u32> for ArmModeInstruction {
    #[allow(clippy::too_many_lines)]
    fn from(op_code: u32) -> Self {
        let condition = Condition::from(op_code.get_bits(28..=31) as u8);

        if op_code.get_bits(4..=27) == 0x0012_FFF1 {
            Self::BranchAndExchange {
                condition,
                register: op_code.get_bits(0..=3) as usize,
            }
        } else if op_code.get_bits(23..=27) == 0b0_0001 && op_code.get_bits(4..=7) == 0b1001 {
            Self::MultiplyLong {
                variant: op_code.into(),
                condition,
                should_set_codes: op_code.get_bit(20),
                rdhi_destination_register: op_code.get_bits(16..=19),
                rdlo_destination_register: op_code.get_bits(12..=15),
                rs_operand_register: op_code.get_bits(8..=11),
                rm_operand_register: op_code.get_bits(0..=3),
            }
        } else if op_code.get_bits(22..=27) == 0 && op_code.get_bits(4..=7) == 0b1001 {
            let variant = if op_code.get_bit(21) {
                ArmModeMultiplyVariant::Mla
            } else {
                ArmModeMultiplyVariant::Mul
            };

            Self::Multiply {
                variant,
                condition,
                should_set_codes: op_code.get_bit(20),
                rd_destination_register: op_code.get_bits(16..=19),
                rn_accumulate_register: op_code.get_bits(12..=15),
                rs_operand_register: op_code.get_bits(8..=11),
                rm_operand_register: op_code.get_bits(0..=3),
            }
        } else if op_code.get_bits(25..=27) == 0b000 && op_code.get_bit(7) && op_code.get_bit(4) {
            let sh_bits = op_code.get_bits(5..=6);

            if sh_bits == 0b00 {
                if op_code.get_bits(23..=24) != 0b10 || op_code.get_bits(20..=21) != 0 {
                    tracing::debug!("undefined swap encoding: opcode=0x{op_code:08X}");
                    return Self::Undefined { condition };
                }
                Self::SingleDataSwap {
                    condition,
                    byte: op_code.get_bit(22),
                    rn: op_code.get_bits(16..=19),
                    rd: op_code.get_bits(12..=15),
                    rm: op_code.get_bits(0..=3),
                }
            } else {
                let operand_kind: OperandKind = op_code.get_bit(22).into();
                let offset_kind = match operand_kind {
                    OperandKind::Register => HalfwordDataTransferOffsetKind::Register {
                        register: op_code.get_bits(0..=3),
                    },
                    OperandKind::Immediate => HalfwordDataTransferOffsetKind::Immediate {
                        offset: (op_code.get_bits(8..=11) << 4) | op_code.get_bits(0..=3),
                    },
                };

                Self::HalfwordDataTransfer {
                    condition,
                    indexing: op_code.get_bit(24).into(),
                    offsetting: op_code.get_bit(23).into(),
                    write_back: op_code.get_bit(21),
                    load_store_kind: op_code.get_bit(20).into(),
                    offset_kind,
                    base_register: op_code.get_bits(16..=19),
                    source_destination_register: op_code.get_bits(12..=15),
                    transfer_kind: sh_bits.into(),
                }
            }
        } else if op_code.get_bits(25..=27) == 0b011 && op_code.get_bit(4) {
            tracing::debug!(
                "undefined instruction decode: opcode=0x{op_code:08X}, bits[25-27]=0b011, bit[4]=1"
            );
            Self::Undefined { condition }
        } else if op_code.get_bits(24..=27) == 0b1111 {
            Self::SoftwareInterrupt {
                condition,
                comment: op_code.get_bits(0..=23),
            }
        } else if op_code.get_bits(25..=27) == 0b110 || op_code.get_bits(24..=27) == 0b1110 {
            tracing::debug!("coprocessor instruction without coprocessor: opcode=0x{op_code:08X}");
            Self::Undefined { condition }
        } else if op_code.get_bits(25..=27) == 0b100 {
            Self::BlockDataTransfer {
                condition,
                indexing: op_code.get_bit(24).into(),
                offsetting: op_code.get_bit(23).into(),
                load_psr: op_code.get_bit(22),
                write_back: op_code.get_bit(21),
                load_store: op_code.get_bit(20).into(),
                rn: op_code.get_bits(16..=19),
                register_list: op_code.get_bits(0..=15),
            }
        } else if op_code.get_bits(25..=27) == 0b101 {
            Self::Branch {
                condition,
                link: op_code.get_bit(24),
                offset: op_code.get_bits(0..=23).sign_extended(24) << 2,
            }
        } else if op_code.get_bits(26..=27) == 0b01 {
            // NOTE: the I bit is inverted compared to data processing.
            let op_kind: OperandKind = (!op_code.get_bit(25)).into();
            let offset_info = match op_kind {
                OperandKind::Immediate => SingleDataTransferOffsetInfo::Immediate {
                    offset: op_code.get_bits(0..=11),
                },
                OperandKind::Register => SingleDataTransferOffsetInfo::RegisterImmediate {
                    shift_amount: op_code.get_bits(7..=11),
                    shift_kind: op_code.get_bits(5..=6).into(),
                    reg_offset: op_code.get_bits(0..=3),
                },
            };

            Self::SingleDataTransfer {
                condition,
                kind: op_code.get_bit(20).into(),
                quantity: op_code.get_bit(22).into(),
                write_back: op_code.get_bit(21),
                indexing: op_code.get_bit(24).into(),
                rd: op_code.get_bits(12..=15),
                base_register: op_code.get_bits(16..=19),
                offset_info,
                offsetting: op_code.get_bit(23).into(),
            }
        } else {
            let alu_instruction: ArmModeAluInstr = op_code.get_bits(21..=24).into();
            let set_conditions = op_code.get_bit(20);

            // TST/TEQ/CMP/CMN without S are the PSR transfer encodings.
            if !alu_instruction.writes_result() && !set_conditions {
                return Self::decode_psr_transfer(op_code, condition).unwrap_or_else(|| {
                    tracing::debug!("undefined PSR transfer: opcode=0x{op_code:08X}");
                    Self::Undefined { condition }
                });
            }

            let op_kind: OperandKind = op_code.get_bit(25).into();
            let op2 = match op_kind {
                OperandKind::Immediate => AluSecondOperandInfo::Immediate {
                    base: op_code.get_bits(0..=7),
                    shift: op_code.get_bits(8..=11) * 2,
                },
                OperandKind::Register => {
                    let shift_op = if op_code.get_bit(4) {
                        ShiftOperator::Register(op_code.get_bits(8..=11))
                    } else {
                        ShiftOperator::Immediate(op_code.get_bits(7..=11))
                    };
                    AluSecondOperandInfo::Register {
                        shift_op,
                        shift_kind: op_code.get_bits(5..=6).into(),
                        register: op_code.get_bits(0..=3),
                    }
                }
            };

            Self::DataProcessing {
                condition,
                alu_instruction,
                set_conditions,
                rn: op_code.get_bits(16..=19),
                destination: op_code.get_bits(12..=15),
                op2,
            }
        }
    }
}

impl std::fmt::Display for ArmModeInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.disassembler())
    }
}
