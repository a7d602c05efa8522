use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::flags::ShiftKind;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ArmModeAluInstr {
    And = 0x0,
    Eor = 0x1,
    Sub = 0x2,
    Rsb = 0x3,
    Add = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Rsc = 0x7,
    Tst = 0x8,
    Teq = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mov = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl Display for ArmModeAluInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::And => "AND",
            Self::Eor => "EOR",
            Self::Sub => "SUB",
            Self::Rsb => "RSB",
            Self::Add => "ADD",
            Self::Adc => "ADC",
            Self::Sbc => "SBC",
            Self::Rsc => "RSC",
            Self::Tst => "TST",
            Self::Teq => "TEQ",
            Self::Cmp => "CMP",
            Self::Cmn => "CMN",
            Self::Orr => "ORR",
            Self::Mov => "MOV",
            Self::Bic => "BIC",
            Self::Mvn => "MVN",
        };
        f.write_str(name)
    }
}

#[derive(Eq, PartialEq, Debug)]
pub enum AluInstructionKind {
    Logical,
    Arithmetic,
}

impl ArmModeAluInstr {
    #[must_use]
    pub const fn kind(self) -> AluInstructionKind {
        use ArmModeAluInstr::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };
        match self {
            And | Eor | Tst | Teq | Orr | Mov | Bic | Mvn => AluInstructionKind::Logical,
            Sub | Rsb | Add | Adc | Sbc | Rsc | Cmp | Cmn => AluInstructionKind::Arithmetic,
        }
    }

    /// TST, TEQ, CMP and CMN only update the flags.
    #[must_use]
    pub const fn writes_result(self) -> bool {
        !matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }
}

impl From<u32> for ArmModeAluInstr {
    fn from(alu_op_code: u32) -> Self {
        use ArmModeAluInstr::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };
        match alu_op_code & 0xF {
            0x0 => And,
            0x1 => Eor,
            0x2 => Sub,
            0x3 => Rsb,
            0x4 => Add,
            0x5 => Adc,
            0x6 => Sbc,
            0x7 => Rsc,
            0x8 => Tst,
            0x9 => Teq,
            0xA => Cmp,
            0xB => Cmn,
            0xC => Orr,
            0xD => Mov,
            0xE => Bic,
            _ => Mvn,
        }
    }
}

/// How the shift amount of a register operand is given.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ShiftOperator {
    /// 5 bit immediate, bits 11-7.
    Immediate(u32),

    /// Bottom byte of a register, bits 11-8.
    Register(u32),
}

/// Operand 2 of a data processing instruction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum AluSecondOperandInfo {
    Register {
        shift_op: ShiftOperator,
        shift_kind: ShiftKind,
        register: u32,
    },
    /// 8 bit value rotated right by `shift` (already doubled).
    Immediate { base: u32, shift: u32 },
}

impl Display for AluSecondOperandInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register {
                shift_op: ShiftOperator::Immediate(0),
                shift_kind: ShiftKind::Lsl,
                register,
            } => write!(f, "R{register}"),
            Self::Register {
                shift_op: ShiftOperator::Immediate(amount),
                shift_kind,
                register,
            } => write!(f, "R{register}, {shift_kind} #{amount}"),
            Self::Register {
                shift_op: ShiftOperator::Register(rs),
                shift_kind,
                register,
            } => write!(f, "R{register}, {shift_kind} R{rs}"),
            Self::Immediate { base, shift } => write!(f, "#0x{:X}", base.rotate_right(*shift)),
        }
    }
}

/// Target PSR of MRS/MSR.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PsrKind {
    Cpsr,
    Spsr,
}

impl From<bool> for PsrKind {
    fn from(value: bool) -> Self {
        if value { Self::Spsr } else { Self::Cpsr }
    }
}

impl Display for PsrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpsr => f.write_str("CPSR"),
            Self::Spsr => f.write_str("SPSR"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum MsrSource {
    Register(u32),
    Immediate { base: u32, shift: u32 },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PsrOpKind {
    /// Transfer PSR contents to a register.
    Mrs { destination_register: u32 },

    /// Transfer to the PSR fields selected by `field_mask` (bits 19-16: f, s, x, c).
    Msr { field_mask: u32, source: MsrSource },
}

impl PsrOpKind {
    /// Byte mask over the PSR built from the `fsxc` field bits.
    #[must_use]
    pub fn byte_mask(field_mask: u32) -> u32 {
        (0..4)
            .filter(|i| field_mask.is_bit_on(*i))
            .fold(0, |mask, i| mask | (0xFF << (u32::from(i) * 8)))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticOpResult {
    pub result: u32,
    pub carry: bool,
    pub overflow: bool,
    pub sign: bool,
    pub zero: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftResult {
    pub result: u32,
    pub carry: bool,
}

/// Barrel shifter with an immediate amount.
///
/// An amount of 0 has special encodings: LSR#0 and ASR#0 mean a shift by 32
/// and ROR#0 means RRX (rotate right by one through carry).
#[must_use]
pub fn shift(kind: ShiftKind, shift_amount: u32, rm: u32, carry: bool) -> ShiftResult {
    match (kind, shift_amount) {
        (ShiftKind::Lsl, 0) => ShiftResult { result: rm, carry },
        (ShiftKind::Lsr | ShiftKind::Asr, 0) => shift_by_register(kind, 32, rm, carry),
        (ShiftKind::Ror, 0) => ShiftResult {
            result: (u32::from(carry) << 31) | (rm >> 1),
            carry: rm.get_bit(0),
        },
        _ => shift_by_register(kind, shift_amount, rm, carry),
    }
}

/// Barrel shifter with the amount taken from the bottom byte of a register.
///
/// An amount of 0 leaves both the value and the carry untouched.
#[must_use]
pub fn shift_by_register(kind: ShiftKind, shift_amount: u32, rm: u32, carry: bool) -> ShiftResult {
    let amount = shift_amount & 0xFF;
    if amount == 0 {
        return ShiftResult { result: rm, carry };
    }

    match kind {
        ShiftKind::Lsl => match amount {
            1..=31 => ShiftResult {
                result: rm << amount,
                carry: rm.get_bit((32 - amount) as u8),
            },
            32 => ShiftResult {
                result: 0,
                carry: rm.get_bit(0),
            },
            _ => ShiftResult {
                result: 0,
                carry: false,
            },
        },
        ShiftKind::Lsr => match amount {
            1..=31 => ShiftResult {
                result: rm >> amount,
                carry: rm.get_bit((amount - 1) as u8),
            },
            32 => ShiftResult {
                result: 0,
                carry: rm.get_bit(31),
            },
            _ => ShiftResult {
                result: 0,
                carry: false,
            },
        },
        ShiftKind::Asr => match amount {
            1..=31 => ShiftResult {
                result: ((rm as i32) >> amount) as u32,
                carry: rm.get_bit((amount - 1) as u8),
            },
            _ => ShiftResult {
                result: ((rm as i32) >> 31) as u32,
                carry: rm.get_bit(31),
            },
        },
        ShiftKind::Ror => {
            let rotation = amount & 31;
            if rotation == 0 {
                ShiftResult {
                    result: rm,
                    carry: rm.get_bit(31),
                }
            } else {
                ShiftResult {
                    result: rm.rotate_right(rotation),
                    carry: rm.get_bit((rotation - 1) as u8),
                }
            }
        }
    }
}

/// `first + second + carry_in` with ARM flags.
#[must_use]
pub fn add_with_carry(first: u32, second: u32, carry_in: bool) -> ArithmeticOpResult {
    let wide = u64::from(first) + u64::from(second) + u64::from(carry_in);
    let result = wide as u32;

    ArithmeticOpResult {
        result,
        carry: wide > u64::from(u32::MAX),
        overflow: ((first ^ result) & (second ^ result)).get_bit(31),
        sign: result.get_bit(31),
        zero: result == 0,
    }
}

/// `first - second - !carry_in` with ARM flags. C is set when no borrow happens.
#[must_use]
pub fn sub_with_carry(first: u32, second: u32, carry_in: bool) -> ArithmeticOpResult {
    add_with_carry(first, !second, carry_in)
}

/// Plain `first - second`, C set when `first >= second`.
#[must_use]
pub fn sub(first: u32, second: u32) -> ArithmeticOpResult {
    sub_with_carry(first, second, true)
}

#[must_use]
pub fn add(first: u32, second: u32) -> ArithmeticOpResult {
    add_with_carry(first, second, false)
}
