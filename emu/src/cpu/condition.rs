//! # Condition Field
//!
//! Every ARM opcode carries a condition in bits 31-28, Thumb only on
//! conditional branches (bits 11-8). The CPU skips the instruction when the
//! flags don't satisfy it, which still costs one sequential fetch.
//!
//! ```text
//!  code  suffix  test
//!  0000  EQ      Z
//!  0001  NE      !Z
//!  0010  CS/HS   C
//!  0011  CC/LO   !C
//!  0100  MI      N
//!  0101  PL      !N
//!  0110  VS      V
//!  0111  VC      !V
//!  1000  HI      C && !Z
//!  1001  LS      !C || Z
//!  1010  GE      N == V
//!  1011  LT      N != V
//!  1100  GT      !Z && N == V
//!  1101  LE      Z || N != V
//!  1110  AL      always
//!  1111  NV      never (reserved on ARMv4)
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum Condition {
    EQ = 0x0,
    NE = 0x1,
    CS = 0x2,
    CC = 0x3,
    MI = 0x4,
    PL = 0x5,
    VS = 0x6,
    VC = 0x7,
    HI = 0x8,
    LS = 0x9,
    GE = 0xA,
    LT = 0xB,
    GT = 0xC,
    LE = 0xD,
    AL = 0xE,
    NV = 0xF,
}

impl From<u8> for Condition {
    fn from(item: u8) -> Self {
        match item & 0xF {
            0x0 => Self::EQ,
            0x1 => Self::NE,
            0x2 => Self::CS,
            0x3 => Self::CC,
            0x4 => Self::MI,
            0x5 => Self::PL,
            0x6 => Self::VS,
            0x7 => Self::VC,
            0x8 => Self::HI,
            0x9 => Self::LS,
            0xA => Self::GE,
            0xB => Self::LT,
            0xC => Self::GT,
            0xD => Self::LE,
            0xE => Self::AL,
            _ => Self::NV,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suffix = match self {
            Self::EQ => "EQ",
            Self::NE => "NE",
            Self::CS => "CS",
            Self::CC => "CC",
            Self::MI => "MI",
            Self::PL => "PL",
            Self::VS => "VS",
            Self::VC => "VC",
            Self::HI => "HI",
            Self::LS => "LS",
            Self::GE => "GE",
            Self::LT => "LT",
            Self::GT => "GT",
            Self::LE => "LE",
            Self::AL => "",
            Self::NV => "NV",
        };
        f.write_str(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_from_nibble() {
        assert_eq!(Condition::from(0xE), Condition::AL);
        assert_eq!(Condition::from(0x1B), Condition::LT);
        assert_eq!(Condition::AL.to_string(), "");
        assert_eq!(Condition::GT.to_string(), "GT");
    }
}
