//! # Operating Modes
//!
//! | Mode       | Bits  | Banked registers      | Entered by                 |
//! |------------|-------|-----------------------|----------------------------|
//! | User       | 10000 | -                     | normal execution           |
//! | FIQ        | 10001 | R8-R14, SPSR          | fast interrupt (unused)    |
//! | IRQ        | 10010 | R13-R14, SPSR         | hardware interrupt         |
//! | Supervisor | 10011 | R13-R14, SPSR         | reset, SWI                 |
//! | Abort      | 10111 | R13-R14, SPSR         | memory abort (unused)      |
//! | Undefined  | 11011 | R13-R14, SPSR         | undefined opcode           |
//! | System     | 11111 | shares User registers | privileged user code       |

use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Mode {
    /// The normal ARM program execution state.
    User = 0b10000,

    /// Designed to support a data transfer or channel process.
    Fiq = 0b10001,

    /// Used for general-purpose interrupt handling.
    Irq = 0b10010,

    /// Protected mode for the operating system
    Supervisor = 0b10011,

    /// Entered after a data or instruction prefetch abort.
    Abort = 0b10111,

    /// Entered when an undefined instruction is executed
    Undefined = 0b11011,

    /// A privileged user mode for the operating system.
    System = 0b11111,
}

impl Mode {
    /// Slot of this mode in the banked register table.
    /// User and System share slot 0.
    #[must_use]
    pub const fn bank_index(self) -> usize {
        match self {
            Self::User | Self::System => 0,
            Self::Fiq => 1,
            Self::Irq => 2,
            Self::Supervisor => 3,
            Self::Abort => 4,
            Self::Undefined => 5,
        }
    }

    /// User and System have no SPSR.
    #[must_use]
    pub const fn has_spsr(self) -> bool {
        !matches!(self, Self::User | Self::System)
    }
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(format!("Unexpected value for Mode: 0b{n:05b}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_user_and_system_share_bank() {
        assert_eq!(Mode::User.bank_index(), Mode::System.bank_index());
        assert!(!Mode::System.has_spsr());
        assert!(Mode::Irq.has_spsr());
    }

    #[test]
    fn check_invalid_mode_bits() {
        assert!(Mode::try_from(0).is_err());
        assert_eq!(Mode::try_from(0b10010), Ok(Mode::Irq));
    }
}
